use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::FixedBackoff;
use crate::endpoint::EndpointResolver;
use crate::error::Error;
use crate::executor::{RetryExecutor, RetryExecutorBuilder};
use crate::load_balance::{
    DEFAULT_FAILED_ENDPOINT_TTL, DEFAULT_SWEEP_INTERVAL, RoundRobinLoadBalanceStrategy,
};
use crate::retry::{IoErrorPredicate, RetryableIoClassifier, default_retryable_status_codes};
use crate::util::default_sensitive_headers;

const DEFAULT_FIXED_BACKOFF_INTERVAL_MS: u64 = 1_000;
const DEFAULT_FIXED_BACKOFF_MAX_RETRIES: usize = 3;

/// Declarative retry settings, e.g. loaded from a JSON file.
///
/// Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub retryable_status_codes: Vec<u16>,
    /// Names of built-in transport error predicates.
    pub io_predicates: Vec<String>,
    pub sensitive_headers: Vec<String>,
    pub fixed_backoff_interval_ms: u64,
    pub fixed_backoff_max_retries: usize,
    pub failed_endpoint_ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retryable_status_codes: default_retryable_status_codes().into_iter().collect(),
            io_predicates: RetryableIoClassifier::defaults()
                .predicates()
                .iter()
                .map(|predicate| predicate.name().to_owned())
                .collect(),
            sensitive_headers: default_sensitive_headers().into_iter().collect(),
            fixed_backoff_interval_ms: DEFAULT_FIXED_BACKOFF_INTERVAL_MS,
            fixed_backoff_max_retries: DEFAULT_FIXED_BACKOFF_MAX_RETRIES,
            failed_endpoint_ttl_ms: duration_millis(DEFAULT_FAILED_ENDPOINT_TTL),
            sweep_interval_ms: duration_millis(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl RetryConfig {
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|source| Error::InvalidConfig {
            message: source.to_string(),
        })
    }

    pub fn fixed_backoff(&self) -> FixedBackoff {
        FixedBackoff::new(
            Duration::from_millis(self.fixed_backoff_interval_ms),
            self.fixed_backoff_max_retries,
        )
    }

    pub fn io_classifier(&self) -> crate::Result<RetryableIoClassifier> {
        self.io_predicates
            .iter()
            .try_fold(RetryableIoClassifier::none(), |classifier, name| {
                let predicate =
                    IoErrorPredicate::from_name(name).ok_or_else(|| Error::InvalidConfig {
                        message: format!("unknown io predicate `{name}`"),
                    })?;
                Ok(classifier.with(predicate))
            })
    }

    /// A builder with the fixed backoff, status set, predicates and redaction applied.
    pub fn executor_builder(&self) -> crate::Result<RetryExecutorBuilder> {
        Ok(RetryExecutor::builder(self.fixed_backoff())
            .retryable_status_codes(self.retryable_status_codes.iter().copied())
            .io_classifier(self.io_classifier()?)
            .sensitive_headers(self.sensitive_headers.iter().cloned()))
    }

    pub fn round_robin_strategy<R>(&self, resolver: R) -> crate::Result<RoundRobinLoadBalanceStrategy>
    where
        R: EndpointResolver + 'static,
    {
        RoundRobinLoadBalanceStrategy::builder(resolver)
            .ttl(Duration::from_millis(self.failed_endpoint_ttl_ms))
            .sweep_interval(Duration::from_millis(self.sweep_interval_ms))
            .build()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryConfig;
    use crate::endpoint::{Endpoint, StaticEndpointResolver};
    use crate::error::ErrorCode;

    #[test]
    fn defaults_match_builder_defaults() {
        let config = RetryConfig::default();
        assert_eq!(
            config.retryable_status_codes,
            vec![408, 425, 429, 500, 502, 503, 504]
        );
        assert_eq!(
            config.io_predicates,
            vec!["client_timeout", "connect_timeout", "unknown_host"]
        );
        assert_eq!(config.failed_endpoint_ttl_ms, 30_000);
        assert_eq!(config.sweep_interval_ms, 1_000);
        assert_eq!(config.fixed_backoff().max_retries(), 3);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config = RetryConfig::from_json_str(
            r#"{"retryable_status_codes":[500],"fixed_backoff_interval_ms":100,"fixed_backoff_max_retries":2}"#,
        )
        .expect("config should parse");
        assert_eq!(config.retryable_status_codes, vec![500]);
        assert_eq!(config.fixed_backoff().interval(), Duration::from_millis(100));
        assert_eq!(config.io_predicates.len(), 3);
        assert!(config.executor_builder().is_ok());
    }

    #[test]
    fn unknown_predicate_name_is_rejected() {
        let config = RetryConfig {
            io_predicates: vec!["client_timeout".to_owned(), "socket_closed".to_owned()],
            ..RetryConfig::default()
        };
        let error = config
            .executor_builder()
            .expect_err("unknown predicate should fail");
        assert_eq!(error.code(), ErrorCode::InvalidConfig);
        assert!(error.to_string().contains("socket_closed"));
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let error = RetryConfig::from_json_str("{\"sweep_interval_ms\":\"soon\"}")
            .expect_err("wrong type should fail");
        assert_eq!(error.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn round_robin_strategy_uses_configured_ttl() {
        let config = RetryConfig {
            failed_endpoint_ttl_ms: 1_500,
            ..RetryConfig::default()
        };
        let strategy = config
            .round_robin_strategy(StaticEndpointResolver::new([Endpoint::new("localhost", 1)]))
            .expect("strategy should build");
        assert_eq!(
            strategy.failed_endpoints().ttl(),
            Duration::from_millis(1_500)
        );
    }
}
