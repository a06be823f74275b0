use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, info_span, warn};

use crate::backoff::{Backoff, BackoffExecution};
use crate::error::Error;
use crate::extensions::{ResponseTransformer, Transport};
use crate::lifecycle::{NoopRetryLifecycle, ResponseOrError, RetryLifecycle};
use crate::load_balance::{LoadBalanceStrategy, NoopLoadBalanceStrategy};
use crate::metrics::{RetryMetrics, RetryMetricsSnapshot};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::retry::{
    RetryableIoClassifier, RetryableResponsePredicate, StatusCodePredicate,
    default_retryable_status_codes,
};
use crate::util::{
    WakeSignal, default_sensitive_headers, format_headers_for_logs, redact_uri_for_logs,
};

/// Upper bound on attempts per call, regardless of what the backoff allows.
pub const MAX_ATTEMPTS: usize = 100;

/// Cuts short the waits between attempts of calls it is passed to.
///
/// Interruption is sticky: once raised, every later wait of those calls returns at once.
/// The calls keep attempting until their backoff stops them.
#[derive(Clone, Debug, Default)]
pub struct WaitInterrupt {
    signal: Arc<WakeSignal>,
}

impl WaitInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.signal.raise();
    }

    pub fn is_interrupted(&self) -> bool {
        self.signal.is_raised()
    }

    fn wait(&self, delay: Duration) -> bool {
        self.signal.wait(delay)
    }
}

/// Runs a request against a [`Transport`] until it succeeds, fails permanently, or the
/// backoff gives up.
///
/// One executor is meant to be shared by many threads; each call keeps its own attempt
/// counter and backoff cursor.
pub struct RetryExecutor {
    backoff: Arc<dyn Backoff>,
    io_classifier: RetryableIoClassifier,
    response_predicate: Arc<dyn RetryableResponsePredicate>,
    load_balance_strategy: Arc<dyn LoadBalanceStrategy>,
    retry_lifecycle: Arc<dyn RetryLifecycle>,
    response_transformer: Option<Arc<dyn ResponseTransformer>>,
    sensitive_headers: BTreeSet<String>,
    metrics: RetryMetrics,
}

enum AttemptOutcome {
    Wait(Duration),
    Done(crate::Result<HttpResponse>),
}

impl RetryExecutor {
    pub fn builder<B>(backoff: B) -> RetryExecutorBuilder
    where
        B: Backoff + 'static,
    {
        RetryExecutorBuilder::new(Arc::new(backoff))
    }

    pub fn execute(
        &self,
        request: &HttpRequest,
        body: &Bytes,
        transport: &dyn Transport,
    ) -> crate::Result<HttpResponse> {
        self.run_call(request, body, transport, None)
    }

    /// Like [`RetryExecutor::execute`], with waits that `interrupt` can cut short.
    pub fn execute_interruptible(
        &self,
        request: &HttpRequest,
        body: &Bytes,
        transport: &dyn Transport,
        interrupt: &WaitInterrupt,
    ) -> crate::Result<HttpResponse> {
        self.run_call(request, body, transport, Some(interrupt))
    }

    pub fn metrics_snapshot(&self) -> RetryMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn load_balance_strategy(&self) -> &dyn LoadBalanceStrategy {
        self.load_balance_strategy.as_ref()
    }

    fn run_call(
        &self,
        request: &HttpRequest,
        body: &Bytes,
        transport: &dyn Transport,
        interrupt: Option<&WaitInterrupt>,
    ) -> crate::Result<HttpResponse> {
        self.metrics.record_call_started();
        let _in_flight = self.metrics.enter_in_flight();
        let started = Instant::now();
        let result = self.run_attempts(request, body, transport, interrupt);
        self.metrics.record_call_completed(&result, started.elapsed());
        result
    }

    fn run_attempts(
        &self,
        request: &HttpRequest,
        body: &Bytes,
        transport: &dyn Transport,
        interrupt: Option<&WaitInterrupt>,
    ) -> crate::Result<HttpResponse> {
        let mut backoff = self.backoff.start();

        for attempt in 1..=MAX_ATTEMPTS {
            let chosen = self.load_balance_strategy.choose(request);
            let redacted_uri_text = redact_uri_for_logs(&chosen.uri().to_string());
            let span = info_span!(
                "retryx.attempt",
                method = %chosen.method(),
                uri = %redacted_uri_text,
                attempt = attempt,
                max_attempts = MAX_ATTEMPTS
            );
            let _enter = span.enter();

            debug!(
                headers = %format_headers_for_logs(chosen.headers(), &self.sensitive_headers),
                "sending request"
            );
            self.metrics.record_attempt();

            let outcome = match transport.execute(&chosen, body) {
                Ok(response) => self.handle_response(&chosen, response, &mut *backoff),
                Err(source) => self.handle_transport_error(
                    &chosen,
                    &redacted_uri_text,
                    source,
                    &mut *backoff,
                ),
            };

            match outcome {
                AttemptOutcome::Done(result) => return result,
                AttemptOutcome::Wait(delay) => {
                    self.metrics.record_retry();
                    if delay.is_zero() {
                        continue;
                    }
                    match interrupt {
                        Some(interrupt) => {
                            if interrupt.wait(delay) {
                                debug!("retry wait interrupted");
                            }
                        }
                        None => thread::sleep(delay),
                    }
                }
            }
        }

        let redacted_uri_text = redact_uri_for_logs(&request.uri().to_string());
        warn!(
            method = %request.method(),
            uri = %redacted_uri_text,
            max_attempts = MAX_ATTEMPTS,
            "retry ceiling reached before backoff signalled stop"
        );
        Err(Error::AttemptsExhausted {
            max_attempts: MAX_ATTEMPTS,
            method: request.method().clone(),
            uri: redacted_uri_text,
        })
    }

    fn handle_response(
        &self,
        chosen: &HttpRequest,
        response: HttpResponse,
        backoff: &mut dyn BackoffExecution,
    ) -> AttemptOutcome {
        let response = match &self.response_transformer {
            Some(transformer) => transformer.transform(chosen, response),
            None => response,
        };
        self.metrics.record_response(&response);
        debug!(
            status = response.status().as_u16(),
            headers = %format_headers_for_logs(response.headers(), &self.sensitive_headers),
            "received response"
        );

        if !self.response_predicate.is_retryable(&response) {
            if response.is_error() {
                self.notify(|lifecycle| {
                    lifecycle.on_failure(chosen, ResponseOrError::Response(&response))
                });
            } else {
                self.notify(|lifecycle| lifecycle.on_success(chosen, &response));
            }
            return AttemptOutcome::Done(Ok(response));
        }

        let outcome = ResponseOrError::Response(&response);
        match backoff.next_backoff() {
            None => {
                warn!(
                    status = response.status().as_u16(),
                    "response no longer retryable; returning last response"
                );
                self.metrics.record_no_longer_retryable();
                self.notify(|lifecycle| lifecycle.on_no_longer_retryable(chosen, outcome));
                AttemptOutcome::Done(Ok(response))
            }
            Some(delay) => {
                self.notify(|lifecycle| lifecycle.on_retry(chosen, outcome));
                info!(
                    status = response.status().as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying request after retryable response"
                );
                AttemptOutcome::Wait(delay)
            }
        }
    }

    fn handle_transport_error(
        &self,
        chosen: &HttpRequest,
        redacted_uri_text: &str,
        source: crate::BoxError,
        backoff: &mut dyn BackoffExecution,
    ) -> AttemptOutcome {
        self.metrics.record_transport_error();
        let outcome = ResponseOrError::Error(source.as_ref());

        if !self.io_classifier.is_retryable(source.as_ref()) {
            debug!(error = %source, "transport error is not retryable");
            self.notify(|lifecycle| lifecycle.on_failure(chosen, outcome));
            return AttemptOutcome::Done(Err(self.transport_error(chosen, redacted_uri_text, source)));
        }

        match backoff.next_backoff() {
            None => {
                warn!(error = %source, "transport error no longer retryable");
                self.metrics.record_no_longer_retryable();
                self.notify(|lifecycle| lifecycle.on_no_longer_retryable(chosen, outcome));
                AttemptOutcome::Done(Err(self.transport_error(chosen, redacted_uri_text, source)))
            }
            Some(delay) => {
                self.notify(|lifecycle| lifecycle.on_retry(chosen, outcome));
                info!(
                    error = %source,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request after transport error"
                );
                AttemptOutcome::Wait(delay)
            }
        }
    }

    fn transport_error(
        &self,
        chosen: &HttpRequest,
        redacted_uri_text: &str,
        source: crate::BoxError,
    ) -> Error {
        Error::Transport {
            method: chosen.method().clone(),
            uri: redacted_uri_text.to_owned(),
            source,
        }
    }

    /// Strategy observer first, then the configured lifecycle.
    fn notify(&self, event: impl Fn(&dyn RetryLifecycle)) {
        if let Some(lifecycle) = self.load_balance_strategy.retry_lifecycle() {
            event(lifecycle);
        }
        event(self.retry_lifecycle.as_ref());
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RetryExecutor")
            .field("io_classifier", &self.io_classifier)
            .field("sensitive_headers", &self.sensitive_headers)
            .finish_non_exhaustive()
    }
}

pub struct RetryExecutorBuilder {
    backoff: Arc<dyn Backoff>,
    io_classifier: RetryableIoClassifier,
    retryable_status_codes: BTreeSet<u16>,
    custom_response_predicate: Option<Arc<dyn RetryableResponsePredicate>>,
    load_balance_strategy: Arc<dyn LoadBalanceStrategy>,
    retry_lifecycle: Arc<dyn RetryLifecycle>,
    response_transformer: Option<Arc<dyn ResponseTransformer>>,
    sensitive_headers: BTreeSet<String>,
}

impl RetryExecutorBuilder {
    fn new(backoff: Arc<dyn Backoff>) -> Self {
        Self {
            backoff,
            io_classifier: RetryableIoClassifier::defaults(),
            retryable_status_codes: default_retryable_status_codes(),
            custom_response_predicate: None,
            load_balance_strategy: Arc::new(NoopLoadBalanceStrategy),
            retry_lifecycle: Arc::new(NoopRetryLifecycle),
            response_transformer: None,
            sensitive_headers: default_sensitive_headers(),
        }
    }

    /// Retries error responses with these status codes. Ignored once a custom
    /// predicate is set.
    pub fn retryable_status_codes<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_status_codes = statuses.into_iter().collect();
        self
    }

    pub fn retryable_response_predicate<P>(self, predicate: P) -> Self
    where
        P: RetryableResponsePredicate + 'static,
    {
        self.retryable_response_predicate_arc(Arc::new(predicate))
    }

    pub fn retryable_response_predicate_arc(
        mut self,
        predicate: Arc<dyn RetryableResponsePredicate>,
    ) -> Self {
        self.custom_response_predicate = Some(predicate);
        self
    }

    pub fn io_classifier(mut self, io_classifier: RetryableIoClassifier) -> Self {
        self.io_classifier = io_classifier;
        self
    }

    pub fn load_balance_strategy<S>(self, strategy: S) -> Self
    where
        S: LoadBalanceStrategy + 'static,
    {
        self.load_balance_strategy_arc(Arc::new(strategy))
    }

    pub fn load_balance_strategy_arc(mut self, strategy: Arc<dyn LoadBalanceStrategy>) -> Self {
        self.load_balance_strategy = strategy;
        self
    }

    pub fn retry_lifecycle<L>(self, lifecycle: L) -> Self
    where
        L: RetryLifecycle + 'static,
    {
        self.retry_lifecycle_arc(Arc::new(lifecycle))
    }

    pub fn retry_lifecycle_arc(mut self, lifecycle: Arc<dyn RetryLifecycle>) -> Self {
        self.retry_lifecycle = lifecycle;
        self
    }

    pub fn response_transformer<T>(self, transformer: T) -> Self
    where
        T: ResponseTransformer + 'static,
    {
        self.response_transformer_arc(Arc::new(transformer))
    }

    pub fn response_transformer_arc(mut self, transformer: Arc<dyn ResponseTransformer>) -> Self {
        self.response_transformer = Some(transformer);
        self
    }

    /// Header names rendered as `<redacted>` in debug logs. Matched case-insensitively.
    pub fn sensitive_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_headers = names
            .into_iter()
            .map(|name| name.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn build(self) -> RetryExecutor {
        let response_predicate: Arc<dyn RetryableResponsePredicate> =
            match self.custom_response_predicate {
                Some(predicate) => predicate,
                None => Arc::new(StatusCodePredicate::new(self.retryable_status_codes)),
            };
        RetryExecutor {
            backoff: self.backoff,
            io_classifier: self.io_classifier,
            response_predicate,
            load_balance_strategy: self.load_balance_strategy,
            retry_lifecycle: self.retry_lifecycle,
            response_transformer: self.response_transformer,
            sensitive_headers: self.sensitive_headers,
            metrics: RetryMetrics::default(),
        }
    }
}

impl fmt::Debug for RetryExecutorBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RetryExecutorBuilder")
            .field("io_classifier", &self.io_classifier)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field(
                "custom_response_predicate",
                &self.custom_response_predicate.is_some(),
            )
            .field("sensitive_headers", &self.sensitive_headers)
            .finish_non_exhaustive()
    }
}
