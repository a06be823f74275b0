use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::endpoint::{Endpoint, EndpointResolver};
use crate::extensions::{Clock, SystemClock};
use crate::failed_endpoints::{FailedEndpointCache, SweepTask};
use crate::lifecycle::RetryLifecycle;
use crate::request::HttpRequest;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_FAILED_ENDPOINT_TTL: Duration = Duration::from_secs(30);

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Picks the concrete target of each attempt.
///
/// `choose` is handed the caller's original request on every attempt and must not fail:
/// when it cannot pick anything better it returns that request unchanged.
pub trait LoadBalanceStrategy: Send + Sync {
    fn choose(&self, request: &HttpRequest) -> HttpRequest;

    /// Observer notified alongside the caller's own lifecycle.
    fn retry_lifecycle(&self) -> Option<&dyn RetryLifecycle> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLoadBalanceStrategy;

impl LoadBalanceStrategy for NoopLoadBalanceStrategy {
    fn choose(&self, request: &HttpRequest) -> HttpRequest {
        request.clone()
    }
}

/// Rotates through resolved endpoints, skipping ones that recently caused a retry.
///
/// Failed endpoints come back into rotation once a background sweep finds their record
/// older than the configured TTL. The sweep stops when the strategy is dropped.
pub struct RoundRobinLoadBalanceStrategy {
    resolver: Arc<dyn EndpointResolver>,
    next: AtomicUsize,
    failed_endpoints: Arc<FailedEndpointCache>,
    _sweeper: SweepTask,
}

impl RoundRobinLoadBalanceStrategy {
    pub fn builder<R>(resolver: R) -> RoundRobinLoadBalanceStrategyBuilder
    where
        R: EndpointResolver + 'static,
    {
        RoundRobinLoadBalanceStrategyBuilder::new(Arc::new(resolver))
    }

    /// Uses the default sweep interval and TTL.
    pub fn new<R>(resolver: R) -> crate::Result<Self>
    where
        R: EndpointResolver + 'static,
    {
        Self::builder(resolver).build()
    }

    pub fn failed_endpoints(&self) -> &FailedEndpointCache {
        &self.failed_endpoints
    }

    fn select(&self, candidates: &[Endpoint]) -> Option<Endpoint> {
        let mut examined = None;
        for _ in 0..candidates.len() {
            let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
            let candidate = &candidates[index];
            if !self.failed_endpoints.is_failed(candidate) {
                return Some(candidate.clone());
            }
            debug!(endpoint = %candidate, "skipping failed endpoint");
            examined = Some(candidate);
        }
        // Every candidate is marked failed; keep trying the last one examined.
        examined.cloned()
    }
}

impl LoadBalanceStrategy for RoundRobinLoadBalanceStrategy {
    fn choose(&self, request: &HttpRequest) -> HttpRequest {
        let Some(service) = request.endpoint() else {
            return request.clone();
        };
        let candidates = self.resolver.resolve(&service);
        let Some(endpoint) = self.select(&candidates) else {
            return request.clone();
        };

        match request.with_endpoint(&endpoint) {
            Ok(chosen) => {
                debug!(service = %service, endpoint = %endpoint, "selected endpoint");
                chosen
            }
            Err(error) => {
                warn!(
                    service = %service,
                    endpoint = %endpoint,
                    error = %error,
                    "failed to rewrite request for selected endpoint; using original request"
                );
                request.clone()
            }
        }
    }

    fn retry_lifecycle(&self) -> Option<&dyn RetryLifecycle> {
        Some(self.failed_endpoints.as_ref())
    }
}

impl fmt::Debug for RoundRobinLoadBalanceStrategy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RoundRobinLoadBalanceStrategy")
            .field("failed_endpoints", &self.failed_endpoints)
            .finish_non_exhaustive()
    }
}

pub struct RoundRobinLoadBalanceStrategyBuilder {
    resolver: Arc<dyn EndpointResolver>,
    sweep_interval: Duration,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RoundRobinLoadBalanceStrategyBuilder {
    fn new(resolver: Arc<dyn EndpointResolver>) -> Self {
        Self {
            resolver,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            ttl: DEFAULT_FAILED_ENDPOINT_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the strategy and starts its sweep thread.
    pub fn build(self) -> crate::Result<RoundRobinLoadBalanceStrategy> {
        let failed_endpoints = Arc::new(FailedEndpointCache::new(self.ttl, self.clock));
        let sweeper = SweepTask::spawn(Arc::clone(&failed_endpoints), self.sweep_interval)?;
        Ok(RoundRobinLoadBalanceStrategy {
            resolver: self.resolver,
            next: AtomicUsize::new(0),
            failed_endpoints,
            _sweeper: sweeper,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use http::StatusCode;

    use super::{LoadBalanceStrategy, NoopLoadBalanceStrategy, RoundRobinLoadBalanceStrategy};
    use crate::endpoint::{Endpoint, StaticEndpointResolver};
    use crate::failed_endpoints::tests::ManualClock;
    use crate::lifecycle::ResponseOrError;
    use crate::request::HttpRequest;
    use crate::response::HttpResponse;

    fn endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new("localhost", 9998),
            Endpoint::new("localhost", 9999),
        ]
    }

    fn strategy_with_clock(clock: Arc<ManualClock>) -> RoundRobinLoadBalanceStrategy {
        RoundRobinLoadBalanceStrategy::builder(StaticEndpointResolver::new(endpoints()))
            .ttl(Duration::from_secs(1))
            .sweep_interval(Duration::from_secs(3600))
            .clock(clock)
            .build()
            .expect("strategy should build")
    }

    fn service_request() -> HttpRequest {
        HttpRequest::get("http://hello/test?x=1").expect("request should parse")
    }

    #[test]
    fn noop_strategy_returns_request_unchanged() {
        let request = service_request();
        let chosen = NoopLoadBalanceStrategy.choose(&request);
        assert_eq!(chosen.uri(), request.uri());
        assert!(NoopLoadBalanceStrategy.retry_lifecycle().is_none());
    }

    #[test]
    fn round_robin_cycles_through_healthy_endpoints() {
        let strategy = strategy_with_clock(Arc::new(ManualClock::new()));
        let request = service_request();

        let chosen = (0..4)
            .map(|_| strategy.choose(&request).uri().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            chosen,
            vec![
                "http://localhost:9998/test?x=1",
                "http://localhost:9999/test?x=1",
                "http://localhost:9998/test?x=1",
                "http://localhost:9999/test?x=1",
            ]
        );
    }

    #[test]
    fn round_robin_skips_failed_endpoints() {
        let strategy = strategy_with_clock(Arc::new(ManualClock::new()));
        strategy
            .failed_endpoints()
            .mark_failed(Endpoint::new("localhost", 9999));

        for _ in 0..5 {
            assert_eq!(
                strategy.choose(&service_request()).endpoint(),
                Some(Endpoint::new("localhost", 9998))
            );
        }
    }

    #[test]
    fn round_robin_falls_back_when_every_endpoint_failed() {
        let strategy = strategy_with_clock(Arc::new(ManualClock::new()));
        for endpoint in endpoints() {
            strategy.failed_endpoints().mark_failed(endpoint);
        }

        let chosen = strategy.choose(&service_request());
        let endpoint = chosen.endpoint().expect("chosen request should carry an endpoint");
        assert!(endpoints().contains(&endpoint));
    }

    #[test]
    fn full_outage_returns_last_endpoint_examined_by_the_scan() {
        let candidates = vec![
            Endpoint::new("10.0.0.1", 8080),
            Endpoint::new("10.0.0.2", 8080),
            Endpoint::new("10.0.0.3", 8080),
        ];
        let strategy =
            RoundRobinLoadBalanceStrategy::builder(StaticEndpointResolver::new(candidates.clone()))
                .clock(Arc::new(ManualClock::new()))
                .sweep_interval(Duration::from_secs(3600))
                .build()
                .expect("strategy should build");

        // Two healthy selections leave the rotation counter at 2.
        let start = 2;
        for expected in &candidates[..start] {
            let chosen = strategy.choose(&service_request());
            assert_eq!(chosen.endpoint().as_ref(), Some(expected));
        }
        for endpoint in &candidates {
            strategy.failed_endpoints().mark_failed(endpoint.clone());
        }

        // The scan visits 2, 0, 1 and keeps the last one.
        let n = candidates.len();
        let chosen = strategy.choose(&service_request());
        assert_eq!(
            chosen.endpoint(),
            Some(candidates[(start + n - 1) % n].clone())
        );
        assert_eq!(chosen.endpoint(), Some(candidates[1].clone()));

        // The next scan starts at 5 % 3 and ends on the same endpoint.
        let chosen = strategy.choose(&service_request());
        assert_eq!(chosen.endpoint(), Some(candidates[1].clone()));
    }

    #[test]
    fn empty_candidate_list_keeps_original_request() {
        let strategy = RoundRobinLoadBalanceStrategy::builder(StaticEndpointResolver::default())
            .build()
            .expect("strategy should build");
        let request = service_request();
        assert_eq!(strategy.choose(&request).uri(), request.uri());
    }

    #[test]
    fn unrewritable_endpoint_keeps_original_request() {
        let strategy = RoundRobinLoadBalanceStrategy::builder(|_: &Endpoint| {
            vec![Endpoint::new("not a host", 80)]
        })
        .build()
        .expect("strategy should build");
        let request = service_request();
        assert_eq!(strategy.choose(&request).uri(), request.uri());
    }

    #[test]
    fn resolver_receives_the_service_endpoint() {
        let strategy = RoundRobinLoadBalanceStrategy::builder(|service: &Endpoint| {
            vec![Endpoint::new(format!("{}.internal", service.host()), 7000)]
        })
        .build()
        .expect("strategy should build");
        assert_eq!(
            strategy.choose(&service_request()).uri().to_string(),
            "http://hello.internal:7000/test?x=1"
        );
    }

    #[test]
    fn retried_endpoint_returns_after_sweep_passes_ttl() {
        let clock = Arc::new(ManualClock::new());
        let strategy = strategy_with_clock(clock.clone());
        let lifecycle = strategy
            .retry_lifecycle()
            .expect("round robin should expose its failure cache");

        let failed = HttpRequest::get("http://localhost:9999/test").expect("request should parse");
        let response = HttpResponse::from_status(StatusCode::SERVICE_UNAVAILABLE);
        lifecycle.on_retry(&failed, ResponseOrError::Response(&response));
        assert!(
            strategy
                .failed_endpoints()
                .is_failed(&Endpoint::new("localhost", 9999))
        );

        clock.advance(Duration::from_millis(1001));
        assert_eq!(strategy.failed_endpoints().sweep(), 1);

        let seen = (0..2)
            .filter_map(|_| strategy.choose(&service_request()).endpoint())
            .collect::<Vec<_>>();
        assert!(seen.contains(&Endpoint::new("localhost", 9999)));
    }

    #[test]
    fn background_sweep_restores_endpoints() {
        let strategy =
            RoundRobinLoadBalanceStrategy::builder(StaticEndpointResolver::new(endpoints()))
                .ttl(Duration::from_millis(20))
                .sweep_interval(Duration::from_millis(10))
                .build()
                .expect("strategy should build");
        strategy
            .failed_endpoints()
            .mark_failed(Endpoint::new("localhost", 9999));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !strategy.failed_endpoints().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(strategy.failed_endpoints().is_empty());
    }

    #[test]
    fn concurrent_choices_spread_evenly() {
        let strategy = Arc::new(strategy_with_clock(Arc::new(ManualClock::new())));
        let workers = (0..4)
            .map(|_| {
                let strategy = Arc::clone(&strategy);
                thread::spawn(move || {
                    (0..250)
                        .filter_map(|_| strategy.choose(&service_request()).endpoint())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut counts = BTreeMap::new();
        for worker in workers {
            for endpoint in worker.join().expect("worker should not panic") {
                *counts.entry(endpoint.port()).or_insert(0_usize) += 1;
            }
        }
        assert_eq!(counts.get(&9998), Some(&500));
        assert_eq!(counts.get(&9999), Some(&500));
    }
}
