//! `retryx` wraps outbound HTTP calls in a retry loop with failure-aware round-robin
//! endpoint selection.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use retryx::prelude::{
//!     Endpoint, FixedBackoff, HttpRequest, RetryExecutor, RoundRobinLoadBalanceStrategy,
//!     StaticEndpointResolver, UreqTransport,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let strategy = RoundRobinLoadBalanceStrategy::builder(StaticEndpointResolver::new([
//!         Endpoint::new("10.0.0.7", 8080),
//!         Endpoint::new("10.0.0.8", 8080),
//!     ]))
//!     .ttl(Duration::from_secs(30))
//!     .build()?;
//!
//!     let executor = RetryExecutor::builder(FixedBackoff::new(Duration::from_millis(100), 3))
//!         .retryable_status_codes([429, 502, 503, 504])
//!         .load_balance_strategy(strategy)
//!         .build();
//!
//!     let transport = UreqTransport::builder()
//!         .connect_timeout(Duration::from_millis(500))
//!         .request_timeout(Duration::from_secs(2))
//!         .build();
//!
//!     let request = HttpRequest::get("http://inventory/v1/items")?;
//!     let response = executor.execute(&request, &Bytes::new(), &transport)?;
//!     println!("status={}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! # Behavior
//!
//! - Every attempt re-selects its endpoint from the original request.
//! - Error responses that exhaust the backoff are returned, not converted into errors.
//! - Endpoints that triggered a retry are skipped until a background sweep expires them.

mod backoff;
mod config;
mod endpoint;
mod error;
mod executor;
mod extensions;
mod failed_endpoints;
mod lifecycle;
mod load_balance;
mod metrics;
mod request;
mod response;
mod retry;
#[cfg(feature = "blocking-transport")]
mod transport;
mod util;

pub use crate::backoff::{Backoff, BackoffExecution, FixedBackoff};
pub use crate::config::RetryConfig;
pub use crate::endpoint::{Endpoint, EndpointResolver, StaticEndpointResolver};
pub use crate::error::{BoxError, Error, ErrorCode};
pub use crate::executor::{MAX_ATTEMPTS, RetryExecutor, RetryExecutorBuilder, WaitInterrupt};
pub use crate::extensions::{Clock, ResponseTransformer, SystemClock, Transport};
pub use crate::failed_endpoints::{FailedEndpointCache, FailedEndpointRecord};
pub use crate::lifecycle::{NoopRetryLifecycle, ResponseOrError, RetryLifecycle};
pub use crate::load_balance::{
    DEFAULT_FAILED_ENDPOINT_TTL, DEFAULT_SWEEP_INTERVAL, LoadBalanceStrategy,
    NoopLoadBalanceStrategy, RoundRobinLoadBalanceStrategy, RoundRobinLoadBalanceStrategyBuilder,
};
pub use crate::metrics::RetryMetricsSnapshot;
pub use crate::request::HttpRequest;
pub use crate::response::HttpResponse;
pub use crate::retry::{
    DEFAULT_RETRYABLE_STATUS_CODES, IoErrorPredicate, RetryableIoClassifier,
    RetryableResponsePredicate, StatusCodePredicate,
};
#[cfg(feature = "blocking-transport")]
pub use crate::transport::{UreqTransport, UreqTransportBuilder};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Backoff, Endpoint, EndpointResolver, Error, ErrorCode, FixedBackoff, HttpRequest,
        HttpResponse, IoErrorPredicate, LoadBalanceStrategy, ResponseOrError, RetryConfig,
        RetryExecutor, RetryLifecycle, RetryableIoClassifier, RoundRobinLoadBalanceStrategy,
        StaticEndpointResolver, StatusCodePredicate, Transport, WaitInterrupt,
    };
    #[cfg(feature = "blocking-transport")]
    pub use crate::UreqTransport;
}
