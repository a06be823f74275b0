use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::extensions::Clock;
use crate::lifecycle::{ResponseOrError, RetryLifecycle};
use crate::request::HttpRequest;
use crate::util::WakeSignal;

const SWEEP_THREAD_NAME: &str = "retryx-endpoint-sweep";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedEndpointRecord {
    endpoint: Endpoint,
    failed_at: SystemTime,
}

impl FailedEndpointRecord {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn failed_at(&self) -> SystemTime {
        self.failed_at
    }

    /// Expired once `failed_at + ttl` lies strictly before `now`.
    pub fn is_expired(&self, ttl: Duration, now: SystemTime) -> bool {
        match self.failed_at.checked_add(ttl) {
            Some(expires_at) => expires_at < now,
            None => false,
        }
    }
}

/// Endpoints recently seen failing, shared by every call going through one strategy.
///
/// Entries only leave through [`FailedEndpointCache::sweep`].
pub struct FailedEndpointCache {
    entries: DashMap<Endpoint, FailedEndpointRecord>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl FailedEndpointCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Records `endpoint` as failed now, overwriting any earlier record.
    pub fn mark_failed(&self, endpoint: Endpoint) {
        let failed_at = self.clock.now_system();
        self.entries.insert(
            endpoint.clone(),
            FailedEndpointRecord {
                endpoint,
                failed_at,
            },
        );
    }

    pub fn is_failed(&self, endpoint: &Endpoint) -> bool {
        self.entries.contains_key(endpoint)
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<FailedEndpointRecord> {
        self.entries.get(endpoint).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired record and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_system();
        let ttl = self.ttl;
        let mut removed = 0;
        self.entries.retain(|endpoint, record| {
            if record.is_expired(ttl, now) {
                info!(endpoint = %endpoint, "removing endpoint from failed endpoint cache");
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}

impl fmt::Debug for FailedEndpointCache {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FailedEndpointCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RetryLifecycle for FailedEndpointCache {
    fn on_retry(&self, request: &HttpRequest, outcome: ResponseOrError<'_>) {
        let Some(endpoint) = request.endpoint() else {
            return;
        };
        debug!(endpoint = %endpoint, outcome = %outcome, "marking endpoint as failed");
        self.mark_failed(endpoint);
    }
}

/// The periodic sweep over a [`FailedEndpointCache`]. Stopped and joined on drop.
#[derive(Debug)]
pub(crate) struct SweepTask {
    stop: Arc<WakeSignal>,
    join: Option<JoinHandle<()>>,
}

impl SweepTask {
    pub(crate) fn spawn(cache: Arc<FailedEndpointCache>, interval: Duration) -> crate::Result<Self> {
        let stop = Arc::new(WakeSignal::default());
        let stop_for_thread = Arc::clone(&stop);
        let join = thread::Builder::new()
            .name(SWEEP_THREAD_NAME.to_owned())
            .spawn(move || {
                while !stop_for_thread.wait(interval) {
                    cache.sweep();
                }
                debug!("failed endpoint sweep stopped");
            })
            .map_err(|source| Error::BackgroundTask {
                name: SWEEP_THREAD_NAME,
                source,
            })?;
        Ok(Self {
            stop,
            join: Some(join),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.stop.raise();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.stop();
    }
}
