use std::fmt;
use std::time::Duration;

/// A source of retry waits for one logical call.
pub trait Backoff: Send + Sync {
    /// Starts a fresh cursor. Called once at the beginning of every logical call.
    fn start(&self) -> Box<dyn BackoffExecution>;
}

/// Per-call backoff state.
pub trait BackoffExecution: Send + fmt::Debug {
    /// The wait before the next attempt, or `None` once no more retries are allowed.
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// Waits a fixed interval between attempts and stops after `max_retries` retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedBackoff {
    interval: Duration,
    max_retries: usize,
}

impl FixedBackoff {
    pub const fn new(interval: Duration, max_retries: usize) -> Self {
        Self {
            interval,
            max_retries,
        }
    }

    pub const fn no_retry() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Never signals stop; the retry loop's safety ceiling is the only bound.
    pub const fn unlimited(interval: Duration) -> Self {
        Self::new(interval, usize::MAX)
    }

    pub const fn interval(self) -> Duration {
        self.interval
    }

    pub const fn max_retries(self) -> usize {
        self.max_retries
    }
}

impl Backoff for FixedBackoff {
    fn start(&self) -> Box<dyn BackoffExecution> {
        Box::new(FixedBackoffExecution {
            interval: self.interval,
            max_retries: self.max_retries,
            consumed: 0,
        })
    }
}

#[derive(Debug)]
struct FixedBackoffExecution {
    interval: Duration,
    max_retries: usize,
    consumed: usize,
}

impl BackoffExecution for FixedBackoffExecution {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.consumed >= self.max_retries {
            return None;
        }
        self.consumed = self.consumed.saturating_add(1);
        Some(self.interval)
    }
}
