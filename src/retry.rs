use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::response::HttpResponse;

pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

const MAX_CAUSE_DEPTH: usize = 32;

type ErrorPredicateFn = dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync;

/// A named test deciding whether a transport failure is worth another attempt.
///
/// Every predicate inspects the whole cause chain: a failure matches when any error in
/// its chain matches.
#[derive(Clone)]
pub enum IoErrorPredicate {
    /// Read or overall request timeouts.
    ClientTimeout,
    /// Refused connections and connect timeouts.
    ConnectTimeout,
    /// Host names that could not be resolved.
    UnknownHost,
    /// Every transport failure.
    Any,
    Custom {
        name: String,
        predicate: Arc<ErrorPredicateFn>,
    },
}

impl IoErrorPredicate {
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ClientTimeout => "client_timeout",
            Self::ConnectTimeout => "connect_timeout",
            Self::UnknownHost => "unknown_host",
            Self::Any => "any",
            Self::Custom { name, .. } => name,
        }
    }

    /// Looks up a built-in predicate by its name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "client_timeout" => Some(Self::ClientTimeout),
            "connect_timeout" => Some(Self::ConnectTimeout),
            "unknown_host" => Some(Self::UnknownHost),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    pub fn test(&self, error: &(dyn StdError + 'static)) -> bool {
        match self {
            Self::ClientTimeout => any_cause(error, &is_client_timeout),
            Self::ConnectTimeout => any_cause(error, &is_connect_failure),
            Self::UnknownHost => any_cause(error, &is_unknown_host),
            Self::Any => true,
            Self::Custom { predicate, .. } => any_cause(error, predicate.as_ref()),
        }
    }
}

impl fmt::Debug for IoErrorPredicate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { name, .. } => formatter.debug_tuple("Custom").field(name).finish(),
            other => formatter.write_str(other.name()),
        }
    }
}

/// The set of predicates deciding whether a transport failure is retryable, combined by OR.
#[derive(Clone, Debug)]
pub struct RetryableIoClassifier {
    predicates: Vec<IoErrorPredicate>,
}

impl RetryableIoClassifier {
    /// Client timeouts, connect failures and unknown hosts.
    pub fn defaults() -> Self {
        Self {
            predicates: vec![
                IoErrorPredicate::ClientTimeout,
                IoErrorPredicate::ConnectTimeout,
                IoErrorPredicate::UnknownHost,
            ],
        }
    }

    /// Retries no transport failure at all.
    pub fn none() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Adds a predicate, replacing any existing one with the same name.
    pub fn with(mut self, predicate: IoErrorPredicate) -> Self {
        self.predicates
            .retain(|existing| existing.name() != predicate.name());
        self.predicates.push(predicate);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.predicates.retain(|existing| existing.name() != name);
        self
    }

    pub fn predicates(&self) -> &[IoErrorPredicate] {
        &self.predicates
    }

    pub fn is_retryable(&self, error: &(dyn StdError + 'static)) -> bool {
        self.predicates.iter().any(|predicate| predicate.test(error))
    }
}

impl Default for RetryableIoClassifier {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Decides whether a received response is worth another attempt.
pub trait RetryableResponsePredicate: Send + Sync {
    fn is_retryable(&self, response: &HttpResponse) -> bool;
}

impl<F> RetryableResponsePredicate for F
where
    F: Fn(&HttpResponse) -> bool + Send + Sync,
{
    fn is_retryable(&self, response: &HttpResponse) -> bool {
        self(response)
    }
}

/// Retries error responses whose status code is in a fixed set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusCodePredicate {
    statuses: BTreeSet<u16>,
}

impl StatusCodePredicate {
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(DEFAULT_RETRYABLE_STATUS_CODES)
    }

    pub fn statuses(&self) -> &BTreeSet<u16> {
        &self.statuses
    }
}

impl Default for StatusCodePredicate {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryableResponsePredicate for StatusCodePredicate {
    fn is_retryable(&self, response: &HttpResponse) -> bool {
        response.is_error() && self.statuses.contains(&response.status().as_u16())
    }
}

pub(crate) fn default_retryable_status_codes() -> BTreeSet<u16> {
    DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect()
}

fn any_cause(
    error: &(dyn StdError + 'static),
    matches: &dyn Fn(&(dyn StdError + 'static)) -> bool,
) -> bool {
    let mut current = Some(error);
    let mut depth = 0;
    while let Some(link) = current {
        if matches(link) {
            return true;
        }
        // io::Error::source() skips the payload it wraps, so visit it explicitly.
        if let Some(io_error) = link.downcast_ref::<io::Error>()
            && let Some(inner) = io_error.get_ref()
            && any_cause(inner, matches)
        {
            return true;
        }
        depth += 1;
        if depth >= MAX_CAUSE_DEPTH {
            return false;
        }
        current = link.source();
    }
    false
}

fn is_client_timeout(error: &(dyn StdError + 'static)) -> bool {
    if let Some(io_error) = error.downcast_ref::<io::Error>() {
        return is_timeout_kind(io_error.kind());
    }
    #[cfg(feature = "blocking-transport")]
    if let Some(ureq_error) = error.downcast_ref::<ureq::Error>() {
        return match ureq_error {
            ureq::Error::Timeout(_) => true,
            ureq::Error::Io(source) => is_timeout_kind(source.kind()),
            _ => false,
        };
    }
    false
}

fn is_connect_failure(error: &(dyn StdError + 'static)) -> bool {
    if let Some(io_error) = error.downcast_ref::<io::Error>() {
        return io_error.kind() == io::ErrorKind::ConnectionRefused;
    }
    #[cfg(feature = "blocking-transport")]
    if let Some(ureq_error) = error.downcast_ref::<ureq::Error>() {
        return match ureq_error {
            ureq::Error::ConnectionFailed => true,
            ureq::Error::Timeout(ureq::Timeout::Connect) => true,
            ureq::Error::Io(source) => source.kind() == io::ErrorKind::ConnectionRefused,
            _ => false,
        };
    }
    false
}

fn is_unknown_host(error: &(dyn StdError + 'static)) -> bool {
    if let Some(io_error) = error.downcast_ref::<io::Error>() {
        return is_lookup_failure_message(&io_error.to_string());
    }
    #[cfg(feature = "blocking-transport")]
    if let Some(ureq_error) = error.downcast_ref::<ureq::Error>() {
        return match ureq_error {
            ureq::Error::HostNotFound => true,
            ureq::Error::Io(source) => is_lookup_failure_message(&source.to_string()),
            _ => false,
        };
    }
    false
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn is_lookup_failure_message(message: &str) -> bool {
    let text = message.to_ascii_lowercase();
    text.contains("failed to lookup address")
        || text.contains("name or service not known")
        || text.contains("nodename nor servname")
        || text.contains("no such host")
}
