use http::Method;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    RequestBuild,
    Transport,
    AttemptsExhausted,
    Deserialize,
    InvalidConfig,
    BackgroundTask,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::Deserialize => "deserialize",
            Self::InvalidConfig => "invalid_config",
            Self::BackgroundTask => "background_task",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error for {method} {uri}: {source}")]
    Transport {
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    /// The retry loop ran past its safety ceiling without the backoff ever signalling stop.
    #[error(
        "maximum number of attempts ({max_attempts}) reached for {method} {uri}; the backoff never signalled stop"
    )]
    AttemptsExhausted {
        max_attempts: usize,
        method: Method,
        uri: String,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid retry configuration: {message}")]
    InvalidConfig { message: String },
    #[error("failed to start background task {name}: {source}")]
    BackgroundTask {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::AttemptsExhausted { .. } => ErrorCode::AttemptsExhausted,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::BackgroundTask { .. } => ErrorCode::BackgroundTask,
        }
    }

    /// Returns the underlying transport failure, if this error wraps one.
    pub fn transport_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
