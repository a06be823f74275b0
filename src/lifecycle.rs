use std::error::Error as StdError;
use std::fmt;

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// What a single attempt produced: exactly one of a response or a transport failure.
#[derive(Clone, Copy, Debug)]
pub enum ResponseOrError<'a> {
    Response(&'a HttpResponse),
    Error(&'a (dyn StdError + Send + Sync + 'static)),
}

impl<'a> ResponseOrError<'a> {
    pub fn response(self) -> Option<&'a HttpResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Error(_) => None,
        }
    }

    pub fn error(self) -> Option<&'a (dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Response(_) => None,
            Self::Error(error) => Some(error),
        }
    }

    pub fn is_response(self) -> bool {
        matches!(self, Self::Response(_))
    }
}

impl fmt::Display for ResponseOrError<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(response) => write!(formatter, "response {}", response.status()),
            Self::Error(error) => write!(formatter, "error {error}"),
        }
    }
}

/// Observer of the retry loop.
///
/// `request` is always the request as it was sent on that attempt, i.e. after endpoint
/// selection. Every logical call ends with exactly one of `on_success`, `on_failure` or
/// `on_no_longer_retryable`; `on_retry` fires once per scheduled retry before that.
pub trait RetryLifecycle: Send + Sync {
    fn on_success(&self, _request: &HttpRequest, _response: &HttpResponse) {}

    fn on_retry(&self, _request: &HttpRequest, _outcome: ResponseOrError<'_>) {}

    fn on_no_longer_retryable(&self, _request: &HttpRequest, _outcome: ResponseOrError<'_>) {}

    fn on_failure(&self, _request: &HttpRequest, _outcome: ResponseOrError<'_>) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRetryLifecycle;

impl RetryLifecycle for NoopRetryLifecycle {}

#[cfg(test)]
mod tests {
    use std::io;

    use http::StatusCode;

    use super::ResponseOrError;
    use crate::response::HttpResponse;

    #[test]
    fn response_or_error_holds_exactly_one_side() {
        let response = HttpResponse::from_status(StatusCode::SERVICE_UNAVAILABLE);
        let outcome = ResponseOrError::Response(&response);
        assert!(outcome.is_response());
        assert!(outcome.error().is_none());
        assert_eq!(
            outcome.response().map(HttpResponse::status),
            Some(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert_eq!(outcome.to_string(), "response 503 Service Unavailable");

        let error = io::Error::from(io::ErrorKind::TimedOut);
        let outcome = ResponseOrError::Error(&error);
        assert!(!outcome.is_response());
        assert!(outcome.response().is_none());
        assert!(outcome.error().is_some());
    }
}
