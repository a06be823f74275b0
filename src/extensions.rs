use std::time::SystemTime;

use bytes::Bytes;

use crate::error::BoxError;
use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Performs one raw network attempt.
///
/// Error statuses are expected to come back as responses; `Err` is reserved for failures
/// where no response was received at all.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest, body: &Bytes) -> Result<HttpResponse, BoxError>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest, &Bytes) -> Result<HttpResponse, BoxError> + Send + Sync,
{
    fn execute(&self, request: &HttpRequest, body: &Bytes) -> Result<HttpResponse, BoxError> {
        self(request, body)
    }
}

/// Rewrites every received response before it is classified or returned.
pub trait ResponseTransformer: Send + Sync {
    fn transform(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse;
}

impl<F> ResponseTransformer for F
where
    F: Fn(&HttpRequest, HttpResponse) -> HttpResponse + Send + Sync,
{
    fn transform(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
        self(request, response)
    }
}

pub trait Clock: Send + Sync {
    fn now_system(&self) -> SystemTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }
}
