use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use bytes::Bytes;

use crate::error::BoxError;
use crate::extensions::Transport;
use crate::request::HttpRequest;
use crate::response::HttpResponse;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 8192;

/// A blocking [`Transport`] backed by a pooled `ureq` agent.
///
/// Error statuses come back as responses. Timeouts and connection failures surface as
/// `ureq::Error` values, which the built-in transport error predicates recognize.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    connect_timeout: Duration,
    request_timeout: Duration,
    max_response_body_bytes: usize,
}

impl UreqTransport {
    pub fn builder() -> UreqTransportBuilder {
        UreqTransportBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UreqTransport")
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest, body: &Bytes) -> Result<HttpResponse, BoxError> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method().clone())
            .uri(request.uri().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        let http_request = builder.body(body.to_vec())?;

        let configured_request = self
            .agent
            .configure_request(http_request)
            .timeout_global(Some(self.request_timeout))
            .timeout_connect(Some(self.connect_timeout))
            .build();

        let mut response = self.agent.run(configured_request)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = read_all_body_limited(&mut response, self.max_response_body_bytes)?;
        Ok(HttpResponse::new(status, headers, body))
    }
}

#[derive(Clone, Debug)]
pub struct UreqTransportBuilder {
    connect_timeout: Duration,
    request_timeout: Duration,
    user_agent: String,
    max_response_body_bytes: usize,
}

impl Default for UreqTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("retryx/", env!("CARGO_PKG_VERSION")).to_owned(),
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }
}

impl UreqTransportBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes;
        self
    }

    pub fn build(self) -> UreqTransport {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .user_agent(self.user_agent.as_str())
            .build()
            .new_agent();
        UreqTransport {
            agent,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            max_response_body_bytes: self.max_response_body_bytes,
        }
    }
}

fn read_all_body_limited(
    response: &mut ureq::http::Response<ureq::Body>,
    max_bytes: usize,
) -> io::Result<Bytes> {
    let mut reader = response.body_mut().as_reader();
    let mut collected = Vec::new();
    let mut chunk = [0_u8; READ_CHUNK_BYTES];
    let mut total_len = 0_usize;

    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        total_len = total_len.saturating_add(read);
        if total_len > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("response body exceeds {max_bytes} bytes"),
            ));
        }
        collected.extend_from_slice(&chunk[..read]);
    }

    Ok(Bytes::from(collected))
}
