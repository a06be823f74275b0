use http::header::{HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, Uri};

use crate::endpoint::Endpoint;
use crate::error::Error;

/// The head of an outgoing request: everything the retry loop needs to pick a target.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    pub fn parse(method: Method, uri: &str) -> crate::Result<Self> {
        let parsed = uri.parse().map_err(|_| Error::InvalidUri {
            uri: uri.to_owned(),
        })?;
        Ok(Self::new(method, parsed))
    }

    pub fn get(uri: &str) -> crate::Result<Self> {
        Self::parse(Method::GET, uri)
    }

    pub fn post(uri: &str) -> crate::Result<Self> {
        Self::parse(Method::POST, uri)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(mut self, name: &str, value: &str) -> crate::Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|source| {
            Error::RequestBuild {
                source: source.into(),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|source| Error::RequestBuild {
            source: source.into(),
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The endpoint this request currently targets.
    pub fn endpoint(&self) -> Option<Endpoint> {
        Endpoint::from_uri(&self.uri)
    }

    /// Returns a copy of this request aimed at `endpoint`.
    ///
    /// Only host and port change; scheme, path and query are kept.
    pub fn with_endpoint(&self, endpoint: &Endpoint) -> crate::Result<Self> {
        let authority_text = endpoint.authority();
        let authority: Authority = authority_text.parse().map_err(|_| Error::InvalidUri {
            uri: authority_text.clone(),
        })?;

        let mut parts = self.uri.clone().into_parts();
        parts.authority = Some(authority);
        if parts.scheme.is_none() {
            parts.scheme = Some(Scheme::HTTP);
        }
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        let uri = Uri::from_parts(parts).map_err(|_| Error::InvalidUri {
            uri: format!("{}{}", authority_text, self.uri.path()),
        })?;

        Ok(Self {
            method: self.method.clone(),
            uri,
            headers: self.headers.clone(),
        })
    }
}
