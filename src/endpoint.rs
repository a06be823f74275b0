use std::fmt;

use http::Uri;

use crate::util::default_port;

/// A concrete network target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Derives the endpoint a URI points at. The scheme's default port is used when the URI
    /// carries none; `None` is returned for URIs without a host.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        let host = uri.host()?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        let port = uri
            .port_u16()
            .unwrap_or_else(|| default_port(uri.scheme_str()));
        Some(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.authority())
    }
}

/// Maps a logical service endpoint to the ordered list of concrete candidates serving it.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, service: &Endpoint) -> Vec<Endpoint>;
}

impl<F> EndpointResolver for F
where
    F: Fn(&Endpoint) -> Vec<Endpoint> + Send + Sync,
{
    fn resolve(&self, service: &Endpoint) -> Vec<Endpoint> {
        self(service)
    }
}

/// Resolves every service to the same fixed candidate list.
#[derive(Clone, Debug, Default)]
pub struct StaticEndpointResolver {
    endpoints: Vec<Endpoint>,
}

impl StaticEndpointResolver {
    pub fn new<I>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = Endpoint>,
    {
        Self {
            endpoints: endpoints.into_iter().collect(),
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

impl EndpointResolver for StaticEndpointResolver {
    fn resolve(&self, _service: &Endpoint) -> Vec<Endpoint> {
        self.endpoints.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use http::Uri;

    use super::{Endpoint, EndpointResolver, StaticEndpointResolver};

    #[test]
    fn from_uri_uses_scheme_default_port() {
        let uri: Uri = "https://api.example.com/v1".parse().expect("uri should parse");
        assert_eq!(
            Endpoint::from_uri(&uri),
            Some(Endpoint::new("api.example.com", 443))
        );

        let uri: Uri = "http://hello/test".parse().expect("uri should parse");
        assert_eq!(Endpoint::from_uri(&uri), Some(Endpoint::new("hello", 80)));
    }

    #[test]
    fn from_uri_keeps_explicit_port_and_unwraps_ipv6() {
        let uri: Uri = "http://[::1]:9998/test".parse().expect("uri should parse");
        let endpoint = Endpoint::from_uri(&uri).expect("endpoint should be derived");
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.port(), 9998);
        assert_eq!(endpoint.to_string(), "[::1]:9998");
    }

    #[test]
    fn from_uri_rejects_relative_uri() {
        let uri: Uri = "/only/a/path".parse().expect("uri should parse");
        assert_eq!(Endpoint::from_uri(&uri), None);
    }

    #[test]
    fn endpoints_compare_by_value() {
        let mut seen = HashSet::new();
        assert!(seen.insert(Endpoint::new("localhost", 9997)));
        assert!(!seen.insert(Endpoint::new("localhost", 9997)));
        assert!(seen.insert(Endpoint::new("localhost", 9998)));
    }

    #[test]
    fn closures_act_as_resolvers() {
        let resolver = |service: &Endpoint| vec![service.clone(), Endpoint::new("backup", 8080)];
        let resolved = resolver.resolve(&Endpoint::new("hello", 80));
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1], Endpoint::new("backup", 8080));

        let fixed = StaticEndpointResolver::new([Endpoint::new("a", 1)]);
        assert_eq!(fixed.resolve(&Endpoint::new("ignored", 80)), fixed.endpoints());
    }
}
