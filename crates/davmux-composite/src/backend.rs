//! Backends: the remote WebDAV services shown as folders

use crate::proxy::ReverseProxy;
use crate::transport::Transport;
use axum::body::Body;
use davmux_common::{Error, Result};
use http::{Request, Response, Uri};
use std::fmt;
use std::sync::Arc;

/// What a caller supplies to register a backend
#[derive(Clone)]
pub struct BackendSpec {
    /// Folder name, unique within the set
    pub name: String,
    /// Base URL; the request path below the folder is appended to it
    pub base_url: String,
    /// Connection pool used to reach the backend
    pub transport: Arc<dyn Transport>,
}

impl BackendSpec {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            transport,
        }
    }
}

impl fmt::Debug for BackendSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSpec")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// A registered backend with its proxy
pub struct Backend {
    name: String,
    base_url: String,
    transport: Arc<dyn Transport>,
    proxy: ReverseProxy,
}

impl Backend {
    /// Register `spec`, building its proxy
    pub fn new(spec: BackendSpec) -> Self {
        let proxy = ReverseProxy::new(Arc::clone(&spec.transport));
        Self {
            name: spec.name,
            base_url: spec.base_url,
            transport: spec.transport,
            proxy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn parse_base(&self) -> Result<Uri> {
        let invalid = |reason: String| Error::InvalidBackendUrl {
            url: self.base_url.clone(),
            reason,
        };
        let uri: Uri = self.base_url.parse().map_err(|e| invalid(format!("{e}")))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(invalid("missing scheme or host".to_string()));
        }
        Ok(uri)
    }

    /// Path component of the base URL without a trailing slash
    pub fn base_path(&self) -> Result<String> {
        let base = self.parse_base()?;
        Ok(base.path().trim_end_matches('/').to_string())
    }

    /// Build the backend URI for the (still percent-encoded) path segments
    /// below this backend's folder
    pub fn target_uri(&self, rest: &[&str], trailing_slash: bool, query: Option<&str>) -> Result<Uri> {
        let base = self.parse_base()?;

        let mut path = base.path().trim_end_matches('/').to_string();
        for segment in rest {
            path.push('/');
            path.push_str(segment);
        }
        if path.is_empty() || (trailing_slash && !path.ends_with('/')) {
            path.push('/');
        }
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };

        let mut parts = base.into_parts();
        parts.path_and_query = Some(
            path_and_query
                .parse()
                .map_err(|e| Error::internal(format!("bad rewritten path: {e}")))?,
        );
        Uri::from_parts(parts).map_err(|e| Error::internal(e.to_string()))
    }

    /// Forward `request` to `target` through this backend's proxy
    pub async fn forward(&self, request: Request<Body>, target: Uri) -> Response<Body> {
        self.proxy.forward(request, target).await
    }

    pub fn close_idle_connections(&self) {
        self.transport.close_idle_connections();
    }

    /// Whether this backend shares its transport with `other`
    pub(crate) fn shares_transport(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.transport), Arc::as_ptr(&other.transport))
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn round_trip(
            &self,
            _request: Request<Body>,
        ) -> std::result::Result<Response<Body>, TransportError> {
            Err(TransportError::Timeout)
        }
    }

    fn backend(url: &str) -> Backend {
        Backend::new(BackendSpec::new("remote1", url, Arc::new(NullTransport)))
    }

    #[test]
    fn test_target_uri() {
        let b = backend("http://10.0.0.1:8080/share/");
        assert_eq!(
            b.target_uri(&["dir", "file%201.txt"], false, None).unwrap(),
            "http://10.0.0.1:8080/share/dir/file%201.txt"
        );
        assert_eq!(
            b.target_uri(&["dir"], true, Some("a=1")).unwrap(),
            "http://10.0.0.1:8080/share/dir/?a=1"
        );
        assert_eq!(
            b.target_uri(&[], false, None).unwrap(),
            "http://10.0.0.1:8080/share"
        );
    }

    #[test]
    fn test_target_uri_without_base_path() {
        let b = backend("http://10.0.0.1");
        assert_eq!(b.target_uri(&[], false, None).unwrap(), "http://10.0.0.1/");
        assert_eq!(
            b.target_uri(&["a"], false, None).unwrap(),
            "http://10.0.0.1/a"
        );
        assert_eq!(b.base_path().unwrap(), "");
    }

    #[test]
    fn test_malformed_base_url() {
        let err = backend("not a url").target_uri(&["a"], false, None).unwrap_err();
        assert_eq!(err.http_status_code(), 500);

        let err = backend("/relative/only").target_uri(&[], false, None).unwrap_err();
        assert!(err.to_string().contains("missing scheme or host"));
    }

    #[test]
    fn test_shares_transport() {
        let shared: Arc<dyn Transport> = Arc::new(NullTransport);
        let a = Backend::new(BackendSpec::new("a", "http://a", Arc::clone(&shared)));
        let b = Backend::new(BackendSpec::new("b", "http://b", shared));
        let c = backend("http://c");
        assert!(a.shares_transport(&b));
        assert!(!a.shares_transport(&c));
    }
}
