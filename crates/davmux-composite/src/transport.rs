//! Backend transports
//!
//! A [`Transport`] performs one HTTP exchange with a backend and owns
//! whatever connection pool makes that cheap. [`HttpTransport`] is the
//! production implementation on top of `reqwest`.

use async_trait::async_trait;
use axum::body::{Body, HttpBody as _};
use davmux_common::config::TransportConfig;
use http::{Request, Response};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("client build failed: {0}")]
    Build(String),
}

impl From<TransportError> for davmux_common::Error {
    fn from(err: TransportError) -> Self {
        Self::backend(err.to_string())
    }
}

/// One request/response exchange with a backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` (with an absolute URI) and return the backend's response
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;

    /// Release pooled connections that are not currently in use
    fn close_idle_connections(&self) {}
}

/// Pooled HTTP/1.1 transport backed by `reqwest`
pub struct HttpTransport {
    settings: TransportConfig,
    client: RwLock<reqwest::Client>,
}

impl HttpTransport {
    pub fn new(settings: TransportConfig) -> Result<Self, TransportError> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client: RwLock::new(client),
        })
    }
}

fn build_client(settings: &TransportConfig) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout())
        .pool_idle_timeout(settings.pool_idle_timeout())
        .pool_max_idle_per_host(settings.pool_max_idle_per_host)
        // Backends answer for themselves; 3xx goes back to the client.
        .redirect(reqwest::redirect::Policy::none());
    if let Some(timeout) = settings.request_timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}

fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::ConnectionFailed(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let client = self.client.read().clone();
        let (parts, body) = request.into_parts();

        let mut builder = client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);
        if body.size_hint().exact() != Some(0) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = builder.send().await.map_err(|e| classify(&e))?;

        let mut response = Response::builder()
            .status(upstream.status())
            .body(Body::empty())
            .map_err(|e| TransportError::Request(e.to_string()))?;
        *response.headers_mut() = upstream.headers().clone();
        *response.body_mut() = Body::from_stream(upstream.bytes_stream());
        Ok(response)
    }

    fn close_idle_connections(&self) {
        // Idle connections belong to the client's pool; swapping the client
        // drops that pool once in-flight requests finish with it.
        match build_client(&self.settings) {
            Ok(fresh) => {
                *self.client.write() = fresh;
                debug!("Closed idle backend connections");
            }
            Err(e) => warn!("Failed to rebuild HTTP client: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_error_maps_to_backend_error() {
        let err: davmux_common::Error = TransportError::Timeout.into();
        assert_eq!(err.http_status_code(), 502);
        assert_eq!(err.to_string(), "backend error: request timeout");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let settings = TransportConfig {
            connect_timeout_ms: 500,
            ..TransportConfig::default()
        };
        let transport = HttpTransport::new(settings).unwrap();

        // Bind then drop to get a port with nothing listening.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let request = Request::builder()
            .uri(format!("http://127.0.0.1:{port}/x"))
            .body(Body::empty())
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), transport.round_trip(request))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConnectionFailed(_) | TransportError::Request(_)
        ));

        transport.close_idle_connections();
    }
}
