//! Composite router
//!
//! [`CompositeRouter`] is the single entry point for every WebDAV request.
//! Paths within the virtual levels (root, static root, backend folders) are
//! answered from a [`VirtualFs`]; anything deeper is rewritten onto the
//! owning backend's base URL and proxied there.
//!
//! ```text
//! /domain/remote1/docs/a.txt  ──►  http://10.0.0.2:8080/share/docs/a.txt
//!  └──┬──┘└──┬──┘
//!  static  backend
//!   root    name
//! ```

use crate::backend::{Backend, BackendSpec};
use crate::propfind;
use axum::body::Body;
use axum::extract::State;
use davmux_cache::StatCache;
use davmux_common::path::{clean_and_split, join};
use davmux_common::{Error, SharedClock, system_clock};
use davmux_dirfs::{Depth, VirtualFs, webdav};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, header};
use http_body_util::BodyExt;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One immutable generation of the backend set
struct Routes {
    /// Sorted by name
    backends: Vec<Arc<Backend>>,
    fs: VirtualFs,
}

impl Routes {
    fn new(clock: SharedClock, static_root: Option<String>, backends: Vec<Arc<Backend>>) -> Self {
        let fs = VirtualFs::new(clock, static_root, backends.iter().map(|b| b.name().to_string()));
        Self { backends, fs }
    }

    fn find(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends
            .binary_search_by(|b| b.name().cmp(name))
            .ok()
            .map(|i| &self.backends[i])
    }
}

/// Methods that never modify anything
fn is_read_only(method: &Method) -> bool {
    matches!(method.as_str(), "GET" | "HEAD" | "OPTIONS" | "PROPFIND")
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment).map_or_else(|_| segment.to_string(), Cow::into_owned)
}

/// The `Destination` of a MOVE or COPY that stays within `backend`,
/// rewritten onto the backend's own URL. `None` leaves the header alone.
fn backend_destination(routes: &Routes, backend: &Backend, headers: &HeaderMap) -> Option<HeaderValue> {
    let uri: Uri = headers.get("destination")?.to_str().ok()?.parse().ok()?;
    let path = uri.path();
    let segments = clean_and_split(path);
    let virtual_depth = routes.fs.virtual_depth();
    if segments.len() < virtual_depth {
        return None;
    }
    if let Some(root) = routes.fs.static_root() {
        if decode_segment(segments[0]) != root {
            return None;
        }
    }
    if decode_segment(segments[virtual_depth - 1]) != backend.name() {
        return None;
    }

    let target = backend
        .target_uri(&segments[virtual_depth..], path.ends_with('/'), None)
        .ok()?;
    HeaderValue::from_str(&target.to_string()).ok()
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn error_response(err: &Error) -> Response<Body> {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = status;
    response
}

fn multistatus_response(body: bytes::Bytes) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::MULTI_STATUS;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    response
}

/// Routes requests between the virtual tree and the backends
pub struct CompositeRouter {
    clock: SharedClock,
    stat_cache: Option<StatCache>,
    routes: RwLock<Arc<Routes>>,
}

impl Default for CompositeRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeRouter {
    /// A router with no backends, no static root and no cache
    pub fn new() -> Self {
        let clock = system_clock();
        let routes = Routes::new(Arc::clone(&clock), None, Vec::new());
        Self {
            clock,
            stat_cache: None,
            routes: RwLock::new(Arc::new(routes)),
        }
    }

    /// Cache delegated PROPFIND results for `ttl`
    #[must_use]
    pub fn with_stat_cache(mut self, ttl: Duration) -> Self {
        self.stat_cache = Some(StatCache::new(ttl));
        self
    }

    /// Use `clock` for virtual node timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        let routes = self.routes.get_mut();
        let static_root = routes.fs.static_root().map(str::to_string);
        *routes = Arc::new(Routes::new(
            Arc::clone(&clock),
            static_root,
            routes.backends.clone(),
        ));
        self.clock = clock;
        self
    }

    pub const fn stat_cache(&self) -> Option<&StatCache> {
        self.stat_cache.as_ref()
    }

    fn snapshot(&self) -> Arc<Routes> {
        Arc::clone(&self.routes.read())
    }

    /// Number of leading path segments answered by the virtual tree: 1, or
    /// 2 when a static root is configured
    pub fn virtual_depth(&self) -> usize {
        self.routes.read().fs.virtual_depth()
    }

    pub fn static_root(&self) -> Option<String> {
        self.routes.read().fs.static_root().map(str::to_string)
    }

    /// Names of the current backends, sorted
    pub fn backend_names(&self) -> Vec<String> {
        self.routes.read().fs.children().to_vec()
    }

    /// Find a backend by folder name
    pub fn lookup_backend(&self, name: &str) -> Option<Arc<Backend>> {
        self.routes.read().find(name).cloned()
    }

    /// Replace the entire backend set and static root.
    ///
    /// The new set is built and sorted before the swap; readers see either
    /// the old set or the new one. Afterwards idle connections of the old
    /// backends are closed unless a new backend still uses the same
    /// transport.
    pub fn replace_backends(&self, static_root: Option<String>, specs: Vec<BackendSpec>) {
        let mut backends: Vec<Arc<Backend>> =
            specs.into_iter().map(|s| Arc::new(Backend::new(s))).collect();
        backends.sort_by(|a, b| a.name().cmp(b.name()));
        let before = backends.len();
        backends.dedup_by(|a, b| a.name() == b.name());
        if backends.len() != before {
            warn!(
                "Ignored {} backend(s) with duplicate names",
                before - backends.len()
            );
        }

        let routes = Arc::new(Routes::new(Arc::clone(&self.clock), static_root, backends));
        let old = std::mem::replace(&mut *self.routes.write(), Arc::clone(&routes));

        info!(
            "Installed {} backend(s) (static root: {:?})",
            routes.backends.len(),
            routes.fs.static_root()
        );

        if let Some(cache) = &self.stat_cache {
            cache.invalidate();
        }

        for backend in &old.backends {
            if !routes.backends.iter().any(|b| b.shares_transport(backend)) {
                backend.close_idle_connections();
            }
        }
    }

    /// Drop every backend, close their idle connections and stop the cache
    pub fn shutdown(&self) {
        let old = {
            let mut routes = self.routes.write();
            let static_root = routes.fs.static_root().map(str::to_string);
            let cleared = Arc::new(Routes::new(Arc::clone(&self.clock), static_root, Vec::new()));
            std::mem::replace(&mut *routes, cleared)
        };

        for backend in &old.backends {
            backend.close_idle_connections();
        }
        if let Some(cache) = &self.stat_cache {
            cache.invalidate();
            cache.stop();
        }
        info!("Composite router shut down ({} backend(s) released)", old.backends.len());
    }

    /// Handle one request
    pub async fn serve(&self, request: Request<Body>) -> Response<Body> {
        let routes = self.snapshot();

        if request.method().as_str() == "PROPFIND" {
            return self.handle_propfind(&routes, request).await;
        }

        if !is_read_only(request.method()) {
            if let Some(cache) = &self.stat_cache {
                cache.invalidate();
            }
        }

        let path = request.uri().path().to_string();
        let segments = clean_and_split(&path);
        let virtual_depth = routes.fs.virtual_depth();
        if segments.len() >= virtual_depth {
            return Self::delegate(&routes, &segments[virtual_depth - 1..], path.ends_with('/'), request)
                .await;
        }

        Self::serve_locally(&routes, &request)
    }

    fn serve_locally(routes: &Routes, request: &Request<Body>) -> Response<Body> {
        let raw = request.uri().path();
        let path = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
        webdav::serve(&routes.fs, request.method(), &path, request.headers())
    }

    /// Forward to the backend named by `segments[0]`
    async fn delegate(
        routes: &Routes,
        segments: &[&str],
        trailing_slash: bool,
        mut request: Request<Body>,
    ) -> Response<Body> {
        let name = decode_segment(segments[0]);
        let Some(backend) = routes.find(&name) else {
            debug!("No backend named {:?}", name);
            return status_response(StatusCode::NOT_FOUND);
        };

        let target = match backend.target_uri(
            &segments[1..],
            trailing_slash,
            request.uri().query(),
        ) {
            Ok(target) => target,
            Err(e) => {
                error!("Cannot route to backend {}: {}", backend.name(), e);
                return error_response(&e);
            }
        };

        if let Some(destination) = backend_destination(routes, backend, request.headers()) {
            debug!("Destination rewritten to {:?}", destination);
            request.headers_mut().insert("destination", destination);
        }

        backend.forward(request, target).await
    }

    async fn handle_propfind(&self, routes: &Routes, mut request: Request<Body>) -> Response<Body> {
        let Some(depth) = Depth::from_headers(request.headers()) else {
            return status_response(StatusCode::BAD_REQUEST);
        };

        let path = request.uri().path().to_string();
        let segments = clean_and_split(&path);
        let virtual_depth = routes.fs.virtual_depth();
        let reach = segments
            .len()
            .saturating_add(usize::try_from(depth.as_u32()).unwrap_or(usize::MAX));
        if segments.len() < virtual_depth || reach <= virtual_depth {
            return Self::serve_locally(routes, &request);
        }

        let cache_depth = depth.as_u32();
        if let Some(body) = self.stat_cache.as_ref().and_then(|c| c.get(&path, cache_depth)) {
            debug!("PROPFIND {} depth {:?} served from cache", path, depth);
            return multistatus_response(body);
        }

        let name = decode_segment(segments[virtual_depth - 1]);
        let Some(backend) = routes.find(&name) else {
            return status_response(StatusCode::NOT_FOUND);
        };
        let base_path = match backend.base_path() {
            Ok(p) => p,
            Err(e) => return error_response(&e),
        };
        let prefix = join(&segments[..virtual_depth]);

        // The body gets rewritten below, so ask for it uncompressed.
        request.headers_mut().remove(header::ACCEPT_ENCODING);
        let response = Self::delegate(
            routes,
            &segments[virtual_depth - 1..],
            path.ends_with('/'),
            request,
        )
        .await;
        if response.status() != StatusCode::MULTI_STATUS {
            return response;
        }

        let (mut parts, body) = response.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read PROPFIND response from {}: {}", backend.name(), e);
                return error_response(&Error::backend(e.to_string()));
            }
        };

        let rewritten = propfind::rewrite_hrefs(&bytes, &base_path, &prefix);
        if let Some(cache) = &self.stat_cache {
            cache.set(&path, cache_depth, rewritten.clone());
        }

        parts.headers.remove(header::CONTENT_LENGTH);
        Response::from_parts(parts, Body::from(rewritten))
    }

    /// An axum router that sends every request, whatever its method, here
    pub fn into_router(self: Arc<Self>) -> axum::Router {
        axum::Router::new().fallback(handle).with_state(self)
    }
}

async fn handle(State(router): State<Arc<CompositeRouter>>, request: Request<Body>) -> Response<Body> {
    router.serve(request).await
}
