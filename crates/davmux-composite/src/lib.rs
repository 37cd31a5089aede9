//! davmux Composite - one WebDAV tree over many WebDAV servers
//!
//! This crate holds the request router, the registered backends and the
//! transports and proxies used to reach them.

pub mod backend;
pub mod propfind;
pub mod proxy;
pub mod router;
pub mod transport;

pub use backend::{Backend, BackendSpec};
pub use router::CompositeRouter;
pub use transport::{HttpTransport, Transport, TransportError};
