//! davmux DirFS - the virtual part of the composite tree
//!
//! [`VirtualFs`] answers stat, listing and mutation queries for the root,
//! the optional static root and the per-backend folders. [`webdav::serve`]
//! turns those answers into WebDAV responses.

pub mod fs;
pub mod node;
pub mod webdav;

pub use fs::{Location, VirtualFs};
pub use node::VirtualNode;
pub use webdav::Depth;
