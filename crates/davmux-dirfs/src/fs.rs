//! Virtual directory filesystem
//!
//! Presents the registered backends as folders, optionally nested under a
//! single static root:
//!
//! ```text
//! /                      root
//! └── domain/            static root (optional)
//!     ├── remote1/       one folder per backend
//!     └── remote2/
//! ```
//!
//! Nothing here is writable. Anything below a backend folder belongs to the
//! backend and is never asked of this filesystem.

use crate::node::VirtualNode;
use davmux_common::path::clean_and_split;
use davmux_common::{Error, Result, SharedClock};

/// Where a path lands in the virtual tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Root,
    StaticRoot,
    /// Index into the sorted child names
    Child(usize),
}

/// Read-only tree of virtual folders
#[derive(Clone)]
pub struct VirtualFs {
    clock: SharedClock,
    static_root: Option<String>,
    /// Sorted, deduplicated backend names
    children: Vec<String>,
}

impl VirtualFs {
    pub fn new<I, S>(clock: SharedClock, static_root: Option<String>, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut children: Vec<String> = children.into_iter().map(Into::into).collect();
        children.sort();
        children.dedup();
        Self {
            clock,
            static_root: static_root.filter(|r| !r.is_empty()),
            children,
        }
    }

    pub fn static_root(&self) -> Option<&str> {
        self.static_root.as_deref()
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Number of leading path segments that are virtual
    pub const fn virtual_depth(&self) -> usize {
        if self.static_root.is_some() { 2 } else { 1 }
    }

    /// Resolve `path` to a virtual node location
    pub fn locate(&self, path: &str) -> Option<Location> {
        let segments = clean_and_split(path);
        match (self.static_root.as_deref(), segments.as_slice()) {
            (_, []) => Some(Location::Root),
            (Some(root), [name]) if *name == root => Some(Location::StaticRoot),
            (Some(root), [first, name]) if *first == root => self.find_child(name),
            (None, [name]) => self.find_child(name),
            _ => None,
        }
    }

    fn find_child(&self, name: &str) -> Option<Location> {
        self.children
            .binary_search_by(|c| c.as_str().cmp(name))
            .ok()
            .map(Location::Child)
    }

    fn node(&self, location: Location) -> VirtualNode {
        let now = self.clock.now();
        match location {
            Location::Root => VirtualNode::dir("", now),
            Location::StaticRoot => VirtualNode::dir(self.static_root.as_deref().unwrap_or(""), now),
            Location::Child(i) => VirtualNode::dir(self.children[i].as_str(), now),
        }
    }

    fn child_nodes(&self) -> Vec<VirtualNode> {
        let now = self.clock.now();
        self.children
            .iter()
            .map(|name| VirtualNode::dir(name.as_str(), now))
            .collect()
    }

    /// Describe the node at `path`
    pub fn stat(&self, path: &str) -> Result<VirtualNode> {
        self.locate(path)
            .map(|l| self.node(l))
            .ok_or_else(|| Error::not_exist(path))
    }

    /// List the entries directly under `path`, sorted by name
    pub fn list(&self, path: &str) -> Result<Vec<VirtualNode>> {
        match self.locate(path) {
            Some(Location::Root) => match self.static_root {
                Some(_) => Ok(vec![self.node(Location::StaticRoot)]),
                None => Ok(self.child_nodes()),
            },
            Some(Location::StaticRoot) => Ok(self.child_nodes()),
            // A backend's contents live on the backend.
            Some(Location::Child(_)) => Ok(Vec::new()),
            None => Err(Error::not_exist(path)),
        }
    }

    /// Succeeds without doing anything when `path` already exists
    pub fn mkdir(&self, path: &str) -> Result<()> {
        match self.locate(path) {
            Some(_) => Ok(()),
            None => Err(Error::PermissionDenied),
        }
    }

    pub fn remove_all(&self, _path: &str) -> Result<()> {
        Err(Error::PermissionDenied)
    }

    pub fn rename(&self, _old_path: &str, _new_path: &str) -> Result<()> {
        Err(Error::PermissionDenied)
    }

    /// Files cannot be created or modified at the virtual level
    pub fn create_file(&self, _path: &str) -> Result<()> {
        Err(Error::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use davmux_common::{Clock, ManualClock};
    use std::sync::Arc;

    fn create_file_system() -> (VirtualFs, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fs = VirtualFs::new(
            clock.clone(),
            Some("domain".to_string()),
            ["remote4", "remote1", "remote2"],
        );
        (fs, clock)
    }

    fn assert_dir(node: &VirtualNode, name: &str, clock: &ManualClock) {
        assert_eq!(node.name, name);
        assert_eq!(node.size, 0);
        assert!(node.is_dir);
        assert_eq!(node.mod_time, clock.now());
    }

    #[test]
    fn test_stat() {
        let (fs, clock) = create_file_system();

        assert_dir(&fs.stat("").unwrap(), "", &clock);
        assert_dir(&fs.stat("/").unwrap(), "", &clock);
        assert_dir(&fs.stat("/domain").unwrap(), "domain", &clock);
        assert_dir(&fs.stat("/domain/remote1").unwrap(), "remote1", &clock);
        assert_dir(&fs.stat("/domain/remote2/").unwrap(), "remote2", &clock);

        let err = fs.stat("remote3").unwrap_err();
        assert!(err.is_not_exist());
        assert!(fs.stat("/domain/remote3").unwrap_err().is_not_exist());
        assert!(fs.stat("/other/remote1").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_stat_follows_clock() {
        let (fs, clock) = create_file_system();
        clock.advance(Duration::minutes(3));
        assert_dir(&fs.stat("/domain").unwrap(), "domain", &clock);
    }

    #[test]
    fn test_list_dir() {
        let (fs, clock) = create_file_system();

        let root = fs.list("").unwrap();
        assert_eq!(root.len(), 1);
        assert_dir(&root[0], "domain", &clock);

        let names: Vec<_> = fs
            .list("/domain")
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["remote1", "remote2", "remote4"]);

        assert!(fs.list("/domain/remote1").unwrap().is_empty());
        assert!(fs.list("/nope").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_without_static_root() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fs = VirtualFs::new(clock.clone(), None, ["b", "a"]);
        assert_eq!(fs.virtual_depth(), 1);

        let names: Vec<_> = fs.list("/").unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_dir(&fs.stat("/a").unwrap(), "a", &clock);
        assert!(fs.stat("/a/b").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_mkdir() {
        let (fs, _) = create_file_system();

        fs.mkdir("/").unwrap();
        fs.mkdir("/domain").unwrap();
        fs.mkdir("/domain/remote1").unwrap();

        let err = fs.mkdir("/domain/remote3").unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_remove_all() {
        let (fs, _) = create_file_system();
        assert!(fs.remove_all("/").unwrap_err().is_permission_denied());
        assert!(fs.remove_all("/domain/remote1").unwrap_err().is_permission_denied());
    }

    #[test]
    fn test_rename() {
        let (fs, _) = create_file_system();
        let err = fs.rename("/", "/domain/remote2/copy.txt").unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn test_create_file() {
        let (fs, _) = create_file_system();
        assert!(fs.create_file("/domain/notes.txt").unwrap_err().is_permission_denied());
    }
}
