//! Synthetic directory entries

use chrono::{DateTime, Utc};

/// A directory that exists only in the composite namespace.
///
/// Virtual nodes are computed per query and never stored; `mod_time` is
/// whatever the clock said at that moment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualNode {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub mod_time: DateTime<Utc>,
}

impl VirtualNode {
    /// An empty directory named `name`
    pub fn dir(name: impl Into<String>, mod_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_dir: true,
            mod_time,
        }
    }
}
