//! Slash-separated request path helpers
//!
//! Paths are treated lexically: empty and `.` segments are dropped and `..`
//! pops the previous segment, never climbing above the root.

/// Clean `path` and split it into its segments. The root yields no segments.
#[must_use]
pub fn clean_and_split(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments
}

/// Join segments into an absolute path
#[must_use]
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment.as_ref());
    }
    out
}

/// Whether `path` names the root
#[must_use]
pub fn is_root(path: &str) -> bool {
    clean_and_split(path).is_empty()
}
