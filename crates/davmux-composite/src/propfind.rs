//! Multistatus fix-ups for delegated PROPFIND responses
//!
//! A backend reports hrefs in its own namespace. Before a response reaches
//! the client every href is moved into the composite namespace: the scheme
//! and host are dropped, the backend's base path is stripped and the
//! virtual prefix (static root and backend folder) is prepended.

use bytes::Bytes;
use regex::bytes::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?P<open>(?:[A-Za-z_][\w.-]*:)?href)(?P<attrs>[^>]*)>(?P<href>[^<]*)</(?P<close>(?:[A-Za-z_][\w.-]*:)?href)\s*>")
        .expect("href pattern is valid")
});

/// Drop `scheme://authority` from an absolute href
fn strip_origin(href: &str) -> &str {
    match href.find("://") {
        Some(i) => {
            let rest = &href[i + 3..];
            rest.find('/').map_or("/", |j| &rest[j..])
        }
        None => href,
    }
}

/// Map one backend href into the composite namespace
fn rewrite_href(href: &str, base_path: &str, prefix: &str) -> String {
    let path = strip_origin(href.trim());

    let relative = if base_path.is_empty() {
        path
    } else if path == base_path {
        ""
    } else {
        path.strip_prefix(base_path)
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(path)
    };

    let relative = relative.trim_start_matches('/');
    let prefix = prefix.trim_end_matches('/');
    format!("{prefix}/{relative}")
}

/// Rewrite every href in `body`.
///
/// `base_path` is the backend base URL's path without a trailing slash;
/// `prefix` is the percent-encoded virtual path of the backend folder, e.g.
/// `/domain/remote1`.
pub fn rewrite_hrefs(body: &[u8], base_path: &str, prefix: &str) -> Bytes {
    let rewritten = HREF.replace_all(body, |caps: &Captures<'_>| {
        let href = String::from_utf8_lossy(&caps["href"]);
        let mut out = Vec::with_capacity(caps[0].len() + prefix.len());
        out.push(b'<');
        out.extend_from_slice(&caps["open"]);
        out.extend_from_slice(&caps["attrs"]);
        out.push(b'>');
        out.extend_from_slice(rewrite_href(&href, base_path, prefix).as_bytes());
        out.extend_from_slice(b"</");
        out.extend_from_slice(&caps["close"]);
        out.push(b'>');
        out
    });
    match rewritten {
        Cow::Borrowed(b) => Bytes::copy_from_slice(b),
        Cow::Owned(v) => Bytes::from(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_href() {
        assert_eq!(rewrite_href("/", "", "/domain/remote1"), "/domain/remote1/");
        assert_eq!(
            rewrite_href("/dir/file.txt", "", "/domain/remote1"),
            "/domain/remote1/dir/file.txt"
        );
        assert_eq!(
            rewrite_href("/share/dir/", "/share", "/domain/remote1"),
            "/domain/remote1/dir/"
        );
        assert_eq!(rewrite_href("/share", "/share", "/r"), "/r/");
        assert_eq!(
            rewrite_href("http://10.0.0.1:8080/share/a%20b", "/share", "/r"),
            "/r/a%20b"
        );
        // Not under the base path: keep it whole below the prefix.
        assert_eq!(rewrite_href("/shared/x", "/share", "/r"), "/r/shared/x");
    }

    #[test]
    fn test_rewrite_hrefs_in_multistatus() {
        let body = br#"<?xml version="1.0" encoding="UTF-8"?>
<D:multistatus xmlns:D="DAV:">
<D:response><D:href>/share/</D:href><D:propstat/></D:response>
<D:response><D:href>/share/file1.txt</D:href><D:propstat/></D:response>
</D:multistatus>"#;

        let out = rewrite_hrefs(body, "/share", "/domain/remote1");
        let out = String::from_utf8(out.to_vec()).unwrap();
        assert!(out.contains("<D:href>/domain/remote1/</D:href>"));
        assert!(out.contains("<D:href>/domain/remote1/file1.txt</D:href>"));
        assert!(!out.contains("/share/"));
    }

    #[test]
    fn test_rewrite_hrefs_other_prefixes() {
        let body = b"<d:multistatus xmlns:d=\"DAV:\"><d:response><d:href>\n/x\n</d:href></d:response></d:multistatus><href>/y</href>";
        let out = rewrite_hrefs(body, "", "/remote1");
        let out = String::from_utf8(out.to_vec()).unwrap();
        assert!(out.contains("<d:href>/remote1/x</d:href>"));
        assert!(out.contains("<href>/remote1/y</href>"));
    }
}
