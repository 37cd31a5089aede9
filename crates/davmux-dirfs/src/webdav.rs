//! Minimal WebDAV responder for the virtual levels
//!
//! Only what a client needs to browse the virtual folders is implemented:
//! OPTIONS, PROPFIND and MKCOL succeed, every other mutation is refused.
//! Request bodies are ignored; PROPFIND always answers with the same small
//! property set.

use crate::fs::VirtualFs;
use crate::node::VirtualNode;
use axum::body::Body;
use davmux_common::path::clean_and_split;
use davmux_common::Error;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, header};
use quick_xml::se::to_string as to_xml;
use serde::Serialize;
use tracing::{debug, warn};

/// Methods advertised for virtual folders
pub const ALLOW: &str = "OPTIONS, PROPFIND, MKCOL";

/// The `Depth` request header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Parse the header. A missing header means infinity; an unrecognized
    /// value yields `None`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        match headers.get("depth").map(HeaderValue::to_str) {
            None => Some(Self::Infinity),
            Some(Ok(v)) => match v.trim() {
                "0" => Some(Self::Zero),
                "1" => Some(Self::One),
                v if v.eq_ignore_ascii_case("infinity") => Some(Self::Infinity),
                _ => None,
            },
            Some(Err(_)) => None,
        }
    }

    /// Numeric form used for path arithmetic and cache keys
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Infinity => u32::MAX,
        }
    }
}

// XML response types for PROPFIND

#[derive(Serialize)]
#[serde(rename = "D:multistatus")]
struct Multistatus {
    #[serde(rename = "@xmlns:D")]
    xmlns: &'static str,
    #[serde(rename = "D:response")]
    responses: Vec<PropResponse>,
}

#[derive(Serialize)]
struct PropResponse {
    #[serde(rename = "D:href")]
    href: String,
    #[serde(rename = "D:propstat")]
    propstat: PropStat,
}

#[derive(Serialize)]
struct PropStat {
    #[serde(rename = "D:prop")]
    prop: Prop,
    #[serde(rename = "D:status")]
    status: &'static str,
}

#[derive(Serialize)]
struct Prop {
    #[serde(rename = "D:displayname")]
    display_name: String,
    #[serde(rename = "D:resourcetype")]
    resource_type: ResourceType,
    #[serde(rename = "D:getcontentlength")]
    content_length: u64,
    #[serde(rename = "D:getlastmodified")]
    last_modified: String,
}

#[derive(Serialize)]
struct ResourceType {
    #[serde(rename = "D:collection")]
    #[serde(skip_serializing_if = "Option::is_none")]
    collection: Option<()>,
}

impl PropResponse {
    fn new(href: String, node: &VirtualNode) -> Self {
        Self {
            href,
            propstat: PropStat {
                prop: Prop {
                    display_name: node.name.clone(),
                    resource_type: ResourceType {
                        collection: node.is_dir.then_some(()),
                    },
                    content_length: node.size,
                    last_modified: node.mod_time.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                },
                status: "HTTP/1.1 200 OK",
            },
        }
    }
}

/// Percent-encoded collection href for the given decoded segments
fn collection_href<S: AsRef<str>>(segments: &[S]) -> String {
    let mut href = String::from("/");
    for segment in segments {
        href.push_str(&urlencoding::encode(segment.as_ref()));
        href.push('/');
    }
    href
}

/// Serialize a multistatus body for the decoded `path` and, unless `depth`
/// is zero, the entries listed under it.
pub fn propfind_body(fs: &VirtualFs, path: &str, depth: Depth) -> davmux_common::Result<String> {
    let node = fs.stat(path)?;
    let segments: Vec<String> = clean_and_split(path)
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut responses = vec![PropResponse::new(collection_href(&segments), &node)];
    if depth != Depth::Zero {
        for child in fs.list(path)? {
            let mut child_segments = segments.clone();
            child_segments.push(child.name.clone());
            responses.push(PropResponse::new(collection_href(&child_segments), &child));
        }
    }

    let body = Multistatus {
        xmlns: "DAV:",
        responses,
    };
    let xml = to_xml(&body).map_err(|e| Error::internal(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{xml}"))
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
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn method_not_allowed() -> Response<Body> {
    let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(ALLOW));
    response
}

/// Extract the path from a `Destination` header, which may be absolute
fn destination_path(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("destination")?.to_str().ok()?;
    let uri: http::Uri = raw.parse().ok()?;
    Some(uri.path().to_string())
}

/// Answer a request whose path lies within the virtual levels.
///
/// `path` must already be percent-decoded.
pub fn serve(fs: &VirtualFs, method: &Method, path: &str, headers: &HeaderMap) -> Response<Body> {
    debug!("Serving {} {} from virtual tree", method, path);

    let result = match method.as_str() {
        "OPTIONS" => {
            let mut response = status_response(StatusCode::OK);
            let h = response.headers_mut();
            h.insert("dav", HeaderValue::from_static("1, 2"));
            h.insert("ms-author-via", HeaderValue::from_static("DAV"));
            h.insert(header::ALLOW, HeaderValue::from_static(ALLOW));
            return response;
        }
        "PROPFIND" => {
            let Some(depth) = Depth::from_headers(headers) else {
                return status_response(StatusCode::BAD_REQUEST);
            };
            propfind_body(fs, path, depth).map(|xml| {
                let mut response = Response::new(Body::from(xml));
                *response.status_mut() = StatusCode::MULTI_STATUS;
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/xml; charset=utf-8"),
                );
                response
            })
        }
        // Collections have no content.
        "GET" | "HEAD" => fs.stat(path).map(|_| method_not_allowed()),
        "MKCOL" => fs.mkdir(path).map(|()| status_response(StatusCode::CREATED)),
        "DELETE" => fs.remove_all(path).map(|()| status_response(StatusCode::NO_CONTENT)),
        "MOVE" | "COPY" => {
            let destination = destination_path(headers).unwrap_or_default();
            fs.rename(path, &destination)
                .map(|()| status_response(StatusCode::CREATED))
        }
        "PUT" | "PROPPATCH" | "LOCK" | "UNLOCK" => fs
            .create_file(path)
            .map(|()| status_response(StatusCode::NO_CONTENT)),
        _ => return method_not_allowed(),
    };

    result.unwrap_or_else(|err| {
        if !err.is_not_exist() {
            warn!("Refused {} {}: {}", method, path, err);
        }
        error_response(&err)
    })
}
