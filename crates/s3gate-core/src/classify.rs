//! Request classification for metrics labels.
//!
//! A request is an object download when it is a `GET` on `/bucket/key` that does
//! not name a listing, a part, a version or a multipart upload.

use std::fmt;

use http::{Method, Uri};
use percent_encoding::percent_decode_str;

/// Query parameters that turn a `/bucket/key` request into something other than a
/// plain object download.
const NON_OBJECT_QUERY_KEYS: [&str; 5] = ["list-type", "partnumber", "versionid", "uploadid", "uploads"];

/// Kind of a proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Object download.
    GetObject,
    /// Anything else.
    Other,
}

impl RequestKind {
    /// Metrics label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetObject => "get_object",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a request by method and URI.
#[must_use]
pub fn classify(method: &Method, uri: &Uri) -> RequestKind {
    if method == Method::GET && is_get_object_uri(uri) {
        RequestKind::GetObject
    } else {
        RequestKind::Other
    }
}

/// Whether `uri` addresses a single object as `/bucket/key`.
///
/// Both segments must be non-empty, the key must not end with `/`, and the query
/// must not carry `list-type`, `partNumber`, `versionId`, `uploadId` or `uploads`
/// (compared case-insensitively).
#[must_use]
pub fn is_get_object_uri(uri: &Uri) -> bool {
    let Some(path) = uri.path().strip_prefix('/') else {
        return false;
    };
    let Some((bucket, key)) = path.split_once('/') else {
        return false;
    };
    if bucket.is_empty() || key.is_empty() || key.ends_with('/') {
        return false;
    }

    !uri.query().is_some_and(|query| {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').map_or(pair, |(k, _)| k))
            .any(|key| {
                let key = percent_decode_str(key).decode_utf8_lossy();
                NON_OBJECT_QUERY_KEYS
                    .iter()
                    .any(|reserved| key.eq_ignore_ascii_case(reserved))
            })
    })
}
