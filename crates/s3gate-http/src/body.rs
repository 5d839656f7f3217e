//! Response body type for the proxy.
//!
//! [`ProxyBody`] covers the three kinds of response the proxy produces:
//!
//! - **Streaming**: an upstream response body relayed frame by frame.
//! - **Buffered**: a small locally generated body, such as a rejection message.
//! - **Empty**: a rejection without detail.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::Frame;
use http_body_util::Full;
use http_body_util::combinators::UnsyncBoxBody;

/// Body of every response returned by the proxy.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper responses.
#[derive(Default)]
pub enum ProxyBody {
    /// Relayed upstream body.
    Streaming(UnsyncBoxBody<Bytes, io::Error>),
    /// Locally generated body.
    Buffered(Full<Bytes>),
    /// No body.
    #[default]
    Empty,
}

impl ProxyBody {
    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Wrap a streaming body.
    #[must_use]
    pub fn streaming(body: UnsyncBoxBody<Bytes, io::Error>) -> Self {
        Self::Streaming(body)
    }
}

impl fmt::Debug for ProxyBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming(_) => f.write_str("ProxyBody::Streaming"),
            Self::Buffered(full) => f.debug_tuple("ProxyBody::Buffered").field(full).finish(),
            Self::Empty => f.write_str("ProxyBody::Empty"),
        }
    }
}

impl http_body::Body for ProxyBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Streaming(body) => Pin::new(body).poll_frame(cx),
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Streaming(body) => body.is_end_stream(),
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Streaming(body) => body.size_hint(),
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use http_body::Body;
    use http_body_util::{BodyExt, StreamBody};

    use super::*;

    fn chunked(chunks: Vec<&'static str>) -> ProxyBody {
        let frames = chunks
            .into_iter()
            .map(|chunk| Ok::<_, io::Error>(Frame::data(Bytes::from_static(chunk.as_bytes()))));
        ProxyBody::streaming(StreamBody::new(stream::iter(frames)).boxed_unsync())
    }

    #[test]
    fn test_should_report_empty_body_as_end_of_stream() {
        let body = ProxyBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }

    #[test]
    fn test_should_create_buffered_body_from_string() {
        let body = ProxyBody::from_string("hello world");
        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(11));
    }

    #[test]
    fn test_should_relay_streaming_frames_in_order() {
        let body = chunked(vec!["upstream ", "response ", "body"]);
        let collected = tokio_test::block_on(body.collect()).unwrap().to_bytes();
        assert_eq!(collected, Bytes::from("upstream response body"));
    }

    #[test]
    fn test_should_propagate_streaming_errors() {
        let frames = vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err(io::Error::other("connection reset")),
        ];
        let body = ProxyBody::streaming(StreamBody::new(stream::iter(frames)).boxed_unsync());
        let err = tokio_test::block_on(body.collect()).unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_should_default_to_empty() {
        let body = ProxyBody::default();
        assert!(body.is_end_stream());
        assert_eq!(format!("{body:?}"), "ProxyBody::Empty");
    }
}
