//! Request-level errors and their HTTP rendering.

use http::StatusCode;

use s3gate_auth::AuthError;

use crate::body::ProxyBody;

/// Boxed error from an arbitrary request body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request was not forwarded, or why forwarding failed.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The peer address is not in any allowed source network.
    #[error("source IP not allowed: {0}")]
    SourceNotAllowed(String),

    /// Header, signature or payload checks failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The inbound body could not be read.
    #[error("unable to read request body: {0}")]
    Body(#[source] BoxError),

    /// The outbound request could not be assembled.
    #[error("unable to build upstream request: {0}")]
    Request(#[from] http::Error),

    /// The upstream exchange failed or timed out before a response arrived.
    #[error("upstream request to {host} failed: {source}")]
    Upstream {
        /// Upstream `host[:port]`.
        host: String,
        /// Transport error or elapsed deadline.
        #[source]
        source: BoxError,
    },
}

impl ProxyError {
    /// HTTP status returned to the caller.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SourceNotAllowed(_) => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::Signing(_)) | Self::Body(_) | Self::Request(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Auth(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Metrics label for rejections, `None` for failures after admission.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            Self::SourceNotAllowed(_) => Some("source_not_allowed"),
            Self::Auth(AuthError::Signing(_)) => None,
            Self::Auth(err) => Some(err.reason()),
            Self::Body(_) | Self::Request(_) | Self::Upstream { .. } => None,
        }
    }

    /// Render the error as a response.
    ///
    /// The message is only written to the body when `debug` is set.
    #[must_use]
    pub fn to_response(&self, debug: bool) -> http::Response<ProxyBody> {
        let mut builder = http::Response::builder().status(self.status());
        let body = if debug {
            builder = builder.header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8");
            ProxyBody::from_string(self.to_string())
        } else {
            ProxyBody::empty()
        };
        builder.body(body).unwrap_or_else(|_| {
            let mut response = http::Response::new(ProxyBody::empty());
            *response.status_mut() = self.status();
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    fn body_text(response: http::Response<ProxyBody>) -> String {
        let bytes = tokio_test::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_should_map_rejections_to_bad_request() {
        assert_eq!(
            ProxyError::SourceNotAllowed("10.0.0.1".to_owned()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::Auth(AuthError::SignatureDoesNotMatch).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::Auth(AuthError::AmzDateHeader).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_should_map_body_failure_to_internal_error() {
        let err = ProxyError::Body(Box::new(std::io::Error::other("reset")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.rejection_reason(), None);
    }

    #[test]
    fn test_should_map_upstream_failure_to_bad_gateway() {
        let err = ProxyError::Upstream {
            host: "127.0.0.1:9000".to_owned(),
            source: Box::new(std::io::Error::other("connection refused")),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.rejection_reason(), None);
        assert_eq!(
            err.to_string(),
            "upstream request to 127.0.0.1:9000 failed: connection refused"
        );
    }

    #[test]
    fn test_should_label_rejections() {
        assert_eq!(
            ProxyError::SourceNotAllowed("::1".to_owned()).rejection_reason(),
            Some("source_not_allowed")
        );
        assert_eq!(
            ProxyError::Auth(AuthError::CredentialNotFound).rejection_reason(),
            Some("credential_not_found")
        );
    }

    #[test]
    fn test_should_write_message_in_debug_mode() {
        let err = ProxyError::Auth(AuthError::SignatureDoesNotMatch);
        let response = err.to_response(true);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response), "invalid signature in Authorization header");
    }

    #[test]
    fn test_should_hide_message_outside_debug_mode() {
        let err = ProxyError::SourceNotAllowed("192.0.2.1".to_owned());
        let response = err.to_response(false);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).is_empty());
    }

    #[test]
    fn test_should_format_source_message() {
        let err = ProxyError::SourceNotAllowed("192.0.2.1".to_owned());
        assert_eq!(err.to_string(), "source IP not allowed: 192.0.2.1");
    }
}
