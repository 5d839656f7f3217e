//! Error types for SigV4 authentication.
//!
//! Every rejection produced while verifying an inbound request is an
//! [`AuthError`]. The `Display` output of each variant is the stable,
//! operator-facing message for that failure kind; tests and log searches match
//! on it, so treat the strings as part of the public interface.

/// Errors that can occur while authenticating a SigV4-signed request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// `X-Amz-Date` is absent or appears more than once.
    #[error("X-Amz-Date header missing or set multiple times")]
    AmzDateHeader,

    /// `Authorization` is absent or appears more than once.
    #[error("Authorization header missing or set multiple times")]
    AuthorizationHeader,

    /// The `Credential` component is absent or does not match
    /// `AKID/date/region/s3/aws4_request`.
    #[error("invalid Authorization header: Credential not found")]
    CredentialNotFound,

    /// Any other structural defect in the `Authorization` header.
    #[error("invalid Authorization header: {0}")]
    InvalidAuthHeader(String),

    /// The access key ID was not found in the credential store.
    #[error("invalid AccessKeyID in Credential: {0}")]
    AccessKeyNotFound(String),

    /// `X-Amz-Date` is not a `YYYYMMDDTHHMMSSZ` timestamp.
    #[error("error parsing X-Amz-Date {0}")]
    InvalidAmzDate(String),

    /// `X-Amz-Date` is further from the current time than the allowed skew.
    #[error("X-Amz-Date {0} outside allowed clock skew")]
    ClockSkew(String),

    /// The credential scope names a region other than the one this proxy signs for.
    #[error("invalid region in Credential: {0}")]
    RegionMismatch(String),

    /// A header listed in `SignedHeaders` is not present on the request.
    #[error("invalid Authorization header: signed header {0} missing")]
    MissingSignedHeader(String),

    /// `X-Amz-Content-Sha256` carries a digest that is not the digest of the body.
    #[error("X-Amz-Content-Sha256 does not match request body")]
    ContentSha256Mismatch,

    /// The computed signature does not match the provided signature.
    #[error("invalid signature in Authorization header")]
    SignatureDoesNotMatch,

    /// An outbound request could not be signed.
    #[error("unable to sign upstream request: {0}")]
    Signing(String),
}

impl AuthError {
    /// Short, label-safe name of the failure kind, used for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AmzDateHeader => "amz_date_header",
            Self::AuthorizationHeader => "authorization_header",
            Self::CredentialNotFound => "credential_not_found",
            Self::InvalidAuthHeader(_) | Self::MissingSignedHeader(_) => "invalid_authorization",
            Self::AccessKeyNotFound(_) => "invalid_access_key",
            Self::InvalidAmzDate(_) => "invalid_amz_date",
            Self::ClockSkew(_) => "clock_skew",
            Self::RegionMismatch(_) => "region_mismatch",
            Self::ContentSha256Mismatch => "content_sha256_mismatch",
            Self::SignatureDoesNotMatch => "invalid_signature",
            Self::Signing(_) => "signing",
        }
    }
}

/// Errors raised while building a credential store from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// A credential pair has an empty access key ID.
    #[error("credential with empty access key ID")]
    EmptyAccessKey,

    /// A credential pair has an empty secret key.
    #[error("empty secret key for access key ID {0}")]
    EmptySecretKey(String),

    /// The same access key ID was configured twice.
    #[error("duplicate access key ID {0}")]
    DuplicateAccessKey(String),
}
