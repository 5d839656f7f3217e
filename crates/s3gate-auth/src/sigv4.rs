//! AWS Signature Version 4 verification.
//!
//! This module implements the core SigV4 signature verification flow:
//!
//! 1. Require exactly one `X-Amz-Date` and one `Authorization` header.
//! 2. Parse the `Authorization` header and resolve the secret for its access key.
//! 3. Parse the `X-Amz-Date` timestamp and apply the optional clock-skew policy.
//! 4. Reconstruct the canonical request from the raw path, raw query and the
//!    signed headers.
//! 5. Build the string to sign, derive the signing key through the HMAC chain, and
//!    compare signatures in constant time.
//!
//! Steps 1–3 are [`SigV4Verifier::authenticate`]; they need no body and run before
//! the request body is read. Steps 4–5 are [`SigV4Verifier::verify`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use hmac::{Hmac, KeyInit, Mac};
use http::HeaderValue;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::authorization::{
    ParsedAuthorization, SCOPE_TERMINATOR, SUPPORTED_ALGORITHM, parse_authorization_header,
};
use crate::canonical::build_canonical_request;
use crate::credentials::{CredentialProvider, SecretKey};
use crate::error::AuthError;

/// Name of the SigV4 timestamp header.
pub const AMZ_DATE_HEADER: &str = "x-amz-date";

/// Name of the payload digest header.
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// `strftime` layout of an `X-Amz-Date` value.
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// The result of a successful SigV4 verification.
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// The access key ID that signed the request.
    pub access_key_id: String,
    /// The secret belonging to `access_key_id`, kept for re-signing.
    pub secret_key: SecretKey,
    /// The region from the credential scope.
    pub region: String,
    /// The service from the credential scope.
    pub service: String,
    /// The list of headers that were included in the signature.
    pub signed_headers: Vec<String>,
}

/// A request whose headers passed authentication and that awaits the signature check.
#[derive(Debug, Clone)]
pub struct PendingAuth {
    parsed: ParsedAuthorization,
    secret_key: SecretKey,
    timestamp: String,
}

/// Verifies SigV4-signed requests against a credential provider.
///
/// The verifier holds only shared, read-only state and can be cloned freely across
/// connection tasks.
#[derive(Clone)]
pub struct SigV4Verifier {
    credentials: Arc<dyn CredentialProvider>,
    host: String,
    region: String,
    max_clock_skew: Option<TimeDelta>,
}

impl fmt::Debug for SigV4Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigV4Verifier")
            .field("host", &self.host)
            .field("region", &self.region)
            .field("max_clock_skew", &self.max_clock_skew)
            .finish_non_exhaustive()
    }
}

impl SigV4Verifier {
    /// Create a verifier.
    ///
    /// `host` is the front-door hostname clients sign for; it is used as the value of
    /// the `host` signed header. When empty, the request's own `Host` is used.
    /// `region` is the only region accepted in credential scopes.
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        host: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            host: host.into(),
            region: region.into(),
            max_clock_skew: None,
        }
    }

    /// Reject timestamps further than `skew` from the current time. `None` disables
    /// the check.
    #[must_use]
    pub fn with_max_clock_skew(mut self, skew: Option<TimeDelta>) -> Self {
        self.max_clock_skew = skew;
        self
    }

    /// Check the authentication headers without touching the body.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] for the first failed check, in this order: header
    /// presence, `Authorization` structure, access key, `X-Amz-Date` format, clock
    /// skew, credential region.
    pub fn authenticate(&self, parts: &http::request::Parts) -> Result<PendingAuth, AuthError> {
        self.authenticate_at(parts, Utc::now())
    }

    fn authenticate_at(
        &self,
        parts: &http::request::Parts,
        now: DateTime<Utc>,
    ) -> Result<PendingAuth, AuthError> {
        let amz_date = single_header(parts, AMZ_DATE_HEADER).ok_or(AuthError::AmzDateHeader)?;
        let auth_header = single_header(parts, http::header::AUTHORIZATION.as_str())
            .ok_or(AuthError::AuthorizationHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader("header is not visible ASCII".to_owned()))?;

        let parsed = parse_authorization_header(auth_header)?;
        let secret_key = self.credentials.get_secret_key(&parsed.access_key_id)?;

        let timestamp = amz_date
            .to_str()
            .map_err(|_| AuthError::InvalidAmzDate(String::from_utf8_lossy(amz_date.as_bytes()).into_owned()))?;
        let signed_at = parse_amz_date(timestamp)?;

        if let Some(skew) = self.max_clock_skew {
            if (now - signed_at).abs() > skew {
                return Err(AuthError::ClockSkew(timestamp.to_owned()));
            }
        }

        if parsed.region != self.region {
            return Err(AuthError::RegionMismatch(parsed.region));
        }

        Ok(PendingAuth {
            parsed,
            secret_key,
            timestamp: timestamp.to_owned(),
        })
    }

    /// Recompute the signature and compare it with the one the client sent.
    ///
    /// `payload_hash` is the value hashed as the last line of the canonical request:
    /// the client's `X-Amz-Content-Sha256` when present, else the body digest.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingSignedHeader`] if a signed header is absent and
    /// [`AuthError::SignatureDoesNotMatch`] on any signature mismatch.
    pub fn verify(
        &self,
        parts: &http::request::Parts,
        pending: PendingAuth,
        payload_hash: &str,
    ) -> Result<AuthResult, AuthError> {
        let PendingAuth {
            parsed,
            secret_key,
            timestamp,
        } = pending;

        debug!(
            access_key_id = %parsed.access_key_id,
            date = %parsed.date,
            region = %parsed.region,
            service = %parsed.service,
            "verifying SigV4 signature"
        );

        let signed_header_refs: Vec<&str> = parsed.signed_headers.iter().map(String::as_str).collect();
        let header_pairs = self.collect_signed_headers(parts, &signed_header_refs)?;

        let canonical_request = build_canonical_request(
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
            &header_pairs,
            &signed_header_refs,
            payload_hash,
        );

        debug!(canonical_request, "built canonical request");

        // The scope is rebuilt from X-Amz-Date; a credential dated on another day
        // cannot produce a matching signature.
        let scope_date = &timestamp[..8];
        let credential_scope = format!(
            "{scope_date}/{}/{}/{SCOPE_TERMINATOR}",
            parsed.region, parsed.service
        );
        let string_to_sign = build_string_to_sign(
            &timestamp,
            &credential_scope,
            &hash_payload(canonical_request.as_bytes()),
        );

        debug!(string_to_sign, "built string to sign");

        let signing_key = derive_signing_key(
            secret_key.expose(),
            scope_date,
            &parsed.region,
            &parsed.service,
        );
        let expected_signature = compute_signature(&signing_key, &string_to_sign);

        let signature_matches: bool = parsed
            .signature
            .as_bytes()
            .ct_eq(expected_signature.as_bytes())
            .into();

        if signature_matches && parsed.date == scope_date {
            debug!(access_key_id = %parsed.access_key_id, "signature verification succeeded");
            Ok(AuthResult {
                access_key_id: parsed.access_key_id,
                secret_key,
                region: parsed.region,
                service: parsed.service,
                signed_headers: parsed.signed_headers,
            })
        } else {
            debug!(
                expected = %expected_signature,
                provided = %parsed.signature,
                credential_date = %parsed.date,
                "signature mismatch"
            );
            Err(AuthError::SignatureDoesNotMatch)
        }
    }

    /// Collect header name-value pairs for the signed headers.
    ///
    /// `host` resolves to the configured front-door hostname when one is set.
    fn collect_signed_headers<'a>(
        &'a self,
        parts: &'a http::request::Parts,
        signed_headers: &[&'a str],
    ) -> Result<Vec<(&'a str, &'a str)>, AuthError> {
        let mut result = Vec::with_capacity(signed_headers.len());

        for &name in signed_headers {
            if name == "host" {
                let host = if self.host.is_empty() {
                    request_host(parts).ok_or_else(|| AuthError::MissingSignedHeader(name.to_owned()))?
                } else {
                    self.host.as_str()
                };
                result.push((name, host));
                continue;
            }

            let mut found = false;
            for value in parts.headers.get_all(name) {
                let value = value
                    .to_str()
                    .map_err(|_| AuthError::MissingSignedHeader(name.to_owned()))?;
                result.push((name, value));
                found = true;
            }
            if !found {
                return Err(AuthError::MissingSignedHeader(name.to_owned()));
            }
        }

        Ok(result)
    }
}

/// Return the header value when the header occurs exactly once.
fn single_header<'a>(parts: &'a http::request::Parts, name: &str) -> Option<&'a HeaderValue> {
    let mut values = parts.headers.get_all(name).iter();
    let first = values.next()?;
    values.next().is_none().then_some(first)
}

/// The `Host` header, or the URI authority for HTTP/2 requests.
fn request_host(parts: &http::request::Parts) -> Option<&str> {
    parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(http::uri::Authority::as_str))
}

/// Parse a `YYYYMMDDTHHMMSSZ` timestamp.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAmzDate`] carrying the offending value.
///
/// # Examples
///
/// ```
/// use s3gate_auth::sigv4::parse_amz_date;
///
/// let t = parse_amz_date("20060102T150405Z").unwrap();
/// assert_eq!(t.to_rfc3339(), "2006-01-02T15:04:05+00:00");
/// assert!(parse_amz_date("foobar").is_err());
/// ```
pub fn parse_amz_date(value: &str) -> Result<DateTime<Utc>, AuthError> {
    if value.len() != 16 || !value.is_ascii() {
        return Err(AuthError::InvalidAmzDate(value.to_owned()));
    }
    NaiveDateTime::parse_from_str(value, AMZ_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| AuthError::InvalidAmzDate(value.to_owned()))
}

/// Format a timestamp as an `X-Amz-Date` value.
#[must_use]
pub fn format_amz_date(time: DateTime<Utc>) -> String {
    time.format(AMZ_DATE_FORMAT).to_string()
}

/// Build the SigV4 string to sign.
///
/// Format:
/// ```text
/// AWS4-HMAC-SHA256\n
/// <ISO8601 timestamp>\n
/// <credential_scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
///
/// # Examples
///
/// ```
/// use s3gate_auth::sigv4::build_string_to_sign;
///
/// let sts = build_string_to_sign(
///     "20130524T000000Z",
///     "20130524/us-east-1/s3/aws4_request",
///     "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972",
/// );
/// assert!(sts.starts_with("AWS4-HMAC-SHA256\n20130524T000000Z\n"));
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using HMAC-SHA256 chain.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, SCOPE_TERMINATOR.as_bytes())
}

/// Compute the HMAC-SHA256 signature of `data` using the given `signing_key`.
///
/// Returns the hex-encoded signature.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Compute HMAC-SHA256 and return the raw bytes.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the SHA-256 hash of the given payload and return it as a hex string.
///
/// # Examples
///
/// ```
/// use s3gate_auth::sigv4::hash_payload;
///
/// // SHA-256 of empty payload
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Check a client-supplied `X-Amz-Content-Sha256` value against the body.
///
/// Placeholder values (`UNSIGNED-PAYLOAD` and the streaming variants) are accepted
/// as-is; anything else must be the hex SHA-256 of `body`.
///
/// # Errors
///
/// Returns [`AuthError::ContentSha256Mismatch`] on a malformed or wrong digest.
pub fn validate_content_sha256(declared: &str, body: &[u8]) -> Result<(), AuthError> {
    if declared == "UNSIGNED-PAYLOAD" || declared.starts_with("STREAMING-") {
        return Ok(());
    }
    if declared.len() != 64 || !declared.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthError::ContentSha256Mismatch);
    }
    if !declared.eq_ignore_ascii_case(&hash_payload(body)) {
        return Err(AuthError::ContentSha256Mismatch);
    }
    Ok(())
}
