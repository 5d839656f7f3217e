//! Parser for the SigV4 `Authorization` header.
//!
//! Format:
//! ```text
//! AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/s3/aws4_request,
//!   SignedHeaders=host;x-amz-content-sha256;x-amz-date,
//!   Signature=<hex-signature>
//! ```
//!
//! The parser is a strict grammar over the header text: it either returns a fully
//! populated [`ParsedAuthorization`] or an [`AuthError`] naming the defect. The
//! `Signature` value is kept as opaque data; it is compared, never interpreted.

use crate::error::AuthError;

/// The only algorithm supported by this implementation.
pub const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The only service this proxy accepts in a credential scope.
pub const SIGNING_SERVICE: &str = "s3";

/// Terminator of every SigV4 credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// Parsed components of an AWS SigV4 `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthorization {
    /// The signing algorithm (always `AWS4-HMAC-SHA256`).
    pub algorithm: String,
    /// The access key ID.
    pub access_key_id: String,
    /// The date component of the credential scope (YYYYMMDD).
    pub date: String,
    /// The region from the credential scope.
    pub region: String,
    /// The service from the credential scope.
    pub service: String,
    /// The signed header names, lower-cased, in the order listed.
    pub signed_headers: Vec<String>,
    /// The provided signature.
    pub signature: String,
}

/// Credential scope fields: `AKID/date/region/service/aws4_request`.
struct Credential<'a> {
    access_key_id: &'a str,
    date: &'a str,
    region: &'a str,
    service: &'a str,
}

/// Parse an AWS SigV4 `Authorization` header value into its components.
///
/// A missing or malformed `Credential` component is reported as
/// [`AuthError::CredentialNotFound`] regardless of what else is wrong with the header;
/// every other defect is an [`AuthError::InvalidAuthHeader`].
///
/// # Examples
///
/// ```
/// use s3gate_auth::authorization::parse_authorization_header;
///
/// let parsed = parse_authorization_header(
///     "AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/s3/aws4_request, \
///      SignedHeaders=host;x-amz-date, Signature=abc",
/// )
/// .unwrap();
/// assert_eq!(parsed.access_key_id, "AKID");
/// assert_eq!(parsed.signed_headers, vec!["host", "x-amz-date"]);
/// ```
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuthorization, AuthError> {
    let header = header.trim();
    let (algorithm, rest) = header
        .split_once(' ')
        .map_or((header, ""), |(alg, rest)| (alg, rest.trim_start()));

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;
    let mut duplicated = None;

    for part in rest.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((name, value)) = part.split_once('=') else {
            return Err(AuthError::InvalidAuthHeader(format!(
                "unexpected component {part}"
            )));
        };
        let slot = match name {
            "Credential" => &mut credential,
            "SignedHeaders" => &mut signed_headers,
            "Signature" => &mut signature,
            _ => {
                return Err(AuthError::InvalidAuthHeader(format!(
                    "unexpected component {name}"
                )));
            }
        };
        if slot.replace(value).is_some() {
            duplicated.get_or_insert(name);
        }
    }

    if duplicated == Some("Credential") {
        return Err(AuthError::CredentialNotFound);
    }
    let credential = credential
        .and_then(parse_credential)
        .ok_or(AuthError::CredentialNotFound)?;

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::InvalidAuthHeader(format!(
            "unsupported algorithm {algorithm}"
        )));
    }
    if let Some(name) = duplicated {
        return Err(AuthError::InvalidAuthHeader(format!(
            "{name} set multiple times"
        )));
    }

    let signed_headers = signed_headers
        .ok_or_else(|| AuthError::InvalidAuthHeader("SignedHeaders not found".to_owned()))?;
    let signed_headers = parse_signed_headers(signed_headers)?;

    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidAuthHeader("Signature not found".to_owned()))?;

    Ok(ParsedAuthorization {
        algorithm: algorithm.to_owned(),
        access_key_id: credential.access_key_id.to_owned(),
        date: credential.date.to_owned(),
        region: credential.region.to_owned(),
        service: credential.service.to_owned(),
        signed_headers,
        signature: signature.to_owned(),
    })
}

/// Parse `AKID/YYYYMMDD/region/s3/aws4_request`.
fn parse_credential(value: &str) -> Option<Credential<'_>> {
    let mut fields = value.split('/');
    let access_key_id = fields.next()?;
    let date = fields.next()?;
    let region = fields.next()?;
    let service = fields.next()?;
    let terminator = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    let valid = !access_key_id.is_empty()
        && access_key_id.bytes().all(|b| b.is_ascii_graphic())
        && date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && !region.is_empty()
        && region
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && service == SIGNING_SERVICE
        && terminator == SCOPE_TERMINATOR;

    valid.then_some(Credential {
        access_key_id,
        date,
        region,
        service,
    })
}

/// Split `h1;h2;...` into lower-case header names.
fn parse_signed_headers(value: &str) -> Result<Vec<String>, AuthError> {
    let names: Vec<String> = value.split(';').map(str::to_ascii_lowercase).collect();
    if names.iter().any(|n| n.is_empty() || !n.bytes().all(is_token_byte)) {
        return Err(AuthError::InvalidAuthHeader(format!(
            "malformed SignedHeaders {value}"
        )));
    }
    Ok(names)
}

/// `tchar` from RFC 9110 section 5.6.2.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
