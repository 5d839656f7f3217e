//! SigV4 signing of outbound requests.
//!
//! After a request is verified it is re-signed for the upstream: the caller's
//! signature covers the proxy's hostname, so the upstream needs a fresh one over its
//! own `Host`, produced with the same credential the caller proved it holds.

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue};

use crate::authorization::{SCOPE_TERMINATOR, SUPPORTED_ALGORITHM};
use crate::canonical::{build_canonical_request, build_signed_headers_string};
use crate::credentials::SecretKey;
use crate::error::AuthError;
use crate::sigv4::{
    AMZ_DATE_HEADER, CONTENT_SHA256_HEADER, build_string_to_sign, compute_signature,
    derive_signing_key, format_amz_date, hash_payload,
};

/// Headers signed when they are present on the outbound request.
const OPTIONAL_SIGNED_HEADERS: [&str; 2] = ["content-md5", "content-type"];

/// Credential and scope used to sign an outbound request.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// Access key ID placed in the `Credential` component.
    pub access_key_id: &'a str,
    /// Secret the signing key is derived from.
    pub secret_key: &'a SecretKey,
    /// Region of the credential scope.
    pub region: &'a str,
    /// Service of the credential scope.
    pub service: &'a str,
    /// Signing time, written to `X-Amz-Date`.
    pub time: DateTime<Utc>,
}

/// Sign a request in place.
///
/// `headers` must already carry the `Host` the request will be sent with. The
/// function sets `X-Amz-Date`, `X-Amz-Content-Sha256` (to `payload_hash`) and
/// `Authorization`, signing `host`, `x-amz-content-sha256`, `x-amz-date` and, when
/// present, `content-md5` and `content-type`.
///
/// # Errors
///
/// Returns [`AuthError::Signing`] if `Host` is missing or a computed header value
/// is not a valid HTTP header value.
pub fn sign_request(
    method: &str,
    raw_path: &str,
    raw_query: &str,
    headers: &mut HeaderMap,
    payload_hash: &str,
    params: &SigningParams<'_>,
) -> Result<(), AuthError> {
    if !headers.contains_key(http::header::HOST) {
        return Err(AuthError::Signing("missing Host header".to_owned()));
    }

    let timestamp = format_amz_date(params.time);
    headers.insert(AMZ_DATE_HEADER, header_value(&timestamp)?);
    headers.insert(CONTENT_SHA256_HEADER, header_value(payload_hash)?);

    let mut signed_headers: Vec<&str> = OPTIONAL_SIGNED_HEADERS
        .into_iter()
        .filter(|name| headers.contains_key(*name))
        .collect();
    signed_headers.extend(["host", CONTENT_SHA256_HEADER, AMZ_DATE_HEADER]);
    signed_headers.sort_unstable();

    let mut header_pairs = Vec::new();
    for &name in &signed_headers {
        for value in headers.get_all(name) {
            let value = value
                .to_str()
                .map_err(|_| AuthError::Signing(format!("header {name} is not visible ASCII")))?;
            header_pairs.push((name, value));
        }
    }

    let canonical_request = build_canonical_request(
        method,
        raw_path,
        raw_query,
        &header_pairs,
        &signed_headers,
        payload_hash,
    );

    let date = &timestamp[..8];
    let credential_scope = format!(
        "{date}/{}/{}/{SCOPE_TERMINATOR}",
        params.region, params.service
    );
    let string_to_sign = build_string_to_sign(
        &timestamp,
        &credential_scope,
        &hash_payload(canonical_request.as_bytes()),
    );
    let signing_key = derive_signing_key(
        params.secret_key.expose(),
        date,
        params.region,
        params.service,
    );
    let signature = compute_signature(&signing_key, &string_to_sign);

    let authorization = format!(
        "{SUPPORTED_ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
        params.access_key_id,
        build_signed_headers_string(&signed_headers),
    );
    headers.insert(http::header::AUTHORIZATION, header_value(&authorization)?);

    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(value).map_err(|e| AuthError::Signing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::credentials::CredentialStore;
    use crate::sigv4::{SigV4Verifier, parse_amz_date};

    const ACCESS_KEY: &str = "fooooooooooooooo";
    const SECRET: &str = "bar";
    const REGION: &str = "eu-test-1";

    fn signed_parts(uri: &str, host: &str) -> http::request::Parts {
        let secret = SecretKey::new(SECRET);
        let (mut parts, ()) = http::Request::builder()
            .method("PUT")
            .uri(uri)
            .header("host", host)
            .header("content-type", "text/plain")
            .header("x-amz-meta-unsigned", "value")
            .body(())
            .unwrap()
            .into_parts();
        let params = SigningParams {
            access_key_id: ACCESS_KEY,
            secret_key: &secret,
            region: REGION,
            service: "s3",
            time: parse_amz_date("20060102T150405Z").unwrap(),
        };
        sign_request(
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
            &mut parts.headers,
            &hash_payload(b"body"),
            &params,
        )
        .unwrap();
        parts
    }

    fn verifier(host: &str) -> SigV4Verifier {
        let store = CredentialStore::new(vec![(ACCESS_KEY.to_owned(), SECRET.to_owned())]).unwrap();
        SigV4Verifier::new(Arc::new(store), host, REGION)
    }

    #[test]
    fn test_should_produce_signature_the_verifier_accepts() {
        let parts = signed_parts("http://upstream:9000/bucket/foo%3Dbar?marker=1000", "upstream:9000");
        let verifier = verifier("upstream:9000");

        let pending = verifier.authenticate(&parts).unwrap();
        let result = verifier.verify(&parts, pending, &hash_payload(b"body")).unwrap();
        assert_eq!(result.access_key_id, ACCESS_KEY);
        assert_eq!(
            result.signed_headers,
            vec!["content-type", "host", "x-amz-content-sha256", "x-amz-date"]
        );
    }

    #[test]
    fn test_should_set_date_and_payload_headers() {
        let parts = signed_parts("http://upstream/bucket/key", "upstream");
        assert_eq!(parts.headers["x-amz-date"], "20060102T150405Z");
        assert_eq!(parts.headers["x-amz-content-sha256"], hash_payload(b"body").as_str());
        let authorization = parts.headers[http::header::AUTHORIZATION].to_str().unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=fooooooooooooooo/20060102/eu-test-1/s3/aws4_request, "
        ));
    }

    #[test]
    fn test_should_not_verify_for_another_host() {
        let parts = signed_parts("http://upstream/bucket/key", "upstream");
        let verifier = verifier("proxy.example.com");

        let pending = verifier.authenticate(&parts).unwrap();
        assert_eq!(
            verifier
                .verify(&parts, pending, &hash_payload(b"body"))
                .unwrap_err(),
            AuthError::SignatureDoesNotMatch
        );
    }

    #[test]
    fn test_should_require_host_header() {
        let secret = SecretKey::new(SECRET);
        let mut headers = HeaderMap::new();
        let params = SigningParams {
            access_key_id: ACCESS_KEY,
            secret_key: &secret,
            region: REGION,
            service: "s3",
            time: Utc::now(),
        };
        let result = sign_request("GET", "/", "", &mut headers, &hash_payload(b""), &params);
        assert!(matches!(result, Err(AuthError::Signing(_))));
    }
}
