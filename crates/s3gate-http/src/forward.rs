//! Forwarding of verified requests to the upstream endpoint.
//!
//! The forwarder keeps the method, raw path, raw query and body of the inbound
//! request, replaces the destination, drops the strip-list headers, re-signs the
//! request for the upstream host and relays the upstream response back as a stream.

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use s3gate_auth::{AuthResult, SigningParams, sign_request};
use s3gate_core::{ConfigResult, ProxyConfig};

use crate::body::ProxyBody;
use crate::error::ProxyError;

/// Service name used in the upstream credential scope.
const UPSTREAM_SERVICE: &str = "s3";

/// Connection-scoped headers that never cross the proxy.
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
];

/// Request headers the upstream must not see from the caller.
const STRIPPED_REQUEST_HEADERS: [&str; 4] =
    ["authorization", "accept-encoding", "host", "content-length"];

type UpstreamClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Sends verified requests to the configured upstream.
///
/// The outbound request target is assembled from `http::Uri` parts, so the path
/// and query reach the upstream byte for byte as the client signed them.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: UpstreamClient,
    scheme: Scheme,
    endpoint: Authority,
    region: String,
    timeout: Option<Duration>,
}

impl Forwarder {
    /// Build a forwarder for the upstream described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](s3gate_core::ConfigError) if the upstream endpoint
    /// is not a valid `host[:port]`.
    pub fn new(config: &ProxyConfig) -> ConfigResult<Self> {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let scheme = if config.upstream_insecure {
            Scheme::HTTP
        } else {
            Scheme::HTTPS
        };

        Ok(Self {
            client,
            scheme,
            endpoint: config.upstream_authority()?,
            region: config.region.clone(),
            timeout: config.upstream_timeout(),
        })
    }

    /// Upstream `host[:port]`.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Forward a verified request and relay the upstream response.
    ///
    /// `payload_hash` is written to the outbound `X-Amz-Content-Sha256` and signed.
    /// Dropping the returned future cancels the upstream exchange. The configured
    /// timeout bounds the wait for the upstream response head.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Auth`] if re-signing fails, [`ProxyError::Request`] if
    /// the outbound request cannot be assembled and [`ProxyError::Upstream`] if no
    /// upstream response is received.
    pub async fn forward(
        &self,
        parts: http::request::Parts,
        body: Bytes,
        auth: &AuthResult,
        payload_hash: &str,
    ) -> Result<http::Response<ProxyBody>, ProxyError> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let uri = http::Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.endpoint.clone())
            .path_and_query(path_and_query)
            .build()?;

        let mut headers = outbound_headers(&parts.headers, self.endpoint.as_str())?;
        let params = SigningParams {
            access_key_id: &auth.access_key_id,
            secret_key: &auth.secret_key,
            region: &self.region,
            service: UPSTREAM_SERVICE,
            time: Utc::now(),
        };
        sign_request(
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
            &mut headers,
            payload_hash,
            &params,
        )?;

        debug!(method = %parts.method, %uri, "forwarding request upstream");

        let mut request = http::Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(Full::new(body))?;
        *request.headers_mut() = headers;

        let exchange = self.client.request(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|elapsed| self.upstream_error(elapsed))?,
            None => exchange.await,
        }
        .map_err(|e| self.upstream_error(e))?;

        Ok(relay_response(response))
    }

    fn upstream_error(&self, source: impl std::error::Error + Send + Sync + 'static) -> ProxyError {
        ProxyError::Upstream {
            host: self.endpoint.to_string(),
            source: Box::new(source),
        }
    }
}

/// Copy inbound headers for the upstream: drop the strip list and hop-by-hop
/// headers, then set `Host` to `endpoint`.
///
/// # Errors
///
/// Returns [`ProxyError::Auth`] with a signing error if `endpoint` is not a valid
/// header value.
pub fn outbound_headers(inbound: &HeaderMap, endpoint: &str) -> Result<HeaderMap, ProxyError> {
    let mut headers = inbound.clone();
    for name in STRIPPED_REQUEST_HEADERS {
        headers.remove(name);
    }
    remove_hop_by_hop(&mut headers);

    let host = HeaderValue::from_str(endpoint).map_err(|e| {
        s3gate_auth::AuthError::Signing(format!("invalid upstream endpoint {endpoint}: {e}"))
    })?;
    headers.insert(header::HOST, host);
    Ok(headers)
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let named: HashSet<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
    for name in named {
        headers.remove(name);
    }
}

/// Turn an upstream response into a proxy response with a streaming body.
fn relay_response(response: http::Response<Incoming>) -> http::Response<ProxyBody> {
    let (mut parts, body) = response.into_parts();
    remove_hop_by_hop(&mut parts.headers);

    let body = ProxyBody::streaming(body.map_err(io::Error::other).boxed_unsync());
    http::Response::from_parts(parts, body)
}
