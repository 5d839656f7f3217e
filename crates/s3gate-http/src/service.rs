//! The proxy pipeline and its hyper `Service` adapter.
//!
//! [`ProxyState`] runs every request through the same sequence:
//!
//! 1. Source allowlist
//! 2. Header and credential checks (no body needed)
//! 3. Body collection and payload digest
//! 4. Signature comparison
//! 5. Re-signing and forwarding to the upstream
//!
//! Any failure ends the request with the matching status; nothing after a failed
//! step runs. [`ProxyHttpService`] binds the shared state to one connection's peer
//! address for hyper.

use std::convert::Infallible;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::HeaderValue;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use s3gate_auth::sigv4::CONTENT_SHA256_HEADER;
use s3gate_auth::{AuthError, SigV4Verifier, hash_payload, validate_content_sha256};
use s3gate_core::{AllowlistGate, ConfigResult, OUTCOME_ACCEPTED, ProxyConfig, ProxyMetrics, classify};

use crate::body::ProxyBody;
use crate::error::{BoxError, ProxyError};
use crate::forward::Forwarder;

/// Header carrying the proxy's request id on locally generated responses.
pub const REQUEST_ID_HEADER: &str = "x-s3gate-request-id";

/// Shared, read-mostly state of a running proxy.
#[derive(Debug)]
pub struct ProxyState {
    allowlist: AllowlistGate,
    verifier: SigV4Verifier,
    forwarder: Forwarder,
    metrics: ProxyMetrics,
    debug: bool,
}

impl ProxyState {
    /// Build the proxy from a configuration, validating it first.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`](s3gate_core::ConfigError) the configuration
    /// violates.
    pub fn from_config(config: &ProxyConfig) -> ConfigResult<Self> {
        config.validate()?;

        let credentials = config.credential_store()?;
        let verifier = SigV4Verifier::new(
            Arc::new(credentials),
            config.allowed_endpoint.clone(),
            config.region.clone(),
        )
        .with_max_clock_skew(config.max_clock_skew());

        Ok(Self {
            allowlist: AllowlistGate::parse(&config.allowed_source_subnets)?,
            verifier,
            forwarder: Forwarder::new(config)?,
            metrics: ProxyMetrics::new()?,
            debug: config.debug,
        })
    }

    /// The source allowlist, for reconfiguration.
    #[must_use]
    pub fn allowlist(&self) -> &AllowlistGate {
        &self.allowlist
    }

    /// The proxy's counters.
    #[must_use]
    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }

    /// Handle one request from `peer` and produce the response.
    ///
    /// Never fails: rejections and upstream failures are rendered as responses.
    pub async fn handle<B>(&self, req: http::Request<B>, peer: Option<IpAddr>) -> http::Response<ProxyBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let request_id = Uuid::new_v4().to_string();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let kind = classify(&method, &uri);
        self.metrics.observe_request(kind);

        debug!(%method, %uri, %kind, ?peer, request_id = %request_id, "processing request");

        match self.process(req, peer, &request_id).await {
            Ok(response) => {
                info!(
                    %method, %uri, %kind,
                    status = response.status().as_u16(),
                    request_id = %request_id,
                    "proxied request"
                );
                response
            }
            Err(err) => {
                if let Some(reason) = err.rejection_reason() {
                    self.metrics.observe_verification(reason);
                    warn!(%method, %uri, ?peer, error = %err, request_id = %request_id, "rejected request");
                } else {
                    if matches!(err, ProxyError::Upstream { .. }) {
                        self.metrics.observe_upstream_error();
                    }
                    error!(%method, %uri, error = %err, request_id = %request_id, "request failed");
                }
                with_request_id(err.to_response(self.debug), &request_id)
            }
        }
    }

    async fn process<B>(
        &self,
        req: http::Request<B>,
        peer: Option<IpAddr>,
        request_id: &str,
    ) -> Result<http::Response<ProxyBody>, ProxyError>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if !self.allowlist.is_allowed(peer) {
            return Err(ProxyError::SourceNotAllowed(
                peer.map_or_else(|| "unknown".to_owned(), |ip| ip.to_string()),
            ));
        }

        let (parts, body) = req.into_parts();
        let pending = self.verifier.authenticate(&parts)?;

        let body = collect_body(body).await?;
        let payload_hash = match parts.headers.get(CONTENT_SHA256_HEADER) {
            Some(declared) => {
                let declared = declared
                    .to_str()
                    .map_err(|_| AuthError::ContentSha256Mismatch)?;
                validate_content_sha256(declared, &body)?;
                declared.to_owned()
            }
            None => hash_payload(&body),
        };

        let auth = self.verifier.verify(&parts, pending, &payload_hash)?;
        self.metrics.observe_verification(OUTCOME_ACCEPTED);
        debug!(access_key_id = %auth.access_key_id, request_id, "request verified");

        self.forwarder
            .forward(parts, body, &auth, &payload_hash)
            .await
    }

    /// Bind this state to a connection from `peer`.
    #[must_use]
    pub fn service(self: &Arc<Self>, peer: Option<IpAddr>) -> ProxyHttpService {
        ProxyHttpService {
            state: Arc::clone(self),
            peer,
        }
    }
}

/// Collect the full request body into `Bytes`.
async fn collect_body<B>(body: B) -> Result<Bytes, ProxyError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let collected = body
        .collect()
        .await
        .map_err(|e| ProxyError::Body(e.into()))?;
    Ok(collected.to_bytes())
}

fn with_request_id(
    mut response: http::Response<ProxyBody>,
    request_id: &str,
) -> http::Response<ProxyBody> {
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, hv);
    }
    response
}

/// hyper service for one accepted connection.
#[derive(Debug, Clone)]
pub struct ProxyHttpService {
    state: Arc<ProxyState>,
    peer: Option<IpAddr>,
}

impl Service<http::Request<Incoming>> for ProxyHttpService {
    type Response = http::Response<ProxyBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let state = Arc::clone(&self.state);
        let peer = self.peer;

        Box::pin(async move { Ok(state.handle(req, peer).await) })
    }
}
