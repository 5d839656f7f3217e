//! Prometheus counters for the proxy.

use std::fmt;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use crate::classify::RequestKind;
use crate::error::ConfigResult;

/// Outcome label for a request whose signature was accepted.
pub const OUTCOME_ACCEPTED: &str = "accepted";

/// Counters kept by the proxy, registered in their own registry.
#[derive(Clone)]
pub struct ProxyMetrics {
    registry: Registry,
    /// Requests received, by `kind`.
    pub requests: IntCounterVec,
    /// Verification outcomes, by `outcome`.
    pub verifications: IntCounterVec,
    /// Upstream exchanges that failed before a response arrived.
    pub upstream_errors: IntCounter,
}

impl ProxyMetrics {
    /// Create and register all counters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::Metrics`] if registration fails.
    pub fn new() -> ConfigResult<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("s3gate_requests_total", "Requests received by the proxy"),
            &["kind"],
        )?;
        let verifications = IntCounterVec::new(
            Opts::new("s3gate_verifications_total", "Request admission outcomes"),
            &["outcome"],
        )?;
        let upstream_errors = IntCounter::with_opts(Opts::new(
            "s3gate_upstream_errors_total",
            "Failed upstream exchanges",
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(upstream_errors.clone()))?;

        Ok(Self {
            registry,
            requests,
            verifications,
            upstream_errors,
        })
    }

    /// Count a received request.
    pub fn observe_request(&self, kind: RequestKind) {
        self.requests.with_label_values(&[kind.as_str()]).inc();
    }

    /// Count an admission outcome.
    pub fn observe_verification(&self, outcome: &str) {
        self.verifications.with_label_values(&[outcome]).inc();
    }

    /// Count a failed upstream exchange.
    pub fn observe_upstream_error(&self) {
        self.upstream_errors.inc();
    }

    /// Snapshot of every registered metric family.
    #[must_use]
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl fmt::Debug for ProxyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyMetrics")
            .field("requests", &"IntCounterVec")
            .field("verifications", &"IntCounterVec")
            .field("upstream_errors", &self.upstream_errors.get())
            .finish_non_exhaustive()
    }
}
