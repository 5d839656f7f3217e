//! Configuration, admission policy and observability for s3gate.
//!
//! This crate holds everything the proxy decides before and around signature
//! verification: the [`ProxyConfig`] value object, the source-address
//! [`AllowlistGate`], the request classifier used for metric labels, and the
//! [`ProxyMetrics`] counters.

pub mod allowlist;
pub mod classify;
pub mod config;
pub mod error;
pub mod metrics;

pub use allowlist::{AllowlistGate, parse_networks};
pub use classify::{RequestKind, classify, is_get_object_uri};
pub use config::{AwsCredential, ProxyConfig};
pub use error::{ConfigError, ConfigResult};
pub use metrics::{OUTCOME_ACCEPTED, ProxyMetrics};
