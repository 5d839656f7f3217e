//! Source-address allowlist.
//!
//! The gate holds an immutable snapshot of permitted networks behind a lock. An
//! update swaps the whole snapshot, so a check always sees either the old or the
//! new set, never a mix of both.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use parking_lot::RwLock;

use crate::error::{ConfigError, ConfigResult};

/// Parse CIDR ranges such as `"10.0.0.0/8"` or `"::1/128"`.
///
/// Host bits are allowed (`127.0.0.1/8` is accepted and means `127.0.0.0/8`).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidNetwork`] for the first entry that does not parse.
pub fn parse_networks<S: AsRef<str>>(networks: &[S]) -> ConfigResult<Vec<IpNet>> {
    networks
        .iter()
        .map(|network| {
            let network = network.as_ref().trim();
            network
                .parse::<IpNet>()
                .map(|net| net.trunc())
                .map_err(|e| ConfigError::InvalidNetwork {
                    network: network.to_owned(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Decides whether a client address may use the proxy.
#[derive(Debug)]
pub struct AllowlistGate {
    networks: RwLock<Arc<[IpNet]>>,
}

impl AllowlistGate {
    /// Create a gate permitting the given networks.
    #[must_use]
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self {
            networks: RwLock::new(networks.into()),
        }
    }

    /// Create a gate from CIDR strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNetwork`] if any range does not parse.
    pub fn parse<S: AsRef<str>>(networks: &[S]) -> ConfigResult<Self> {
        Ok(Self::new(parse_networks(networks)?))
    }

    /// Whether `addr` falls in any permitted network.
    ///
    /// An unknown address is never allowed. IPv4-mapped IPv6 addresses are matched
    /// as their IPv4 form.
    #[must_use]
    pub fn is_allowed(&self, addr: Option<IpAddr>) -> bool {
        let Some(addr) = addr else {
            return false;
        };
        let addr = addr.to_canonical();
        let networks = self.snapshot();
        networks.iter().any(|net| net.contains(&addr))
    }

    /// Replace the permitted networks atomically.
    pub fn replace(&self, networks: Vec<IpNet>) {
        let networks: Arc<[IpNet]> = networks.into();
        tracing::info!(count = networks.len(), "replacing source allowlist");
        *self.networks.write() = networks;
    }

    /// The current set of permitted networks.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[IpNet]> {
        Arc::clone(&self.networks.read())
    }
}
