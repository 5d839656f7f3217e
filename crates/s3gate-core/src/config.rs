//! Proxy configuration.
//!
//! [`ProxyConfig`] is the single immutable value object the proxy is built from.
//! It is normally loaded from environment variables via [`ProxyConfig::from_env`];
//! tests construct it with the typed builder.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use http::uri::Authority;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use s3gate_auth::CredentialStore;

use crate::allowlist::parse_networks;
use crate::error::{ConfigError, ConfigResult};

/// One access key and its secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredential {
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key. Never serialized.
    #[serde(skip_serializing, default)]
    pub secret_access_key: String,
}

impl AwsCredential {
    /// Create a credential pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Parse a `key,secret` entry. An entry without a comma yields an empty secret,
    /// which validation rejects.
    #[must_use]
    pub fn parse(entry: &str) -> Self {
        let (key, secret) = entry.split_once(',').unwrap_or((entry, ""));
        Self::new(key.trim(), secret.trim())
    }
}

impl fmt::Debug for AwsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

/// s3gate configuration.
///
/// # Examples
///
/// ```
/// use s3gate_core::config::ProxyConfig;
///
/// let config = ProxyConfig::default();
/// assert_eq!(config.listen, "0.0.0.0:8099");
/// assert_eq!(config.upstream_endpoint(), "s3.eu-central-1.amazonaws.com");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Bind address for the proxy listener.
    #[builder(default = String::from("0.0.0.0:8099"))]
    pub listen: String,

    /// Front-door hostname clients sign their requests for.
    #[builder(default, setter(into))]
    pub allowed_endpoint: String,

    /// Source networks allowed to use the proxy, in CIDR notation.
    #[builder(default = vec![String::from("127.0.0.1/8")])]
    pub allowed_source_subnets: Vec<String>,

    /// Access keys accepted by the proxy.
    #[builder(default)]
    pub aws_credentials: Vec<AwsCredential>,

    /// Region clients sign for; also used to sign upstream requests.
    #[builder(default = String::from("eu-central-1"), setter(into))]
    pub region: String,

    /// Upstream `host[:port]`. Empty means the AWS S3 endpoint of `region`.
    #[builder(default, setter(into))]
    pub upstream_endpoint: String,

    /// Talk plain HTTP to the upstream instead of HTTPS.
    #[builder(default = false)]
    pub upstream_insecure: bool,

    /// Timeout for a whole upstream exchange, in seconds.
    #[builder(default)]
    pub upstream_timeout_secs: Option<u64>,

    /// Maximum accepted distance between `X-Amz-Date` and now, in seconds.
    #[builder(default)]
    pub max_clock_skew_secs: Option<u64>,

    /// Verbose logging and error details in rejection bodies.
    #[builder(default = false)]
    pub debug: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Environment values that did not parse, as `(variable, value)`.
    #[serde(skip)]
    #[builder(default, setter(skip))]
    unparsed: Vec<(String, String)>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3GATE_LISTEN` | `0.0.0.0:8099` |
    /// | `S3GATE_ALLOWED_ENDPOINT` | *(empty)* |
    /// | `S3GATE_ALLOWED_SOURCE_SUBNETS` | `127.0.0.1/8` |
    /// | `S3GATE_AWS_CREDENTIALS` | *(empty)* |
    /// | `S3GATE_REGION` | `eu-central-1` |
    /// | `S3GATE_UPSTREAM_ENDPOINT` | *(empty)* |
    /// | `S3GATE_UPSTREAM_INSECURE` | `false` |
    /// | `S3GATE_UPSTREAM_TIMEOUT_SECS` | *(unset)* |
    /// | `S3GATE_MAX_CLOCK_SKEW_SECS` | *(unset)* |
    /// | `S3GATE_DEBUG` | `false` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// `S3GATE_ALLOWED_SOURCE_SUBNETS` is comma-separated; `S3GATE_AWS_CREDENTIALS`
    /// holds whitespace-separated `key,secret` entries. Values are not validated
    /// here; see [`ProxyConfig::validate`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("S3GATE_LISTEN") {
            config.listen = v;
        }
        if let Some(v) = lookup("S3GATE_ALLOWED_ENDPOINT") {
            config.allowed_endpoint = v;
        }
        if let Some(v) = lookup("S3GATE_ALLOWED_SOURCE_SUBNETS") {
            config.allowed_source_subnets = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(v) = lookup("S3GATE_AWS_CREDENTIALS") {
            config.aws_credentials = v.split_whitespace().map(AwsCredential::parse).collect();
        }
        if let Some(v) = lookup("S3GATE_REGION") {
            config.region = v;
        }
        if let Some(v) = lookup("S3GATE_UPSTREAM_ENDPOINT") {
            config.upstream_endpoint = v;
        }
        if let Some(v) = lookup("S3GATE_UPSTREAM_INSECURE") {
            config.upstream_insecure = parse_bool(&v);
        }
        if let Some(v) = lookup("S3GATE_UPSTREAM_TIMEOUT_SECS") {
            config.upstream_timeout_secs = config.parse_setting("S3GATE_UPSTREAM_TIMEOUT_SECS", v);
        }
        if let Some(v) = lookup("S3GATE_MAX_CLOCK_SKEW_SECS") {
            config.max_clock_skew_secs = config.parse_setting("S3GATE_MAX_CLOCK_SKEW_SECS", v);
        }
        if let Some(v) = lookup("S3GATE_DEBUG") {
            config.debug = parse_bool(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Parse `value`, remembering it for [`ProxyConfig::validate`] on failure.
    fn parse_setting<T: FromStr>(&mut self, name: &str, value: String) -> Option<T> {
        let parsed = value.trim().parse().ok();
        if parsed.is_none() {
            self.unparsed.push((name.to_owned(), value));
        }
        parsed
    }

    /// Check every invariant the proxy relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some((name, value)) = self.unparsed.first() {
            return Err(ConfigError::InvalidSetting {
                name: name.clone(),
                value: value.clone(),
            });
        }
        self.listen_addr()?;
        parse_networks(&self.allowed_source_subnets)?;
        self.credential_store()?;
        self.upstream_authority()?;
        Ok(())
    }

    /// The listener socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ListenAddress`] if `listen` is not `ip:port`.
    pub fn listen_addr(&self) -> ConfigResult<SocketAddr> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::ListenAddress(self.listen.clone()))
    }

    /// Build the credential store from the configured pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoCredentials`] for an empty list and
    /// [`ConfigError::Credentials`] for empty or duplicate entries.
    pub fn credential_store(&self) -> ConfigResult<CredentialStore> {
        if self.aws_credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        let store = CredentialStore::new(self.aws_credentials.iter().map(|c| {
            (c.access_key_id.clone(), c.secret_access_key.clone())
        }))?;
        Ok(store)
    }

    /// Upstream `host[:port]`, defaulting to `s3.<region>.amazonaws.com`.
    #[must_use]
    pub fn upstream_endpoint(&self) -> String {
        if self.upstream_endpoint.is_empty() {
            format!("s3.{}.amazonaws.com", self.region)
        } else {
            self.upstream_endpoint.clone()
        }
    }

    /// The upstream endpoint as a URI authority.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UpstreamEndpoint`] unless the endpoint is a bare
    /// `host[:port]`.
    pub fn upstream_authority(&self) -> ConfigResult<Authority> {
        let endpoint = self.upstream_endpoint();
        let invalid = || ConfigError::UpstreamEndpoint(endpoint.clone());

        let authority: Authority = endpoint.parse().map_err(|_| invalid())?;
        let has_port = authority.host().len() != authority.as_str().len();
        if authority.as_str().contains('@') || (has_port && authority.port_u16().is_none()) {
            return Err(invalid());
        }
        Ok(authority)
    }

    /// URL scheme used towards the upstream.
    #[must_use]
    pub fn upstream_scheme(&self) -> &'static str {
        if self.upstream_insecure { "http" } else { "https" }
    }

    /// Timeout for upstream exchanges, if configured.
    #[must_use]
    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }

    /// Allowed clock skew for `X-Amz-Date`, if configured.
    #[must_use]
    pub fn max_clock_skew(&self) -> Option<TimeDelta> {
        self.max_clock_skew_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
