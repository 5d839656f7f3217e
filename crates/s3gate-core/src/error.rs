//! Error types for the s3gate core.

use s3gate_auth::CredentialError;

/// Fatal configuration errors, detected when the proxy is constructed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source network range is not valid CIDR notation.
    #[error("invalid source network {network}: {reason}")]
    InvalidNetwork {
        /// The offending range, as configured.
        network: String,
        /// Parser message.
        reason: String,
    },

    /// No access keys are configured.
    #[error("no AWS credentials configured")]
    NoCredentials,

    /// A credential pair is unusable.
    #[error("invalid AWS credentials: {0}")]
    Credentials(#[from] CredentialError),

    /// The listen address does not parse as `ip:port`.
    #[error("invalid listen address: {0}")]
    ListenAddress(String),

    /// An environment value could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidSetting {
        /// Environment variable name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// The upstream endpoint is not a bare `host[:port]`.
    #[error("invalid upstream endpoint: {0:?}")]
    UpstreamEndpoint(String),

    /// Metric registration failed.
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Convenience result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
