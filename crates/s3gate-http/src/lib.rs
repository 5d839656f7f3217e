//! HTTP layer of s3gate: the verifying hyper service and the upstream forwarder.
//!
//! - **Service** ([`service`]): [`ProxyState`](service::ProxyState) runs the
//!   admission pipeline; [`ProxyHttpService`](service::ProxyHttpService) adapts it
//!   to hyper for one connection.
//! - **Forwarding** ([`forward`]): header stripping, upstream re-signing and
//!   response relaying.
//! - **Errors** ([`error`]): request-level errors and their status codes.
//! - **Body** ([`body`]): the [`ProxyBody`](body::ProxyBody) response body.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request (peer address attached per connection)
//!   -> ProxyHttpService (hyper Service)
//!     -> AllowlistGate
//!     -> SigV4Verifier::authenticate (headers, credential, date)
//!     -> Body collection + X-Amz-Content-Sha256 check
//!     -> SigV4Verifier::verify (signature)
//!     -> Forwarder (strip, re-sign, send)
//!   <- Upstream response, streamed
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use s3gate_core::ProxyConfig;
//! use s3gate_http::service::ProxyState;
//!
//! let state = Arc::new(ProxyState::from_config(&ProxyConfig::from_env()).unwrap());
//! let service = state.service(Some("127.0.0.1".parse().unwrap()));
//! // Use `service` with a hyper connection.
//! ```

pub mod body;
pub mod error;
pub mod forward;
pub mod service;

pub use body::ProxyBody;
pub use error::ProxyError;
pub use forward::Forwarder;
pub use service::{ProxyHttpService, ProxyState};
