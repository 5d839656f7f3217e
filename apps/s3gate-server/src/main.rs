//! s3gate - authenticating reverse proxy for S3-compatible storage.
//!
//! Verifies the SigV4 signature of every request against a local credential store,
//! checks the caller's address against an allowlist, and forwards accepted requests
//! re-signed to the upstream endpoint.
//!
//! # Usage
//!
//! ```text
//! S3GATE_AWS_CREDENTIALS="AKID,SECRET" S3GATE_ALLOWED_ENDPOINT=s3.example.com s3gate
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3GATE_LISTEN` | `0.0.0.0:8099` | Bind address |
//! | `S3GATE_ALLOWED_ENDPOINT` | *(empty)* | Hostname clients sign for |
//! | `S3GATE_ALLOWED_SOURCE_SUBNETS` | `127.0.0.1/8` | Comma-separated CIDR ranges |
//! | `S3GATE_AWS_CREDENTIALS` | *(empty)* | Whitespace-separated `key,secret` pairs |
//! | `S3GATE_REGION` | `eu-central-1` | Signing region |
//! | `S3GATE_UPSTREAM_ENDPOINT` | `s3.<region>.amazonaws.com` | Upstream `host[:port]` |
//! | `S3GATE_UPSTREAM_INSECURE` | `false` | Use plain HTTP upstream |
//! | `S3GATE_UPSTREAM_TIMEOUT_SECS` | *(unset)* | Upstream exchange timeout |
//! | `S3GATE_MAX_CLOCK_SKEW_SECS` | *(unset)* | Reject stale `X-Amz-Date` values |
//! | `S3GATE_DEBUG` | `false` | Debug logs and error details in responses |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use s3gate_core::ProxyConfig;
use s3gate_http::ProxyState;

/// Version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// The effective log filter: debug mode always logs at `debug`.
fn effective_log_level(config: &ProxyConfig) -> &str {
    if config.debug { "debug" } else { &config.log_level }
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, state: Arc<ProxyState>) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = state.service(Some(peer_addr.ip()));
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::from_env();

    init_tracing(effective_log_level(&config))?;

    let state = ProxyState::from_config(&config).context("invalid s3gate configuration")?;
    let addr = config.listen_addr()?;

    info!(
        listen = %addr,
        allowed_endpoint = %config.allowed_endpoint,
        allowed_source_subnets = ?config.allowed_source_subnets,
        credentials = config.aws_credentials.len(),
        region = %config.region,
        upstream = %config.upstream_endpoint(),
        upstream_scheme = config.upstream_scheme(),
        debug = config.debug,
        version = VERSION,
        "starting s3gate",
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, Arc::new(state)).await
}
