//! End-to-end tests for s3gate.
//!
//! These tests require a running proxy in front of an S3-compatible upstream that
//! accepts the same credentials. The proxy's `S3GATE_ALLOWED_ENDPOINT` must be the
//! `host:port` of `PROXY_ENDPOINT_URL`, since clients sign for that host. Start
//! the proxy with `S3GATE_DEBUG=1` so rejection bodies carry the error message.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! PROXY_ENDPOINT_URL=http://localhost:8099 \
//! PROXY_ACCESS_KEY=AKID PROXY_SECRET_KEY=SECRET PROXY_REGION=eu-central-1 \
//! cargo test -p s3gate-integration -- --ignored
//! ```

use std::sync::Once;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, RequestChecksumCalculation};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

/// Endpoint URL of the proxy.
#[must_use]
pub fn endpoint_url() -> String {
    env_or("PROXY_ENDPOINT_URL", "http://localhost:8099")
}

/// Create an S3 client that signs with the given secret.
#[must_use]
pub fn s3_client_with_secret(secret_key: &str) -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new(
        env_or("PROXY_ACCESS_KEY", "test"),
        secret_key,
        None,
        None,
        "integration-test",
    );

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(env_or("PROXY_REGION", "eu-central-1")))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Create an S3 client configured with the proxy's credentials.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    s3_client_with_secret(&env_or("PROXY_SECRET_KEY", "test"))
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return; // Bucket may not exist.
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_auth;
mod test_object;
