//! Requests the proxy must refuse.

#[cfg(test)]
mod tests {
    use crate::{endpoint_url, s3_client_with_secret, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running proxy"]
    async fn test_should_reject_wrong_secret() {
        let client = s3_client_with_secret("definitely-not-the-secret");
        let result = client
            .head_bucket()
            .bucket(test_bucket_name("wrong"))
            .send()
            .await;

        let err = result.expect_err("request signed with the wrong secret must fail");
        let status = err.raw_response().map(|r| r.status().as_u16());
        assert_eq!(status, Some(400));
    }

    #[tokio::test]
    #[ignore = "requires running proxy"]
    async fn test_should_reject_unsigned_request() {
        let resp = reqwest::Client::new()
            .get(format!("{}/bucket/key", endpoint_url()))
            .send()
            .await
            .expect("proxy reachable");

        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    #[ignore = "requires running proxy"]
    async fn test_should_reject_missing_credential() {
        let resp = reqwest::Client::new()
            .get(format!("{}/bucket/key", endpoint_url()))
            .header("x-amz-date", "20060102T150405Z")
            .header("authorization", "foobar")
            .send()
            .await
            .expect("proxy reachable");

        assert_eq!(resp.status().as_u16(), 400);
        let body = resp.text().await.expect("body");
        assert!(
            body.contains("Credential not found"),
            "unexpected rejection body {body:?}; is the proxy running with S3GATE_DEBUG=1?"
        );
    }
}
