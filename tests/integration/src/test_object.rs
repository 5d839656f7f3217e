//! Object traffic relayed through the proxy.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::ByteStream;

    use crate::{cleanup_bucket, create_test_bucket, s3_client};

    #[tokio::test]
    #[ignore = "requires running proxy and upstream"]
    async fn test_should_put_and_get_object_through_proxy() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "putget").await;

        let body = b"hello, s3gate!";
        client
            .put_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .body(ByteStream::from_static(body))
            .content_type("text/plain")
            .send()
            .await
            .expect("put_object");

        let resp = client
            .get_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .send()
            .await
            .expect("get_object");

        assert_eq!(resp.content_type(), Some("text/plain"));
        let data = resp
            .body
            .collect()
            .await
            .expect("collect body")
            .into_bytes();
        assert_eq!(data.as_ref(), body);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running proxy and upstream"]
    async fn test_should_handle_keys_with_reserved_characters() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "reserved").await;

        for key in ["foo=bar/test.txt", "with space.txt", "a+b.txt"] {
            client
                .put_object()
                .bucket(&bucket)
                .key(key)
                .body(ByteStream::from_static(b"data"))
                .send()
                .await
                .unwrap_or_else(|e| panic!("put_object {key}: {e}"));

            let head = client.head_object().bucket(&bucket).key(key).send().await;
            assert!(head.is_ok(), "head_object {key} should succeed");
        }

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running proxy and upstream"]
    async fn test_should_list_objects_with_marker() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "list").await;

        for key in ["a.txt", "b.txt", "c.txt"] {
            client
                .put_object()
                .bucket(&bucket)
                .key(key)
                .body(ByteStream::from_static(b"x"))
                .send()
                .await
                .expect("put_object");
        }

        let resp = client
            .list_objects()
            .bucket(&bucket)
            .marker("a.txt")
            .send()
            .await
            .expect("list_objects");
        let keys: Vec<&str> = resp.contents().iter().filter_map(|o| o.key()).collect();
        assert_eq!(keys, vec!["b.txt", "c.txt"]);

        cleanup_bucket(&client, &bucket).await;
    }
}
