//! CopyObject semantics: metadata, ACLs, versions, conditions, encryption.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::types::{
        BucketVersioningStatus, MetadataDirective, ObjectCannedAcl, Permission,
        ServerSideEncryption,
    };
    use ksan_s3_harness::client::{
        CopyObject, CreateMultipartUpload, GetObject, HeadObject, PutObject,
    };
    use ksan_s3_harness::encryption::default_bucket_encryption;
    use ksan_s3_harness::fixture::Account;
    use ksan_s3_harness::generate::random_text_string;
    use ksan_s3_harness::multipart::setup_multipart_upload;
    use ksan_s3_harness::verify::{ObjectRef, check_content, check_copy_content, check_metadata};
    use ksan_s3_harness::versioning::configure_versioning;
    use ksan_s3_harness::{Encryption, Fixture, KB, MB, S3Client};

    use crate::{assert_failure, assert_status, with_fixture};

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn copy(src_bucket: &str, src_key: &str, bucket: &str, key: &str) -> CopyObject {
        CopyObject::builder()
            .source_bucket(src_bucket)
            .source_key(src_key)
            .bucket(bucket)
            .key(key)
            .build()
    }

    async fn versioned_bucket(fx: &Fixture) -> String {
        let bucket = fx.new_bucket().await.expect("create bucket");
        let status = configure_versioning(fx.client(), &bucket, BucketVersioningStatus::Enabled)
            .await
            .expect("enable versioning");
        assert_eq!(status, Some(BucketVersioningStatus::Enabled));
        bucket
    }

    async fn put_versioned(client: &S3Client, bucket: &str, key: &str, body: &str) -> String {
        let output = client
            .put_text(bucket, key, body.to_owned())
            .await
            .expect("put object");
        output.version_id().expect("version id").to_owned()
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_zero_size_object() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo123bar", "").await.expect("put");

            client
                .copy_object(copy(&bucket, "foo123bar", &bucket, "bar321foo"))
                .await
                .expect("copy");

            let content = client
                .get_object(GetObject::builder().bucket(&bucket).key("bar321foo").build())
                .await
                .expect("get copy");
            assert_eq!(content.content_length(), 0);
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_within_same_bucket() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo123bar", "foo").await.expect("put");

            client
                .copy_object(copy(&bucket, "foo123bar", &bucket, "bar321foo"))
                .await
                .expect("copy");

            let body = client.get_body(&bucket, "bar321foo").await.expect("get copy");
            assert_eq!(&body[..], b"foo");
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_preserve_content_type_on_copy() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client
                .put_object(
                    PutObject::builder()
                        .bucket(&bucket)
                        .key("foo123bar")
                        .body("foo")
                        .content_type("text/bla")
                        .build(),
                )
                .await
                .expect("put");

            client
                .copy_object(copy(&bucket, "foo123bar", &bucket, "bar321foo"))
                .await
                .expect("copy");

            let content = client
                .get_object(GetObject::builder().bucket(&bucket).key("bar321foo").build())
                .await
                .expect("get copy");
            assert_eq!(content.output.content_type(), Some("text/bla"));
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_copy_onto_itself() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo123bar", "foo").await.expect("put");

            let result = client
                .copy_object(copy(&bucket, "foo123bar", &bucket, "foo123bar"))
                .await;
            assert_failure(result, 400, "InvalidRequest");
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_onto_itself_when_replacing_metadata() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo123bar", "foo").await.expect("put");
            let metadata = pairs(&[("foo", "bar")]);

            client
                .copy_object(CopyObject {
                    metadata_directive: Some(MetadataDirective::Replace),
                    metadata: metadata.clone(),
                    ..copy(&bucket, "foo123bar", &bucket, "foo123bar")
                })
                .await
                .expect("copy onto itself");

            let content = client
                .get_object(GetObject::builder().bucket(&bucket).key("foo123bar").build())
                .await
                .expect("get");
            check_metadata(&metadata, content.output.metadata());
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_between_buckets() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let src = fx.new_bucket().await.expect("create source bucket");
            let dst = fx.new_bucket().await.expect("create target bucket");
            client.put_text(&src, "foo123bar", "foo").await.expect("put");

            client
                .copy_object(copy(&src, "foo123bar", &dst, "bar321foo"))
                .await
                .expect("copy");

            let body = client.get_body(&dst, "bar321foo").await.expect("get copy");
            assert_eq!(&body[..], b"foo");
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_deny_copy_from_bucket_of_other_account() {
        with_fixture(|fx| async move {
            let src = fx.new_bucket().await.expect("create main bucket");
            let dst = fx.new_bucket_as(Account::Alt).await.expect("create alt bucket");
            fx.client().put_text(&src, "foo123bar", "foo").await.expect("put");

            let result = fx
                .alt_client()
                .copy_object(copy(&src, "foo123bar", &dst, "bar321foo"))
                .await;
            assert_status(result, 403);
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_allow_copy_after_granting_full_control() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let alt_id = fx.config().alt_user.user_id.clone();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo123bar", "foo").await.expect("put");

            client
                .add_object_grant(&bucket, "foo123bar", &alt_id, Permission::FullControl)
                .await
                .expect("grant on object");
            client
                .add_bucket_grant(&bucket, &alt_id, Permission::FullControl)
                .await
                .expect("grant on bucket");

            let body = fx
                .alt_client()
                .get_body(&bucket, "foo123bar")
                .await
                .expect("alt get");
            assert_eq!(&body[..], b"foo");

            fx.alt_client()
                .copy_object(copy(&bucket, "foo123bar", &bucket, "bar321foo"))
                .await
                .expect("alt copy");
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_apply_canned_acl_to_copy() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo123bar", "foo").await.expect("put");

            client
                .copy_object(CopyObject {
                    acl: Some(ObjectCannedAcl::PublicRead),
                    ..copy(&bucket, "foo123bar", &bucket, "bar321foo")
                })
                .await
                .expect("copy with public-read");
            fx.alt_client()
                .get_body(&bucket, "bar321foo")
                .await
                .expect("alt reads public copy");

            client
                .copy_object(CopyObject {
                    acl: Some(ObjectCannedAcl::PublicRead),
                    metadata_directive: Some(MetadataDirective::Replace),
                    metadata: pairs(&[("abc", "def")]),
                    ..copy(&bucket, "bar321foo", &bucket, "foo123bar")
                })
                .await
                .expect("copy back with public-read");
            fx.alt_client()
                .get_body(&bucket, "foo123bar")
                .await
                .expect("alt reads second public copy");
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_retain_metadata_on_copy() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            let metadata = pairs(&[("key1", "value1"), ("key2", "value2")]);

            for size in [3, MB] {
                client
                    .put_object(
                        PutObject::builder()
                            .bucket(&bucket)
                            .key("foo123bar")
                            .body(random_text_string(size))
                            .content_type("audio/ogg")
                            .metadata(metadata.clone())
                            .build(),
                    )
                    .await
                    .expect("put");

                client
                    .copy_object(copy(&bucket, "foo123bar", &bucket, "bar321foo"))
                    .await
                    .expect("copy");

                let content = client
                    .get_object(GetObject::builder().bucket(&bucket).key("bar321foo").build())
                    .await
                    .expect("get copy");
                assert_eq!(content.output.content_type(), Some("audio/ogg"));
                check_metadata(&metadata, content.output.metadata());
                assert_eq!(content.content_length(), size as i64);
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_replace_metadata_on_copy() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            let replaced = pairs(&[("key2", "value2"), ("key3", "value3")]);

            for size in [3, MB] {
                client
                    .put_object(
                        PutObject::builder()
                            .bucket(&bucket)
                            .key("foo123bar")
                            .body(random_text_string(size))
                            .content_type("audio/ogg")
                            .metadata(pairs(&[("key1", "value1"), ("key2", "value2")]))
                            .build(),
                    )
                    .await
                    .expect("put");

                client
                    .copy_object(CopyObject {
                        metadata_directive: Some(MetadataDirective::Replace),
                        metadata: replaced.clone(),
                        content_type: Some("audio/mpeg".to_owned()),
                        ..copy(&bucket, "foo123bar", &bucket, "bar321foo")
                    })
                    .await
                    .expect("copy");

                let content = client
                    .get_object(GetObject::builder().bucket(&bucket).key("bar321foo").build())
                    .await
                    .expect("get copy");
                assert_eq!(content.output.content_type(), Some("audio/mpeg"));
                check_metadata(&replaced, content.output.metadata());
                assert_eq!(content.content_length(), size as i64);
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_fail_copy_from_missing_bucket() {
        with_fixture(|fx| async move {
            let bucket = fx.new_bucket().await.expect("create bucket");
            let result = fx
                .client()
                .copy_object(copy(&format!("{bucket}-fake"), "foo123bar", &bucket, "bar321foo"))
                .await;
            assert_status(result, 404);
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_fail_copy_from_missing_key() {
        with_fixture(|fx| async move {
            let bucket = fx.new_bucket().await.expect("create bucket");
            let result = fx
                .client()
                .copy_object(copy(&bucket, "foo123bar", &bucket, "bar321foo"))
                .await;
            assert_status(result, 404);
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_specific_versions_across_buckets() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let first = versioned_bucket(&fx).await;
            let second = versioned_bucket(&fx).await;
            let body = random_text_string(5);
            let version = put_versioned(client, &first, "foo123bar", &body).await;

            client
                .copy_object(CopyObject {
                    source_version_id: Some(version.clone()),
                    ..copy(&first, "foo123bar", &first, "bar321foo")
                })
                .await
                .expect("copy within bucket");
            check_content(client, &ObjectRef::new(&first, "bar321foo"), body.as_bytes(), 1).await;

            let copied = client
                .copy_object(CopyObject {
                    source_version_id: Some(version),
                    ..copy(&first, "foo123bar", &second, "bar321foo2")
                })
                .await
                .expect("copy to second bucket");
            check_content(client, &ObjectRef::new(&second, "bar321foo2"), body.as_bytes(), 1)
                .await;

            client
                .copy_object(CopyObject {
                    source_version_id: copied.version_id().map(ToOwned::to_owned),
                    ..copy(&second, "bar321foo2", &first, "bar321foo3")
                })
                .await
                .expect("copy back");
            check_content(client, &ObjectRef::new(&first, "bar321foo3"), body.as_bytes(), 1)
                .await;
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_versioned_key_needing_url_encoding() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = versioned_bucket(&fx).await;
            let body = random_text_string(5);
            let version = put_versioned(client, &bucket, "foo?bar", &body).await;

            client
                .copy_object(CopyObject {
                    source_version_id: Some(version),
                    ..copy(&bucket, "foo?bar", &bucket, "bar&foo")
                })
                .await
                .expect("copy");
            check_content(client, &ObjectRef::new(&bucket, "bar&foo"), body.as_bytes(), 1).await;
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_versioned_multipart_object() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let first = versioned_bucket(&fx).await;
            let second = versioned_bucket(&fx).await;
            let metadata = pairs(&[("foo", "bar")]);

            let session = setup_multipart_upload(
                client,
                CreateMultipartUpload::builder()
                    .bucket(&first)
                    .key("srcmultipart")
                    .content_type("text/bla")
                    .metadata(metadata.clone())
                    .build(),
                50 * MB,
                5 * MB,
                &[],
            )
            .await
            .expect("upload parts");
            let body = session.complete(client).await.expect("complete");

            let head = client
                .head_object(HeadObject::builder().bucket(&first).key("srcmultipart").build())
                .await
                .expect("head source");
            let version = head.version_id().map(ToOwned::to_owned);

            let hops = [
                (&first, "srcmultipart", &first, "dstmultipart"),
                (&first, "srcmultipart", &second, "dstmultipart2"),
                (&second, "dstmultipart2", &first, "dstmultipart3"),
            ];
            let mut source_version = version;
            for (src_bucket, src_key, dst_bucket, dst_key) in hops {
                let copied = client
                    .copy_object(CopyObject {
                        source_version_id: source_version.clone(),
                        ..copy(src_bucket, src_key, dst_bucket, dst_key)
                    })
                    .await
                    .unwrap_or_else(|e| panic!("copy to {dst_key}: {e}"));

                let content = client
                    .get_object(GetObject::builder().bucket(dst_bucket).key(dst_key).build())
                    .await
                    .expect("get copy");
                assert_eq!(content.content_length(), body.len() as i64);
                assert_eq!(content.output.content_type(), Some("text/bla"));
                check_metadata(&metadata, content.output.metadata());
                assert!(content.body == body.as_bytes(), "body of {dst_key}");

                source_version = copied.version_id().map(ToOwned::to_owned);
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_when_if_match_agrees() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            let put = client.put_text(&bucket, "foo", "bar").await.expect("put");
            let e_tag = put.e_tag().expect("etag").to_owned();

            client
                .copy_object(CopyObject {
                    if_match: Some(e_tag),
                    ..copy(&bucket, "foo", &bucket, "bar")
                })
                .await
                .expect("conditional copy");
            let body = client.get_body(&bucket, "bar").await.expect("get copy");
            assert_eq!(&body[..], b"bar");
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_refuse_copy_when_if_match_differs() {
        with_fixture(|fx| async move {
            let client = fx.client();
            let bucket = fx.new_bucket().await.expect("create bucket");
            client.put_text(&bucket, "foo", "bar").await.expect("put");

            let result = client
                .copy_object(CopyObject {
                    if_match: Some("ABCORZ".to_owned()),
                    ..copy(&bucket, "foo", &bucket, "bar")
                })
                .await;
            assert_failure(result, 412, "PreconditionFailed");
        })
        .await;
    }

    // -----------------------------------------------------------------------
    // SSE-S3 object/bucket combinations
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone, Copy)]
    struct SseCase {
        source_object: bool,
        source_bucket: bool,
        dest_bucket: bool,
        dest_object: bool,
    }

    fn sse_cases() -> Vec<SseCase> {
        (0u8..16)
            .map(|bits| SseCase {
                source_object: bits & 0b1000 != 0,
                source_bucket: bits & 0b0100 != 0,
                dest_bucket: bits & 0b0010 != 0,
                dest_object: bits & 0b0001 != 0,
            })
            .collect()
    }

    fn expected_sse(encrypted: bool) -> Option<ServerSideEncryption> {
        encrypted.then_some(ServerSideEncryption::Aes256)
    }

    async fn check_sse_s3_copy(fx: &Fixture, size: usize, case: SseCase) {
        let client = fx.client();
        let src = fx.new_bucket().await.expect("create source bucket");
        let dst = fx.new_bucket().await.expect("create target bucket");
        let default_encryption = default_bucket_encryption().expect("encryption rule");
        if case.source_bucket {
            client
                .put_bucket_encryption(&src, default_encryption.clone())
                .await
                .expect("source bucket encryption");
        }
        if case.dest_bucket {
            client
                .put_bucket_encryption(&dst, default_encryption)
                .await
                .expect("target bucket encryption");
        }

        let data = "A".repeat(size);
        client
            .put_object(
                PutObject::builder()
                    .bucket(&src)
                    .key("SourceKey")
                    .body(data.clone())
                    .encryption(if case.source_object {
                        Encryption::sse_s3()
                    } else {
                        Encryption::None
                    })
                    .build(),
            )
            .await
            .expect("put source");
        let head = client
            .head_object(HeadObject::builder().bucket(&src).key("SourceKey").build())
            .await
            .expect("head source");
        assert_eq!(
            head.server_side_encryption().cloned(),
            expected_sse(case.source_object || case.source_bucket),
            "source encryption for {case:?}"
        );

        client
            .copy_object(CopyObject {
                encryption: if case.dest_object {
                    Encryption::sse_s3()
                } else {
                    Encryption::None
                },
                ..copy(&src, "SourceKey", &dst, "DestKey")
            })
            .await
            .unwrap_or_else(|e| panic!("copy for {case:?}: {e}"));

        let content = client
            .get_object(GetObject::builder().bucket(&dst).key("DestKey").build())
            .await
            .expect("get copy");
        assert_eq!(
            content.output.server_side_encryption().cloned(),
            expected_sse(case.dest_bucket || case.dest_object),
            "target encryption for {case:?}"
        );
        assert!(content.body == data.as_bytes(), "body for {case:?}");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_1kb_across_sse_s3_combinations() {
        with_fixture(|fx| async move {
            for case in sse_cases() {
                check_sse_s3_copy(&fx, KB, case).await;
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_256kb_across_sse_s3_combinations() {
        with_fixture(|fx| async move {
            for case in sse_cases() {
                check_sse_s3_copy(&fx, 256 * KB, case).await;
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_1mb_across_sse_s3_combinations() {
        with_fixture(|fx| async move {
            for case in sse_cases() {
                check_sse_s3_copy(&fx, MB, case).await;
            }
        })
        .await;
    }

    // -----------------------------------------------------------------------
    // Normal / SSE-S3 / SSE-C source and target
    // -----------------------------------------------------------------------

    fn encryption_kinds() -> [Encryption; 3] {
        [Encryption::None, Encryption::sse_s3(), Encryption::sse_c()]
    }

    async fn check_encrypted_copy(fx: &Fixture, source: &Encryption, target: &Encryption) {
        let client = fx.client();
        let bucket = fx.new_bucket().await.expect("create bucket");
        let data = random_text_string(KB);

        client
            .put_object(
                PutObject::builder()
                    .bucket(&bucket)
                    .key("source")
                    .body(data.clone())
                    .encryption(source.clone())
                    .build(),
            )
            .await
            .expect("put source");
        let source_key = source.customer_key().cloned();
        client
            .get_object(
                GetObject::builder()
                    .bucket(&bucket)
                    .key("source")
                    .customer_key(source_key.clone())
                    .build(),
            )
            .await
            .expect("read source");

        client
            .copy_object(CopyObject {
                metadata_directive: Some(MetadataDirective::Replace),
                content_type: Some("text/plain".to_owned()),
                source_customer_key: source_key.clone(),
                encryption: target.clone(),
                ..copy(&bucket, "source", &bucket, "target")
            })
            .await
            .unwrap_or_else(|e| panic!("copy {source:?} -> {target:?}: {e}"));

        check_copy_content(
            client,
            &ObjectRef::new(&bucket, "source").customer_key(source_key),
            &ObjectRef::new(&bucket, "target").customer_key(target.customer_key().cloned()),
        )
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_plain_source_to_every_target_encryption() {
        with_fixture(|fx| async move {
            for target in encryption_kinds() {
                check_encrypted_copy(&fx, &Encryption::None, &target).await;
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_sse_s3_source_to_every_target_encryption() {
        with_fixture(|fx| async move {
            for target in encryption_kinds() {
                check_encrypted_copy(&fx, &Encryption::sse_s3(), &target).await;
            }
        })
        .await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_sse_c_source_to_every_target_encryption() {
        with_fixture(|fx| async move {
            for target in encryption_kinds() {
                check_encrypted_copy(&fx, &Encryption::sse_c(), &target).await;
            }
        })
        .await;
    }
}
