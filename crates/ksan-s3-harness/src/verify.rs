//! Verification helpers.
//!
//! These are assertions: they panic with context on mismatch, and on any
//! request failure, because they only run inside tests after setup has
//! succeeded.

use std::collections::HashMap;
use std::fmt::Debug;

use aws_sdk_s3::types::{
    Grant, Grantee, LoggingEnabled, Object, ObjectVersion, Part, Tag, TargetGrant,
};

use crate::client::{GetObject, HeadObject, S3Client};
use crate::encryption::CustomerKey;
use crate::error::{S3Error, S3Result};
use crate::generate::{ByteRange, random_ranges, step_ranges};
use crate::multipart::PartRecord;

/// An object (optionally a version of it, optionally SSE-C encrypted).
#[derive(Debug, Clone)]
pub struct ObjectRef {
    /// Bucket.
    pub bucket: String,
    /// Key.
    pub key: String,
    /// Version to read.
    pub version_id: Option<String>,
    /// SSE-C key required to read it.
    pub customer_key: Option<CustomerKey>,
}

impl ObjectRef {
    /// Latest version of an unencrypted object.
    #[must_use]
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id: None,
            customer_key: None,
        }
    }

    /// Same object at a given version.
    #[must_use]
    pub fn version(mut self, version_id: Option<&str>) -> Self {
        self.version_id = version_id.map(ToOwned::to_owned);
        self
    }

    /// Same object read with an SSE-C key.
    #[must_use]
    pub fn customer_key(mut self, key: Option<CustomerKey>) -> Self {
        self.customer_key = key;
        self
    }

    fn get(&self, range: Option<ByteRange>) -> GetObject {
        let req = GetObject::builder()
            .bucket(&self.bucket)
            .key(&self.key)
            .version_id(self.version_id.clone())
            .customer_key(self.customer_key.clone());
        match range {
            Some(range) => GetObject {
                range: Some(range),
                ..req.build()
            },
            None => req.build(),
        }
    }
}

async fn fetch(client: &S3Client, obj: &ObjectRef, range: Option<ByteRange>) -> (i64, Vec<u8>) {
    let content = client
        .get_object(obj.get(range))
        .await
        .unwrap_or_else(|e| panic!("get {}/{} {range:?} failed: {e}", obj.bucket, obj.key));
    (content.content_length(), content.body.to_vec())
}

// ---------------------------------------------------------------------------
// Outcome assertions
// ---------------------------------------------------------------------------

/// Assert a call failed with exactly `status` and `code`; return the error.
pub fn assert_failure<T: Debug>(result: S3Result<T>, status: u16, code: &str) -> S3Error {
    match result {
        Ok(value) => panic!("expected {status} {code}, call succeeded with {value:?}"),
        Err(err) => {
            assert_eq!(err.status(), Some(status), "unexpected status in {err}");
            assert_eq!(err.code(), Some(code), "unexpected error code in {err}");
            err
        }
    }
}

/// Assert a call failed with `status`, whatever the code.
pub fn assert_status<T: Debug>(result: S3Result<T>, status: u16) -> S3Error {
    match result {
        Ok(value) => panic!("expected status {status}, call succeeded with {value:?}"),
        Err(err) => {
            assert_eq!(err.status(), Some(status), "unexpected status in {err}");
            err
        }
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Read the whole object `loops` times and compare each read to `expected`.
pub async fn check_content(client: &S3Client, obj: &ObjectRef, expected: &[u8], loops: usize) {
    for _ in 0..loops.max(1) {
        let (length, body) = fetch(client, obj, None).await;
        assert_eq!(length, expected.len() as i64, "content length of {}", obj.key);
        assert!(body == expected, "body of {} differs from what was written", obj.key);
    }
}

/// Read the object in consecutive `step`-byte ranges.
pub async fn check_content_using_range(
    client: &S3Client,
    obj: &ObjectRef,
    expected: &[u8],
    step: u64,
) {
    for range in step_ranges(expected.len() as u64, step) {
        let (length, body) = fetch(client, obj, Some(range)).await;
        assert_eq!(length, range.len() as i64, "length of {range:?}");
        assert!(body == range.slice(expected), "bytes of {range:?} differ");
    }
}

/// Read the object in `count` random ranges.
pub async fn check_content_using_random_range(
    client: &S3Client,
    obj: &ObjectRef,
    expected: &[u8],
    count: usize,
) {
    for range in random_ranges(expected.len() as u64, count) {
        let (length, body) = fetch(client, obj, Some(range)).await;
        assert_eq!(length, range.len() as i64, "length of {range:?}");
        assert!(body == range.slice(expected), "bytes of {range:?} differ");
    }
}

/// Compare source and destination bodies in full.
pub async fn check_copy_content(client: &S3Client, source: &ObjectRef, dest: &ObjectRef) {
    let (source_len, source_body) = fetch(client, source, None).await;
    let (dest_len, dest_body) = fetch(client, dest, None).await;
    assert_eq!(source_len, dest_len, "copy of {} changed its size", source.key);
    assert!(source_body == dest_body, "copy of {} changed its bytes", source.key);
}

/// Compare the destination with the same-length prefix of the source.
pub async fn check_copy_content_using_range(
    client: &S3Client,
    source: &ObjectRef,
    dest: &ObjectRef,
) {
    let head = client
        .head_object(
            HeadObject::builder()
                .bucket(&source.bucket)
                .key(&source.key)
                .version_id(source.version_id.clone())
                .customer_key(source.customer_key.clone())
                .build(),
        )
        .await
        .unwrap_or_else(|e| panic!("head {}/{} failed: {e}", source.bucket, source.key));
    let source_len = head.content_length().unwrap_or_default();

    let (dest_len, dest_body) = fetch(client, dest, None).await;
    assert!(
        source_len >= dest_len,
        "destination ({dest_len}) longer than source ({source_len})"
    );
    if dest_len == 0 {
        return;
    }
    let range = ByteRange::new(0, u64::try_from(dest_len - 1).unwrap_or_default());
    let (_, source_prefix) = fetch(client, source, Some(range)).await;
    assert!(source_prefix == dest_body, "copied prefix differs from source");
}

// ---------------------------------------------------------------------------
// Structured comparisons
// ---------------------------------------------------------------------------

/// Metadata equality regardless of order. The SDK hands back user metadata
/// as a `HashMap`, so the order the server sent is not observable.
pub fn check_metadata(expected: &[(String, String)], actual: Option<&HashMap<String, String>>) {
    let mut expected = expected.to_vec();
    expected.sort();
    let mut actual: Vec<(String, String)> = actual
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    actual.sort();
    assert_eq!(actual, expected, "metadata mismatch");
}

/// Tags as `(key, value)` pairs sorted by key.
#[must_use]
pub fn sorted_tags(tags: &[Tag]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = tags
        .iter()
        .map(|t| (t.key().to_owned(), t.value().to_owned()))
        .collect();
    pairs.sort();
    pairs
}

/// Tag equality after sorting both sides by key.
pub fn check_tags(expected: &[(String, String)], actual: &[Tag]) {
    let mut expected = expected.to_vec();
    expected.sort();
    assert_eq!(sorted_tags(actual), expected, "tag set mismatch");
}

fn grantee_key(grantee: Option<&Grantee>) -> String {
    grantee.map_or_else(String::new, |g| {
        format!(
            "{}:{}:{}:{}",
            g.r#type().as_str(),
            g.id().unwrap_or_default(),
            g.uri().unwrap_or_default(),
            g.email_address().unwrap_or_default()
        )
    })
}

fn grant_keys<'a, I>(grants: I) -> Vec<String>
where
    I: Iterator<Item = (Option<&'a Grantee>, Option<&'a str>)>,
{
    let mut keys: Vec<String> = grants
        .map(|(grantee, permission)| {
            format!("{}|{}", grantee_key(grantee), permission.unwrap_or_default())
        })
        .collect();
    keys.sort();
    keys
}

/// Grant equality, sorted by grantee and permission.
pub fn check_grants(expected: &[Grant], actual: &[Grant]) {
    let keys = |grants: &[Grant]| {
        grant_keys(
            grants
                .iter()
                .map(|g| (g.grantee(), g.permission().map(|p| p.as_str()))),
        )
    };
    assert_eq!(keys(actual), keys(expected), "grant mismatch");
}

fn target_grant_keys(grants: &[TargetGrant]) -> Vec<String> {
    grant_keys(
        grants
            .iter()
            .map(|g| (g.grantee(), g.permission().map(|p| p.as_str()))),
    )
}

/// Logging target, prefix and (when expected) target grants.
pub fn check_logging(expected: &LoggingEnabled, actual: Option<&LoggingEnabled>) {
    let actual = actual.unwrap_or_else(|| panic!("logging is disabled, expected {expected:?}"));
    assert_eq!(actual.target_bucket(), expected.target_bucket(), "logging target");
    assert_eq!(actual.target_prefix(), expected.target_prefix(), "logging prefix");
    if !expected.target_grants().is_empty() {
        assert_eq!(
            target_grant_keys(actual.target_grants()),
            target_grant_keys(expected.target_grants()),
            "logging grants"
        );
    }
}

/// Part numbers and ETags, in order.
pub fn check_parts(expected: &[PartRecord], actual: &[Part]) {
    let actual: Vec<(i32, String)> = actual
        .iter()
        .map(|p| {
            (
                p.part_number().unwrap_or_default(),
                p.e_tag().unwrap_or_default().to_owned(),
            )
        })
        .collect();
    let expected: Vec<(i32, String)> = expected
        .iter()
        .map(|p| (p.part_number, p.e_tag.clone()))
        .collect();
    assert_eq!(actual, expected, "part list mismatch");
}

/// Versions of `key` as listed (newest first), compared against ids and
/// bodies in write order (oldest first).
pub async fn check_versions(
    client: &S3Client,
    bucket: &str,
    key: &str,
    version_ids: &[String],
    contents: &[String],
) {
    let (versions, _) = client
        .list_all_versions(bucket)
        .await
        .unwrap_or_else(|e| panic!("list versions of {bucket} failed: {e}"));
    let mut versions: Vec<&ObjectVersion> =
        versions.iter().filter(|v| v.key() == Some(key)).collect();
    versions.reverse();
    assert_eq!(versions.len(), version_ids.len(), "version count of {key}");

    for ((version, expected_id), expected_body) in versions.iter().zip(version_ids).zip(contents) {
        assert_eq!(version.version_id(), Some(expected_id.as_str()));
        let obj = ObjectRef::new(bucket, key).version(Some(expected_id));
        let (_, body) = fetch(client, &obj, None).await;
        assert_eq!(body, expected_body.as_bytes(), "body of version {expected_id}");
    }
}

/// Total size of the listed objects.
#[must_use]
pub fn bytes_used(objects: &[Object]) -> i64 {
    objects.iter().filter_map(Object::size).sum()
}
