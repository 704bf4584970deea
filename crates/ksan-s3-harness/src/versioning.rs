//! Versioning setup helpers.

use std::time::Duration;

use aws_sdk_s3::types::BucketVersioningStatus;
use futures::future::join_all;
use tracing::debug;

use crate::client::S3Client;
use crate::error::{S3Error, S3Result};

const VERSIONING_POLL_ATTEMPTS: usize = 5;
const VERSIONING_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Set the versioning status and wait until a read observes it.
///
/// Returns the last observed status, which callers assert on.
pub async fn configure_versioning(
    client: &S3Client,
    bucket: &str,
    status: BucketVersioningStatus,
) -> S3Result<Option<BucketVersioningStatus>> {
    client.put_bucket_versioning(bucket, status.clone()).await?;
    let mut observed = None;
    for attempt in 0..VERSIONING_POLL_ATTEMPTS {
        observed = client.get_bucket_versioning(bucket).await?;
        if observed.as_ref() == Some(&status) {
            break;
        }
        debug!(bucket, attempt, "versioning status not yet visible");
        tokio::time::sleep(VERSIONING_POLL_INTERVAL).await;
    }
    Ok(observed)
}

/// Write `count` versions of `key` with bodies `content-{i}`.
///
/// Returns `(version ids, bodies)` in write order.
pub async fn setup_multiple_versions(
    client: &S3Client,
    bucket: &str,
    key: &str,
    count: usize,
) -> S3Result<(Vec<String>, Vec<String>)> {
    let mut version_ids = Vec::with_capacity(count);
    let mut contents = Vec::with_capacity(count);
    for i in 0..count {
        let body = format!("content-{i}");
        let output = client.put_text(bucket, key, body.clone()).await?;
        let version_id = output
            .version_id()
            .map(ToOwned::to_owned)
            .ok_or(S3Error::MissingField("x-amz-version-id"))?;
        version_ids.push(version_id);
        contents.push(body);
    }
    Ok((version_ids, contents))
}

/// Delete one version and drop it from the expected lists.
pub async fn remove_version(
    client: &S3Client,
    bucket: &str,
    key: &str,
    version_ids: &mut Vec<String>,
    contents: &mut Vec<String>,
    index: usize,
) -> S3Result<()> {
    let version_id = version_ids.remove(index);
    contents.remove(index);
    client.delete_object(bucket, key, Some(&version_id)).await
}

/// Write `count` versions of `key` at once, bodies `Data {i}`.
///
/// All writes are awaited before returning; the first failure, if any, is
/// reported after every write has finished.
pub async fn put_versions_concurrently(
    client: &S3Client,
    bucket: &str,
    key: &str,
    count: usize,
) -> S3Result<()> {
    let writes = (0..count).map(|i| client.put_text(bucket, key, format!("Data {i}")));
    join_all(writes)
        .await
        .into_iter()
        .find_map(Result::err)
        .map_or(Ok(()), Err)
}

/// Delete every version and delete marker in `bucket` at once.
pub async fn clear_versions_concurrently(client: &S3Client, bucket: &str) -> S3Result<()> {
    let (versions, markers) = client.list_all_versions(bucket).await?;
    let targets: Vec<(String, String)> = versions
        .iter()
        .filter_map(|v| Some((v.key()?.to_owned(), v.version_id()?.to_owned())))
        .chain(
            markers
                .iter()
                .filter_map(|m| Some((m.key()?.to_owned(), m.version_id()?.to_owned()))),
        )
        .collect();
    let deletes = targets
        .iter()
        .map(|(key, version)| client.delete_object(bucket, key, Some(version)));
    join_all(deletes)
        .await
        .into_iter()
        .find_map(Result::err)
        .map_or(Ok(()), Err)
}
