//! Client facade over `aws-sdk-s3`.
//!
//! One method per S3 primitive, each returning [`S3Result`]. Optional inputs
//! travel in `typed-builder` request structs; a field left unset is not sent,
//! so the server's own defaulting is what gets exercised. The facade never
//! retries and never reinterprets errors.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{
    BehaviorVersion, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::operation::copy_object::CopyObjectOutput;
use aws_sdk_s3::operation::get_bucket_acl::GetBucketAclOutput;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::get_object_acl::GetObjectAclOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::operation::list_object_versions::ListObjectVersionsOutput;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::operation::list_parts::ListPartsOutput;
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    AccessControlPolicy, Bucket, BucketCannedAcl, BucketLoggingStatus, BucketVersioningStatus,
    CompletedMultipartUpload, CompletedPart, Delete, DeleteMarkerEntry, Grant, Grantee,
    InventoryConfiguration, LoggingEnabled, MetadataDirective, MultipartUpload, Object,
    ObjectCannedAcl, ObjectIdentifier, ObjectVersion, Owner, Permission,
    ReplicationConfiguration, ServerSideEncryptionConfiguration, Tag, Tagging, Type,
    VersioningConfiguration,
};
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::config::{HarnessConfig, UserConfig};
use crate::encryption::{CustomerKey, Encryption, customer_headers};
use crate::error::{S3Error, S3Result};
use crate::generate::ByteRange;
use crate::multipart::PartRecord;

/// Bytes left unescaped in `x-amz-copy-source`.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Render the `x-amz-copy-source` value for `bucket/key[?versionId=..]`.
///
/// # Examples
///
/// ```
/// use ksan_s3_harness::client::copy_source;
///
/// assert_eq!(copy_source("src", "foo?bar", None), "src/foo%3Fbar");
/// assert_eq!(copy_source("src", "a/b c", Some("v1")), "src/a/b%20c?versionId=v1");
/// ```
#[must_use]
pub fn copy_source(bucket: &str, key: &str, version_id: Option<&str>) -> String {
    let encoded = utf8_percent_encode(key, COPY_SOURCE);
    match version_id {
        Some(version) => format!("{bucket}/{encoded}?versionId={version}"),
        None => format!("{bucket}/{encoded}"),
    }
}

fn metadata_map(metadata: Vec<(String, String)>) -> Option<HashMap<String, String>> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata.into_iter().collect())
    }
}

fn to_tagging(tags: &[(String, String)]) -> S3Result<Tagging> {
    let tag_set = tags
        .iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Tagging::builder().set_tag_set(Some(tag_set)).build()?)
}

// ---------------------------------------------------------------------------
// Request structs
// ---------------------------------------------------------------------------

/// `PutObject` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PutObject {
    /// Target bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Target key.
    #[builder(setter(into))]
    pub key: String,
    /// Object body; an unset body uploads zero bytes.
    #[builder(default, setter(into))]
    pub body: Bytes,
    /// `Content-Type`.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// User metadata without the `x-amz-meta-` prefix.
    #[builder(default, setter(into))]
    pub metadata: Vec<(String, String)>,
    /// Canned ACL.
    #[builder(default, setter(strip_option))]
    pub acl: Option<ObjectCannedAcl>,
    /// `x-amz-tagging` query-string form.
    #[builder(default, setter(strip_option, into))]
    pub tagging: Option<String>,
    /// Encryption of the written object.
    #[builder(default)]
    pub encryption: Encryption,
}

/// `GetObject` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct GetObject {
    /// Source bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Source key.
    #[builder(setter(into))]
    pub key: String,
    /// Byte range to fetch.
    #[builder(default, setter(strip_option))]
    pub range: Option<ByteRange>,
    /// Version to fetch.
    #[builder(default, setter(into))]
    pub version_id: Option<String>,
    /// SSE-C key the object was written with.
    #[builder(default, setter(into))]
    pub customer_key: Option<CustomerKey>,
}

/// `HeadObject` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HeadObject {
    /// Bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Key.
    #[builder(setter(into))]
    pub key: String,
    /// Version to inspect.
    #[builder(default, setter(into))]
    pub version_id: Option<String>,
    /// SSE-C key the object was written with.
    #[builder(default, setter(into))]
    pub customer_key: Option<CustomerKey>,
}

/// `CopyObject` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CopyObject {
    /// Source bucket.
    #[builder(setter(into))]
    pub source_bucket: String,
    /// Source key.
    #[builder(setter(into))]
    pub source_key: String,
    /// Destination bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Destination key.
    #[builder(setter(into))]
    pub key: String,
    /// Source version.
    #[builder(default, setter(into))]
    pub source_version_id: Option<String>,
    /// `COPY` or `REPLACE`.
    #[builder(default, setter(strip_option))]
    pub metadata_directive: Option<MetadataDirective>,
    /// Metadata for `REPLACE`.
    #[builder(default, setter(into))]
    pub metadata: Vec<(String, String)>,
    /// `Content-Type` for `REPLACE`.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// Canned ACL of the destination.
    #[builder(default, setter(strip_option))]
    pub acl: Option<ObjectCannedAcl>,
    /// `x-amz-copy-source-if-match`.
    #[builder(default, setter(strip_option, into))]
    pub if_match: Option<String>,
    /// SSE-C key of the source object.
    #[builder(default, setter(into))]
    pub source_customer_key: Option<CustomerKey>,
    /// Encryption of the destination object.
    #[builder(default)]
    pub encryption: Encryption,
}

/// `CreateMultipartUpload` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateMultipartUpload {
    /// Target bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Target key.
    #[builder(setter(into))]
    pub key: String,
    /// `Content-Type` of the completed object.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
    /// User metadata of the completed object.
    #[builder(default, setter(into))]
    pub metadata: Vec<(String, String)>,
    /// Encryption of the completed object.
    #[builder(default)]
    pub encryption: Encryption,
}

/// `UploadPart` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct UploadPart {
    /// Target bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Target key.
    #[builder(setter(into))]
    pub key: String,
    /// Upload id from initiation.
    #[builder(setter(into))]
    pub upload_id: String,
    /// 1-based part number.
    pub part_number: i32,
    /// Part body.
    #[builder(setter(into))]
    pub body: Bytes,
    /// SSE-C key given at initiation.
    #[builder(default, setter(into))]
    pub customer_key: Option<CustomerKey>,
}

/// `UploadPartCopy` inputs.
#[derive(Debug, Clone, TypedBuilder)]
pub struct UploadPartCopy {
    /// Source bucket.
    #[builder(setter(into))]
    pub source_bucket: String,
    /// Source key.
    #[builder(setter(into))]
    pub source_key: String,
    /// Destination bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Destination key.
    #[builder(setter(into))]
    pub key: String,
    /// Upload id of the destination.
    #[builder(setter(into))]
    pub upload_id: String,
    /// 1-based part number.
    pub part_number: i32,
    /// `x-amz-copy-source-range`.
    #[builder(default, setter(strip_option))]
    pub range: Option<ByteRange>,
    /// Source version.
    #[builder(default, setter(into))]
    pub source_version_id: Option<String>,
    /// SSE-C key of the source object.
    #[builder(default, setter(into))]
    pub source_customer_key: Option<CustomerKey>,
    /// SSE-C key given at initiation.
    #[builder(default, setter(into))]
    pub customer_key: Option<CustomerKey>,
}

/// A fetched object with its body collected.
#[derive(Debug)]
pub struct ObjectContent {
    /// Response headers; `output.body` is already drained.
    pub output: GetObjectOutput,
    /// Body bytes.
    pub body: Bytes,
}

impl ObjectContent {
    /// Body as text (objects written by the harness are ASCII).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `Content-Length` reported by the server.
    #[must_use]
    pub fn content_length(&self) -> i64 {
        self.output.content_length().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// S3 client bound to one account and endpoint.
#[derive(Debug, Clone)]
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    endpoint: String,
}

impl S3Client {
    /// Client for `user` against the configured endpoint.
    #[must_use]
    pub fn new(config: &HarnessConfig, user: &UserConfig, secure: bool) -> Self {
        Self::with_keys(config, &user.access_key, &user.secret_key, secure)
    }

    /// Client with explicit keys, e.g. deliberately wrong ones.
    #[must_use]
    pub fn with_keys(
        config: &HarnessConfig,
        access_key: &str,
        secret_key: &str,
        secure: bool,
    ) -> Self {
        if config.wants_sigv2() {
            warn!("signature version 2 requested; requests are signed with SigV4");
        }
        let endpoint = config.endpoint_url(secure);
        let creds = Credentials::new(access_key, secret_key, None, None, "ksan-s3-harness");

        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .endpoint_url(&endpoint)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_secs))
                    .build(),
            )
            .build();

        Self {
            inner: aws_sdk_s3::Client::from_conf(sdk_config),
            endpoint,
        }
    }

    /// The underlying SDK client.
    #[must_use]
    pub fn sdk(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Endpoint URL this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Create a bucket.
    pub async fn create_bucket(&self, bucket: &str) -> S3Result<()> {
        self.create_bucket_with_acl(bucket, None).await
    }

    /// Create a bucket with an optional canned ACL.
    pub async fn create_bucket_with_acl(
        &self,
        bucket: &str,
        acl: Option<BucketCannedAcl>,
    ) -> S3Result<()> {
        debug!(bucket, "create_bucket");
        self.inner
            .create_bucket()
            .bucket(bucket)
            .set_acl(acl)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Delete an (empty) bucket.
    pub async fn delete_bucket(&self, bucket: &str) -> S3Result<()> {
        debug!(bucket, "delete_bucket");
        self.inner
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Buckets owned by this account.
    pub async fn list_buckets(&self) -> S3Result<Vec<Bucket>> {
        let output = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.buckets().to_vec())
    }

    /// Location constraint of a bucket (`None` for the default region).
    pub async fn get_bucket_location(&self, bucket: &str) -> S3Result<Option<String>> {
        let output = self
            .inner
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output
            .location_constraint()
            .map(|c| c.as_str().to_owned()))
    }

    /// Set the versioning status.
    pub async fn put_bucket_versioning(
        &self,
        bucket: &str,
        status: BucketVersioningStatus,
    ) -> S3Result<()> {
        debug!(bucket, status = status.as_str(), "put_bucket_versioning");
        self.inner
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Versioning status; `None` when versioning was never configured.
    pub async fn get_bucket_versioning(
        &self,
        bucket: &str,
    ) -> S3Result<Option<BucketVersioningStatus>> {
        let output = self
            .inner
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.status().cloned())
    }

    /// Bucket ACL.
    pub async fn get_bucket_acl(&self, bucket: &str) -> S3Result<GetBucketAclOutput> {
        self.inner
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// Replace the bucket ACL.
    pub async fn put_bucket_acl(&self, bucket: &str, policy: AccessControlPolicy) -> S3Result<()> {
        self.inner
            .put_bucket_acl()
            .bucket(bucket)
            .access_control_policy(policy)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Append a canonical-user grant to the bucket ACL, keeping the owner.
    pub async fn add_bucket_grant(
        &self,
        bucket: &str,
        user_id: &str,
        permission: Permission,
    ) -> S3Result<()> {
        let acl = self.get_bucket_acl(bucket).await?;
        let policy = extend_acl(acl.owner(), acl.grants(), user_id, permission)?;
        self.put_bucket_acl(bucket, policy).await
    }

    /// Replace the bucket tag set.
    pub async fn put_bucket_tagging(
        &self,
        bucket: &str,
        tags: &[(String, String)],
    ) -> S3Result<()> {
        self.inner
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(to_tagging(tags)?)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Bucket tag set.
    pub async fn get_bucket_tagging(&self, bucket: &str) -> S3Result<Vec<Tag>> {
        let output = self
            .inner
            .get_bucket_tagging()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.tag_set().to_vec())
    }

    /// Remove the bucket tag set.
    pub async fn delete_bucket_tagging(&self, bucket: &str) -> S3Result<()> {
        self.inner
            .delete_bucket_tagging()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Set default bucket encryption.
    pub async fn put_bucket_encryption(
        &self,
        bucket: &str,
        config: ServerSideEncryptionConfiguration,
    ) -> S3Result<()> {
        self.inner
            .put_bucket_encryption()
            .bucket(bucket)
            .server_side_encryption_configuration(config)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Default bucket encryption, if any is returned.
    pub async fn get_bucket_encryption(
        &self,
        bucket: &str,
    ) -> S3Result<Option<ServerSideEncryptionConfiguration>> {
        let output = self
            .inner
            .get_bucket_encryption()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.server_side_encryption_configuration().cloned())
    }

    /// Remove default bucket encryption.
    pub async fn delete_bucket_encryption(&self, bucket: &str) -> S3Result<()> {
        self.inner
            .delete_bucket_encryption()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Set (or clear, with an empty status) access logging.
    pub async fn put_bucket_logging(
        &self,
        bucket: &str,
        status: BucketLoggingStatus,
    ) -> S3Result<()> {
        self.inner
            .put_bucket_logging()
            .bucket(bucket)
            .bucket_logging_status(status)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Access logging target, `None` when logging is disabled.
    pub async fn get_bucket_logging(&self, bucket: &str) -> S3Result<Option<LoggingEnabled>> {
        let output = self
            .inner
            .get_bucket_logging()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.logging_enabled().cloned())
    }

    /// Set the replication configuration.
    pub async fn put_bucket_replication(
        &self,
        bucket: &str,
        config: ReplicationConfiguration,
    ) -> S3Result<()> {
        self.inner
            .put_bucket_replication()
            .bucket(bucket)
            .replication_configuration(config)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Replication configuration, if any is returned.
    pub async fn get_bucket_replication(
        &self,
        bucket: &str,
    ) -> S3Result<Option<ReplicationConfiguration>> {
        let output = self
            .inner
            .get_bucket_replication()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.replication_configuration().cloned())
    }

    /// Remove the replication configuration.
    pub async fn delete_bucket_replication(&self, bucket: &str) -> S3Result<()> {
        self.inner
            .delete_bucket_replication()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Store an inventory configuration under `id`.
    pub async fn put_bucket_inventory(
        &self,
        bucket: &str,
        id: &str,
        config: InventoryConfiguration,
    ) -> S3Result<()> {
        self.inner
            .put_bucket_inventory_configuration()
            .bucket(bucket)
            .id(id)
            .inventory_configuration(config)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Inventory configuration stored under `id`.
    pub async fn get_bucket_inventory(
        &self,
        bucket: &str,
        id: &str,
    ) -> S3Result<Option<InventoryConfiguration>> {
        let output = self
            .inner
            .get_bucket_inventory_configuration()
            .bucket(bucket)
            .id(id)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.inventory_configuration().cloned())
    }

    /// All inventory configurations of a bucket (first page).
    pub async fn list_bucket_inventory(
        &self,
        bucket: &str,
    ) -> S3Result<Vec<InventoryConfiguration>> {
        let output = self
            .inner
            .list_bucket_inventory_configurations()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.inventory_configuration_list().to_vec())
    }

    /// Remove the inventory configuration stored under `id`.
    pub async fn delete_bucket_inventory(&self, bucket: &str, id: &str) -> S3Result<()> {
        self.inner
            .delete_bucket_inventory_configuration()
            .bucket(bucket)
            .id(id)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Upload an object.
    pub async fn put_object(&self, req: PutObject) -> S3Result<PutObjectOutput> {
        debug!(bucket = %req.bucket, key = %req.key, size = req.body.len(), "put_object");
        let (algorithm, key, key_md5) = req.encryption.customer_headers();
        self.inner
            .put_object()
            .bucket(req.bucket)
            .key(req.key)
            .body(ByteStream::from(req.body))
            .set_content_type(req.content_type)
            .set_metadata(metadata_map(req.metadata))
            .set_acl(req.acl)
            .set_tagging(req.tagging)
            .set_server_side_encryption(req.encryption.server_side())
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// Upload `body` under `key` with no optional headers.
    pub async fn put_text(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
    ) -> S3Result<PutObjectOutput> {
        self.put_object(PutObject::builder().bucket(bucket).key(key).body(body).build())
            .await
    }

    /// Fetch an object and collect its body.
    pub async fn get_object(&self, req: GetObject) -> S3Result<ObjectContent> {
        debug!(bucket = %req.bucket, key = %req.key, range = ?req.range, "get_object");
        let (algorithm, key, key_md5) = customer_headers(req.customer_key.as_ref());
        let mut output = self
            .inner
            .get_object()
            .bucket(req.bucket)
            .key(req.key)
            .set_range(req.range.map(|r| r.header()))
            .set_version_id(req.version_id)
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        let body = std::mem::take(&mut output.body)
            .collect()
            .await
            .map_err(|e| S3Error::Dispatch(e.to_string()))?
            .into_bytes();
        Ok(ObjectContent { output, body })
    }

    /// Fetch the latest version of an unencrypted object.
    pub async fn get_body(&self, bucket: &str, key: &str) -> S3Result<Bytes> {
        let content = self
            .get_object(GetObject::builder().bucket(bucket).key(key).build())
            .await?;
        Ok(content.body)
    }

    /// Object headers.
    pub async fn head_object(&self, req: HeadObject) -> S3Result<HeadObjectOutput> {
        let (algorithm, key, key_md5) = customer_headers(req.customer_key.as_ref());
        self.inner
            .head_object()
            .bucket(req.bucket)
            .key(req.key)
            .set_version_id(req.version_id)
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// Delete an object or one of its versions.
    pub async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> S3Result<()> {
        debug!(bucket, key, version_id, "delete_object");
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(ToOwned::to_owned))
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Delete many `(key, version)` pairs in one request.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[(String, Option<String>)],
    ) -> S3Result<()> {
        let ids = objects
            .iter()
            .map(|(key, version)| {
                ObjectIdentifier::builder()
                    .key(key)
                    .set_version_id(version.clone())
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delete = Delete::builder().set_objects(Some(ids)).quiet(true).build()?;
        self.inner
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Server-side copy.
    pub async fn copy_object(&self, req: CopyObject) -> S3Result<CopyObjectOutput> {
        let source = copy_source(
            &req.source_bucket,
            &req.source_key,
            req.source_version_id.as_deref(),
        );
        debug!(%source, bucket = %req.bucket, key = %req.key, "copy_object");
        let (algorithm, key, key_md5) = req.encryption.customer_headers();
        let (src_algorithm, src_key, src_key_md5) =
            customer_headers(req.source_customer_key.as_ref());
        self.inner
            .copy_object()
            .bucket(req.bucket)
            .key(req.key)
            .copy_source(source)
            .set_metadata_directive(req.metadata_directive)
            .set_metadata(metadata_map(req.metadata))
            .set_content_type(req.content_type)
            .set_acl(req.acl)
            .set_copy_source_if_match(req.if_match)
            .set_server_side_encryption(req.encryption.server_side())
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .set_copy_source_sse_customer_algorithm(src_algorithm)
            .set_copy_source_sse_customer_key(src_key)
            .set_copy_source_sse_customer_key_md5(src_key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// Object ACL.
    pub async fn get_object_acl(&self, bucket: &str, key: &str) -> S3Result<GetObjectAclOutput> {
        self.inner
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// Replace the object ACL.
    pub async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        policy: AccessControlPolicy,
    ) -> S3Result<()> {
        self.inner
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .access_control_policy(policy)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Append a canonical-user grant to the object ACL, keeping the owner.
    pub async fn add_object_grant(
        &self,
        bucket: &str,
        key: &str,
        user_id: &str,
        permission: Permission,
    ) -> S3Result<()> {
        let acl = self.get_object_acl(bucket, key).await?;
        let policy = extend_acl(acl.owner(), acl.grants(), user_id, permission)?;
        self.put_object_acl(bucket, key, policy).await
    }

    /// Replace the object tag set.
    pub async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tags: &[(String, String)],
    ) -> S3Result<()> {
        self.inner
            .put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(to_tagging(tags)?)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Object tag set.
    pub async fn get_object_tagging(&self, bucket: &str, key: &str) -> S3Result<Vec<Tag>> {
        let output = self
            .inner
            .get_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.tag_set().to_vec())
    }

    /// Remove the object tag set.
    pub async fn delete_object_tagging(&self, bucket: &str, key: &str) -> S3Result<()> {
        self.inner
            .delete_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// ListObjects (v1), first page.
    pub async fn list_objects(&self, bucket: &str) -> S3Result<Vec<Object>> {
        let output = self
            .inner
            .list_objects()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.contents().to_vec())
    }

    /// ListObjectsV2, one page.
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        max_keys: Option<i32>,
        continuation_token: Option<String>,
    ) -> S3Result<ListObjectsV2Output> {
        self.inner
            .list_objects_v2()
            .bucket(bucket)
            .set_max_keys(max_keys)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// ListObjectVersions, first page.
    pub async fn list_object_versions(&self, bucket: &str) -> S3Result<ListObjectVersionsOutput> {
        self.inner
            .list_object_versions()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    /// Every version and delete marker in the bucket, following pagination.
    pub async fn list_all_versions(
        &self,
        bucket: &str,
    ) -> S3Result<(Vec<ObjectVersion>, Vec<DeleteMarkerEntry>)> {
        let mut versions = Vec::new();
        let mut markers = Vec::new();
        let mut key_marker = None;
        let mut version_marker = None;
        loop {
            let page = self
                .inner
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(S3Error::from_sdk)?;
            versions.extend_from_slice(page.versions());
            markers.extend_from_slice(page.delete_markers());
            if page.is_truncated() != Some(true) {
                break;
            }
            key_marker = page.next_key_marker().map(ToOwned::to_owned);
            version_marker = page.next_version_id_marker().map(ToOwned::to_owned);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }
        Ok((versions, markers))
    }

    // -----------------------------------------------------------------------
    // Multipart
    // -----------------------------------------------------------------------

    /// Initiate a multipart upload and return its id.
    pub async fn create_multipart_upload(&self, req: CreateMultipartUpload) -> S3Result<String> {
        debug!(bucket = %req.bucket, key = %req.key, "create_multipart_upload");
        let (algorithm, key, key_md5) = req.encryption.customer_headers();
        let output = self
            .inner
            .create_multipart_upload()
            .bucket(req.bucket)
            .key(req.key)
            .set_content_type(req.content_type)
            .set_metadata(metadata_map(req.metadata))
            .set_server_side_encryption(req.encryption.server_side())
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        output
            .upload_id()
            .map(ToOwned::to_owned)
            .ok_or(S3Error::MissingField("UploadId"))
    }

    /// Upload one part and return its ETag.
    pub async fn upload_part(&self, req: UploadPart) -> S3Result<String> {
        debug!(key = %req.key, part = req.part_number, size = req.body.len(), "upload_part");
        let (algorithm, key, key_md5) = customer_headers(req.customer_key.as_ref());
        let output = self
            .inner
            .upload_part()
            .bucket(req.bucket)
            .key(req.key)
            .upload_id(req.upload_id)
            .part_number(req.part_number)
            .body(ByteStream::from(req.body))
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        output
            .e_tag()
            .map(ToOwned::to_owned)
            .ok_or(S3Error::MissingField("ETag"))
    }

    /// Copy a source range into one part and return its ETag.
    pub async fn upload_part_copy(&self, req: UploadPartCopy) -> S3Result<String> {
        let source = copy_source(
            &req.source_bucket,
            &req.source_key,
            req.source_version_id.as_deref(),
        );
        debug!(%source, part = req.part_number, range = ?req.range, "upload_part_copy");
        let (algorithm, key, key_md5) = customer_headers(req.customer_key.as_ref());
        let (src_algorithm, src_key, src_key_md5) =
            customer_headers(req.source_customer_key.as_ref());
        let output = self
            .inner
            .upload_part_copy()
            .bucket(req.bucket)
            .key(req.key)
            .upload_id(req.upload_id)
            .part_number(req.part_number)
            .copy_source(source)
            .set_copy_source_range(req.range.map(|r| r.header()))
            .set_sse_customer_algorithm(algorithm)
            .set_sse_customer_key(key)
            .set_sse_customer_key_md5(key_md5)
            .set_copy_source_sse_customer_algorithm(src_algorithm)
            .set_copy_source_sse_customer_key(src_key)
            .set_copy_source_sse_customer_key_md5(src_key_md5)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        output
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(ToOwned::to_owned)
            .ok_or(S3Error::MissingField("CopyPartResult.ETag"))
    }

    /// Complete an upload with the given ordered parts.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> S3Result<()> {
        debug!(bucket, key, parts = parts.len(), "complete_multipart_upload");
        let completed = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.e_tag)
                    .build()
            })
            .collect::<Vec<_>>();
        let upload = CompletedMultipartUpload::builder()
            .set_parts((!completed.is_empty()).then_some(completed))
            .build();
        self.inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// Abort an upload.
    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> S3Result<()> {
        debug!(bucket, key, upload_id, "abort_multipart_upload");
        self.inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(())
    }

    /// In-progress uploads of a bucket (first page).
    pub async fn list_multipart_uploads(&self, bucket: &str) -> S3Result<Vec<MultipartUpload>> {
        let output = self
            .inner
            .list_multipart_uploads()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(output.uploads().to_vec())
    }

    /// Parts of an upload, one page.
    pub async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        max_parts: Option<i32>,
        part_number_marker: Option<String>,
    ) -> S3Result<ListPartsOutput> {
        self.inner
            .list_parts()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .set_max_parts(max_parts)
            .set_part_number_marker(part_number_marker)
            .send()
            .await
            .map_err(S3Error::from_sdk)
    }

    // -----------------------------------------------------------------------
    // Presigned URLs
    // -----------------------------------------------------------------------

    /// Presigned `PUT` URL valid for `expires_in`.
    pub async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> S3Result<String> {
        let presigned = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(presigned.uri().to_owned())
    }

    /// Presigned `GET` URL valid for `expires_in`.
    pub async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> S3Result<String> {
        let presigned = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(S3Error::from_sdk)?;
        Ok(presigned.uri().to_owned())
    }
}

fn presigning(expires_in: Duration) -> S3Result<PresigningConfig> {
    PresigningConfig::expires_in(expires_in).map_err(|e| S3Error::Build(e.to_string()))
}

/// Existing grants plus a canonical-user grant, under the existing owner.
fn extend_acl(
    owner: Option<&Owner>,
    grants: &[Grant],
    user_id: &str,
    permission: Permission,
) -> S3Result<AccessControlPolicy> {
    let grantee = Grantee::builder()
        .r#type(Type::CanonicalUser)
        .id(user_id)
        .build()?;
    let mut grants = grants.to_vec();
    grants.push(
        Grant::builder()
            .grantee(grantee)
            .permission(permission)
            .build(),
    );
    Ok(AccessControlPolicy::builder()
        .set_grants(Some(grants))
        .set_owner(owner.cloned())
        .build())
}
