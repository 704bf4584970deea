//! Multipart upload orchestration.
//!
//! An [`UploadSession`] records the upload id, the `(part number, ETag)`
//! pairs in part order, and the text uploaded so far. Parts copied server
//! side contribute no local text; callers that need the expected body after
//! a copy track it themselves. Sessions are never completed implicitly.

use bytes::Bytes;
use typed_builder::TypedBuilder;

use crate::client::{CreateMultipartUpload, S3Client, UploadPart, UploadPartCopy};
use crate::encryption::CustomerKey;
use crate::error::S3Result;
use crate::generate::{ByteRange, make_part_data, part_sizes};

/// One completed part as sent in `CompleteMultipartUpload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// 1-based part number.
    pub part_number: i32,
    /// ETag returned by the part upload or copy.
    pub e_tag: String,
}

/// Source object for part copies.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PartSource {
    /// Source bucket.
    #[builder(setter(into))]
    pub bucket: String,
    /// Source key.
    #[builder(setter(into))]
    pub key: String,
    /// Source version.
    #[builder(default, setter(into))]
    pub version_id: Option<String>,
    /// SSE-C key of the source.
    #[builder(default, setter(into))]
    pub customer_key: Option<CustomerKey>,
}

/// An in-progress multipart upload.
#[derive(Debug)]
pub struct UploadSession {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Upload id returned at initiation.
    pub upload_id: String,
    /// Parts in ascending part-number order.
    pub parts: Vec<PartRecord>,
    /// Concatenation of locally uploaded part bodies.
    pub body: String,
    customer_key: Option<CustomerKey>,
}

impl UploadSession {
    /// Initiate an upload.
    pub async fn initiate(client: &S3Client, req: CreateMultipartUpload) -> S3Result<Self> {
        let bucket = req.bucket.clone();
        let key = req.key.clone();
        let customer_key = req.encryption.customer_key().cloned();
        let upload_id = client.create_multipart_upload(req).await?;
        Ok(Self {
            bucket,
            key,
            upload_id,
            parts: Vec::new(),
            body: String::new(),
            customer_key,
        })
    }

    /// Part number the next appended part will use.
    #[must_use]
    pub fn next_part_number(&self) -> i32 {
        self.parts.last().map_or(1, |p| p.part_number + 1)
    }

    /// Record an ETag; a re-sent part number replaces its earlier entry.
    fn record(&mut self, part_number: i32, e_tag: String) {
        match self.parts.iter_mut().find(|p| p.part_number == part_number) {
            Some(existing) => existing.e_tag = e_tag,
            None => {
                self.parts.push(PartRecord { part_number, e_tag });
                self.parts.sort_by_key(|p| p.part_number);
            }
        }
    }

    async fn send_part(&mut self, client: &S3Client, part_number: i32, data: &str) -> S3Result<()> {
        let e_tag = client
            .upload_part(
                UploadPart::builder()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(&self.upload_id)
                    .part_number(part_number)
                    .body(Bytes::copy_from_slice(data.as_bytes()))
                    .customer_key(self.customer_key.clone())
                    .build(),
            )
            .await?;
        self.record(part_number, e_tag);
        Ok(())
    }

    /// Upload `data` as the next part.
    pub async fn append_part(&mut self, client: &S3Client, data: &str) -> S3Result<()> {
        let part_number = self.next_part_number();
        self.send_part(client, part_number, data).await?;
        self.body.push_str(data);
        Ok(())
    }

    /// Upload `data` again under an already recorded part number and return
    /// the new ETag. `body` is left as it was; callers rebuild the expected
    /// object themselves.
    pub async fn replace_part(
        &mut self,
        client: &S3Client,
        part_number: i32,
        data: &str,
    ) -> S3Result<String> {
        self.send_part(client, part_number, data).await?;
        Ok(self
            .parts
            .iter()
            .find(|p| p.part_number == part_number)
            .map(|p| p.e_tag.clone())
            .unwrap_or_default())
    }

    /// Upload `size` random bytes in `part_size` parts after the existing ones.
    ///
    /// Part numbers listed in `resend` (numbered from 1 within this call) are
    /// uploaded a second time right after the first attempt.
    pub async fn append_upload(
        &mut self,
        client: &S3Client,
        size: usize,
        part_size: usize,
        resend: &[i32],
    ) -> S3Result<()> {
        for (index, data) in (1..).zip(make_part_data(size, part_size)) {
            let part_number = self.next_part_number();
            self.send_part(client, part_number, &data).await?;
            if resend.contains(&index) {
                self.send_part(client, part_number, &data).await?;
            }
            self.body.push_str(&data);
        }
        Ok(())
    }

    /// Copy the first `size` bytes of `source` in `part_size` ranges after
    /// the existing parts.
    pub async fn append_copy(
        &mut self,
        client: &S3Client,
        source: &PartSource,
        size: usize,
        part_size: usize,
    ) -> S3Result<()> {
        let mut offset = 0u64;
        for len in part_sizes(size, part_size) {
            let len = len as u64;
            let part_number = self.next_part_number();
            let e_tag = client
                .upload_part_copy(
                    UploadPartCopy::builder()
                        .source_bucket(&source.bucket)
                        .source_key(&source.key)
                        .bucket(&self.bucket)
                        .key(&self.key)
                        .upload_id(&self.upload_id)
                        .part_number(part_number)
                        .range(ByteRange::new(offset, offset + len - 1))
                        .source_version_id(source.version_id.clone())
                        .source_customer_key(source.customer_key.clone())
                        .customer_key(self.customer_key.clone())
                        .build(),
                )
                .await?;
            self.record(part_number, e_tag);
            offset += len;
        }
        Ok(())
    }

    /// Complete the upload with the recorded parts. Returns the expected body.
    pub async fn complete(self, client: &S3Client) -> S3Result<String> {
        client
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &self.parts)
            .await?;
        Ok(self.body)
    }

    /// Abort the upload.
    pub async fn abort(self, client: &S3Client) -> S3Result<()> {
        client
            .abort_multipart_upload(&self.bucket, &self.key, &self.upload_id)
            .await
    }
}

/// Initiate an upload and send `size` random bytes in `part_size` parts.
pub async fn setup_multipart_upload(
    client: &S3Client,
    req: CreateMultipartUpload,
    size: usize,
    part_size: usize,
    resend: &[i32],
) -> S3Result<UploadSession> {
    let mut session = UploadSession::initiate(client, req).await?;
    session.append_upload(client, size, part_size, resend).await?;
    Ok(session)
}

/// Initiate an upload whose parts are server-side copies of `source`.
pub async fn setup_multipart_copy(
    client: &S3Client,
    req: CreateMultipartUpload,
    source: &PartSource,
    size: usize,
    part_size: usize,
) -> S3Result<UploadSession> {
    let mut session = UploadSession::initiate(client, req).await?;
    session.append_copy(client, source, size, part_size).await?;
    Ok(session)
}
