//! Encryption descriptors attached to object requests.
//!
//! A customer key keeps algorithm, key and key MD5 individually optional:
//! negative tests send SSE-C headers with one of them missing, and the
//! facade must forward exactly what it was given.

use aws_sdk_s3::error::BuildError;
use aws_sdk_s3::types::{
    ServerSideEncryption, ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration,
    ServerSideEncryptionRule,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest, Md5};

/// SSE-C algorithm name.
pub const AES256: &str = "AES256";

/// A key MD5 that matches no key.
pub const BAD_KEY_MD5: &str = "AAAAAAAAAAAAAAAAAAAAAA==";

const PRIMARY_KEY: &str = "pO3upElrwuEXSoFwCfnZPdSsmt/xWeFa0N9KgDijwVs=";
const PRIMARY_KEY_MD5: &str = "DWygnHRtgiJ77HCm+1rvHw==";
const SECONDARY_KEY: &str = "6b+WOZ1T3cqZMxgThRcXAQBrS5mXKdDUphvpxptl9/4=";
const SECONDARY_KEY_MD5: &str = "arxBvwY2V4SiOne6yppVPQ==";

/// SSE-C parameters as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerKey {
    /// `x-amz-server-side-encryption-customer-algorithm`.
    pub algorithm: Option<String>,
    /// `x-amz-server-side-encryption-customer-key` (base64).
    pub key: Option<String>,
    /// `x-amz-server-side-encryption-customer-key-MD5` (base64).
    pub key_md5: Option<String>,
}

impl CustomerKey {
    /// The key every SSE-C scenario writes with.
    #[must_use]
    pub fn primary() -> Self {
        Self::from_parts(PRIMARY_KEY, PRIMARY_KEY_MD5)
    }

    /// A second valid key, used to prove reads with the wrong key fail.
    #[must_use]
    pub fn secondary() -> Self {
        Self::from_parts(SECONDARY_KEY, SECONDARY_KEY_MD5)
    }

    /// Key derived from 32 raw bytes.
    #[must_use]
    pub fn from_key_bytes(key: &[u8; 32]) -> Self {
        Self {
            algorithm: Some(AES256.to_owned()),
            key: Some(BASE64.encode(key)),
            key_md5: Some(BASE64.encode(Md5::digest(key))),
        }
    }

    fn from_parts(key: &str, key_md5: &str) -> Self {
        Self {
            algorithm: Some(AES256.to_owned()),
            key: Some(key.to_owned()),
            key_md5: Some(key_md5.to_owned()),
        }
    }

    /// Same key with a replaced (or removed) MD5.
    #[must_use]
    pub fn with_key_md5(mut self, key_md5: Option<&str>) -> Self {
        self.key_md5 = key_md5.map(ToOwned::to_owned);
        self
    }

    /// Same parameters without the key itself.
    #[must_use]
    pub fn without_key(mut self) -> Self {
        self.key = None;
        self
    }

    /// Same parameters without the algorithm.
    #[must_use]
    pub fn without_algorithm(mut self) -> Self {
        self.algorithm = None;
        self
    }
}

/// Encryption applied to a write, or required by a read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Encryption {
    /// No encryption headers.
    #[default]
    None,
    /// SSE-S3 (`x-amz-server-side-encryption`).
    ServerManaged(ServerSideEncryption),
    /// SSE-C.
    CustomerKey(CustomerKey),
}

impl Encryption {
    /// SSE-S3 with AES256.
    #[must_use]
    pub fn sse_s3() -> Self {
        Self::ServerManaged(ServerSideEncryption::Aes256)
    }

    /// SSE-C with the primary key.
    #[must_use]
    pub fn sse_c() -> Self {
        Self::CustomerKey(CustomerKey::primary())
    }

    /// The server-side algorithm header, when SSE-S3.
    #[must_use]
    pub fn server_side(&self) -> Option<ServerSideEncryption> {
        match self {
            Self::ServerManaged(algorithm) => Some(algorithm.clone()),
            _ => None,
        }
    }

    /// The customer key, when SSE-C.
    #[must_use]
    pub fn customer_key(&self) -> Option<&CustomerKey> {
        match self {
            Self::CustomerKey(key) => Some(key),
            _ => None,
        }
    }

    /// SSE-C header values `(algorithm, key, key_md5)`; all `None` otherwise.
    #[must_use]
    pub fn customer_headers(&self) -> (Option<String>, Option<String>, Option<String>) {
        customer_headers(self.customer_key())
    }
}

/// Split an optional customer key into its three header values.
#[must_use]
pub fn customer_headers(
    key: Option<&CustomerKey>,
) -> (Option<String>, Option<String>, Option<String>) {
    key.map_or((None, None, None), |k| {
        (k.algorithm.clone(), k.key.clone(), k.key_md5.clone())
    })
}

/// Bucket default encryption with a single AES256 rule.
pub fn default_bucket_encryption() -> Result<ServerSideEncryptionConfiguration, BuildError> {
    let by_default = ServerSideEncryptionByDefault::builder()
        .sse_algorithm(ServerSideEncryption::Aes256)
        .build()?;
    ServerSideEncryptionConfiguration::builder()
        .rules(
            ServerSideEncryptionRule::builder()
                .apply_server_side_encryption_by_default(by_default)
                .build(),
        )
        .build()
}
