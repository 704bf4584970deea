//! Per-test fixture: clients, bucket registry and teardown.
//!
//! Every bucket name handed out by [`Fixture::bucket_name`] or
//! [`Fixture::new_bucket`] is registered before any request is made, so a
//! failed create still gets a cleanup attempt. [`Fixture::scope`] runs a
//! test body and then [`Fixture::cleanup`] whether the body returned or
//! panicked.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::client::S3Client;
use crate::config::HarnessConfig;
use crate::error::S3Result;
use crate::generate::{bucket_name, expand_prefix};

/// Account that owns a registered bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Account {
    /// The main test account.
    Main,
    /// The alternate account.
    Alt,
}

#[derive(Debug, Clone)]
struct Registered {
    name: String,
    owner: Account,
}

/// Test fixture. Clones share the same registry.
#[derive(Debug, Clone)]
pub struct Fixture {
    config: Arc<HarnessConfig>,
    prefix: String,
    main: S3Client,
    alt: S3Client,
    registry: Arc<Mutex<Vec<Registered>>>,
}

impl Fixture {
    /// Build clients for both accounts and draw this fixture's bucket prefix.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        let prefix = expand_prefix(&config.bucket_prefix);
        let main = S3Client::new(&config, &config.main_user, config.secure);
        let alt = S3Client::new(&config, &config.alt_user, config.secure);
        info!(endpoint = main.endpoint(), %prefix, "fixture ready");
        Self {
            config: Arc::new(config),
            prefix,
            main,
            alt,
            registry: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configuration the fixture was built from.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Bucket prefix with `{random}` already expanded.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Client of the main account.
    #[must_use]
    pub fn client(&self) -> &S3Client {
        &self.main
    }

    /// Client of the alternate account.
    #[must_use]
    pub fn alt_client(&self) -> &S3Client {
        &self.alt
    }

    /// Main-account client over TLS.
    #[must_use]
    pub fn secure_client(&self) -> S3Client {
        S3Client::new(&self.config, &self.config.main_user, true)
    }

    fn client_for(&self, owner: Account) -> &S3Client {
        match owner {
            Account::Main => &self.main,
            Account::Alt => &self.alt,
        }
    }

    /// Register a bucket owned by the main account for cleanup.
    pub fn register(&self, name: impl Into<String>) {
        self.register_as(name, Account::Main);
    }

    /// Register a bucket owned by `owner` for cleanup.
    pub fn register_as(&self, name: impl Into<String>, owner: Account) {
        let name = name.into();
        let mut registry = self.registry.lock();
        if !registry.iter().any(|r| r.name == name) {
            registry.push(Registered { name, owner });
        }
    }

    /// Names currently registered, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.registry.lock().iter().map(|r| r.name.clone()).collect()
    }

    /// Generate and register a fresh bucket name without creating it.
    #[must_use]
    pub fn bucket_name(&self) -> String {
        let name = bucket_name(&self.prefix);
        self.register(name.clone());
        name
    }

    /// Generate, register and create a bucket with the main account.
    pub async fn new_bucket(&self) -> S3Result<String> {
        self.new_bucket_as(Account::Main).await
    }

    /// Generate, register and create a bucket with the given account.
    pub async fn new_bucket_as(&self, owner: Account) -> S3Result<String> {
        let name = bucket_name(&self.prefix);
        self.register_as(name.clone(), owner);
        self.client_for(owner).create_bucket(&name).await?;
        Ok(name)
    }

    /// Remove every registered bucket and forget it.
    ///
    /// Each step (objects, versions, uploads, bucket) is attempted for every
    /// bucket; failures are logged and skipped.
    pub async fn cleanup(&self) {
        let buckets = std::mem::take(&mut *self.registry.lock());
        for bucket in buckets {
            let client = self.client_for(bucket.owner);
            clear_bucket(client, &bucket.name).await;
        }
    }

    /// Run `body` with a clone of this fixture, then clean up unconditionally.
    ///
    /// A panic in `body` is re-raised after cleanup.
    pub async fn scope<F, Fut>(self, body: F)
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = ()>,
    {
        let outcome = AssertUnwindSafe(body(self.clone())).catch_unwind().await;
        self.cleanup().await;
        if let Err(panic) = outcome {
            std::panic::resume_unwind(panic);
        }
    }
}

async fn delete_listed_objects(client: &S3Client, bucket: &str) {
    let mut token = None;
    loop {
        let page = match client.list_objects_v2(bucket, Some(1000), token.take()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(bucket, error = %e, "cleanup: list objects failed");
                return;
            }
        };
        for key in page.contents().iter().filter_map(|o| o.key()) {
            if let Err(e) = client.delete_object(bucket, key, None).await {
                warn!(bucket, key, error = %e, "cleanup: delete object failed");
            }
        }
        if page.is_truncated() != Some(true) {
            return;
        }
        token = page.next_continuation_token().map(ToOwned::to_owned);
        if token.is_none() {
            return;
        }
    }
}

async fn delete_all_versions(client: &S3Client, bucket: &str) {
    let (versions, markers) = match client.list_all_versions(bucket).await {
        Ok(listing) => listing,
        Err(e) => {
            warn!(bucket, error = %e, "cleanup: list versions failed");
            return;
        }
    };
    let targets = versions
        .iter()
        .map(|v| (v.key(), v.version_id()))
        .chain(markers.iter().map(|m| (m.key(), m.version_id())));
    for (key, version) in targets {
        let Some(key) = key else { continue };
        if let Err(e) = client.delete_object(bucket, key, version).await {
            warn!(bucket, key, error = %e, "cleanup: delete version failed");
        }
    }
}

async fn abort_uploads(client: &S3Client, bucket: &str) {
    let uploads = match client.list_multipart_uploads(bucket).await {
        Ok(uploads) => uploads,
        Err(e) => {
            warn!(bucket, error = %e, "cleanup: list multipart uploads failed");
            return;
        }
    };
    for upload in &uploads {
        if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
            if let Err(e) = client.abort_multipart_upload(bucket, key, id).await {
                warn!(bucket, key, upload_id = id, error = %e, "cleanup: abort upload failed");
            }
        }
    }
}

/// Best-effort removal of one bucket and everything in it.
pub async fn clear_bucket(client: &S3Client, bucket: &str) {
    delete_listed_objects(client, bucket).await;
    delete_all_versions(client, bucket).await;
    abort_uploads(client, bucket).await;
    if let Err(e) = client.delete_bucket(bucket).await {
        warn!(bucket, error = %e, "cleanup: delete bucket failed");
    }
}
