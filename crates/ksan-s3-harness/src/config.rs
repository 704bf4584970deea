//! Harness configuration.
//!
//! Provides [`HarnessConfig`], read once per fixture from an optional JSON
//! file (path in `S3TESTS_CONFIG`) and then overridden by individual
//! environment variables.

use serde::{Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{HarnessError, HarnessResult};

/// Environment variable naming the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "S3TESTS_CONFIG";

/// Credentials and identity of one test account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Display name reported in ACL owner fields.
    #[builder(default, setter(into))]
    pub display_name: String,

    /// Canonical user id, used when granting permissions to this account.
    #[builder(default, setter(into))]
    pub user_id: String,

    /// E-mail address of the account.
    #[builder(default, setter(into))]
    pub email: String,

    /// Access key id.
    #[builder(setter(into))]
    pub access_key: String,

    /// Secret access key.
    #[builder(setter(into))]
    pub secret_key: String,
}

impl UserConfig {
    fn main() -> Self {
        Self {
            display_name: String::from("main"),
            user_id: String::from("main-user"),
            email: String::from("main@example.com"),
            access_key: String::from("main-access-key"),
            secret_key: String::from("main-secret-key"),
        }
    }

    fn alt() -> Self {
        Self {
            display_name: String::from("alt"),
            user_id: String::from("alt-user"),
            email: String::from("alt@example.com"),
            access_key: String::from("alt-access-key"),
            secret_key: String::from("alt-secret-key"),
        }
    }
}

/// A user block as written in the config file. Absent fields keep the
/// identity of the account the block belongs to.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialUser {
    display_name: Option<String>,
    user_id: Option<String>,
    email: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl PartialUser {
    fn over(self, base: UserConfig) -> UserConfig {
        UserConfig {
            display_name: self.display_name.unwrap_or(base.display_name),
            user_id: self.user_id.unwrap_or(base.user_id),
            email: self.email.unwrap_or(base.email),
            access_key: self.access_key.unwrap_or(base.access_key),
            secret_key: self.secret_key.unwrap_or(base.secret_key),
        }
    }
}

fn main_user<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UserConfig, D::Error> {
    Ok(PartialUser::deserialize(deserializer)?.over(UserConfig::main()))
}

fn alt_user<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UserConfig, D::Error> {
    Ok(PartialUser::deserialize(deserializer)?.over(UserConfig::alt()))
}

/// Connection and identity settings for a conformance run.
///
/// # Examples
///
/// ```
/// use ksan_s3_harness::config::HarnessConfig;
///
/// let config = HarnessConfig::default();
/// assert_eq!(config.endpoint_url(false), "http://localhost:8080");
/// assert!(config.bucket_prefix.contains("{random}"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Host name of the server under test.
    #[builder(default = String::from("localhost"), setter(into))]
    pub host: String,

    /// Plain HTTP port.
    #[builder(default = 8080)]
    pub port: u16,

    /// HTTPS port.
    #[builder(default = 8443)]
    pub ssl_port: u16,

    /// Whether the default clients talk TLS.
    #[builder(default = false)]
    pub secure: bool,

    /// Requested signature version, `"2"` or `"4"`.
    #[builder(default = String::from("4"), setter(into))]
    pub signature_version: String,

    /// Signing region.
    #[builder(default = String::from("us-east-1"), setter(into))]
    pub region: String,

    /// Bucket name prefix; `{random}` is replaced once per fixture.
    #[builder(default = String::from("ksan-{random}-"), setter(into))]
    pub bucket_prefix: String,

    /// Per-operation timeout in seconds.
    #[builder(default = 3600)]
    pub timeout_secs: u64,

    /// Primary account.
    #[builder(default = UserConfig::main())]
    #[serde(deserialize_with = "main_user")]
    pub main_user: UserConfig,

    /// Secondary account used for cross-account checks.
    #[builder(default = UserConfig::alt())]
    #[serde(deserialize_with = "alt_user")]
    pub alt_user: UserConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 8080,
            ssl_port: 8443,
            secure: false,
            signature_version: String::from("4"),
            region: String::from("us-east-1"),
            bucket_prefix: String::from("ksan-{random}-"),
            timeout_secs: 3600,
            main_user: UserConfig::main(),
            alt_user: UserConfig::alt(),
        }
    }
}

impl HarnessConfig {
    /// Load the configuration for this process.
    ///
    /// Reads the JSON file named by `S3TESTS_CONFIG` when set, then applies
    /// these environment overrides:
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `S3TESTS_HOST` | `host` |
    /// | `S3TESTS_PORT` | `port` |
    /// | `S3TESTS_SSL_PORT` | `ssl_port` |
    /// | `S3TESTS_SECURE` | `secure` |
    /// | `S3TESTS_SIGNATURE_VERSION` | `signature_version` |
    /// | `S3TESTS_REGION` | `region` |
    /// | `S3TESTS_BUCKET_PREFIX` | `bucket_prefix` |
    /// | `S3TESTS_MAIN_ACCESS_KEY` / `S3TESTS_MAIN_SECRET_KEY` | `main_user` |
    /// | `S3TESTS_ALT_ACCESS_KEY` / `S3TESTS_ALT_SECRET_KEY` | `alt_user` |
    pub fn load() -> HarnessResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &str) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`HarnessConfig::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> HarnessResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("S3TESTS_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("S3TESTS_PORT") {
            self.port = parse_port("S3TESTS_PORT", &v)?;
        }
        if let Some(v) = lookup("S3TESTS_SSL_PORT") {
            self.ssl_port = parse_port("S3TESTS_SSL_PORT", &v)?;
        }
        if let Some(v) = lookup("S3TESTS_SECURE") {
            self.secure = parse_bool(&v);
        }
        if let Some(v) = lookup("S3TESTS_SIGNATURE_VERSION") {
            self.signature_version = v;
        }
        if let Some(v) = lookup("S3TESTS_REGION") {
            self.region = v;
        }
        if let Some(v) = lookup("S3TESTS_BUCKET_PREFIX") {
            self.bucket_prefix = v;
        }
        if let Some(v) = lookup("S3TESTS_MAIN_ACCESS_KEY") {
            self.main_user.access_key = v;
        }
        if let Some(v) = lookup("S3TESTS_MAIN_SECRET_KEY") {
            self.main_user.secret_key = v;
        }
        if let Some(v) = lookup("S3TESTS_ALT_ACCESS_KEY") {
            self.alt_user.access_key = v;
        }
        if let Some(v) = lookup("S3TESTS_ALT_SECRET_KEY") {
            self.alt_user.secret_key = v;
        }
        Ok(())
    }

    /// Reject configurations no test can run with.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.host.is_empty() {
            return Err(HarnessError::Config("host must not be empty".to_owned()));
        }
        if self.main_user.access_key.is_empty() || self.main_user.secret_key.is_empty() {
            return Err(HarnessError::Config(
                "main user credentials must not be empty".to_owned(),
            ));
        }
        if !matches!(self.signature_version.as_str(), "2" | "4") {
            return Err(HarnessError::Config(format!(
                "unsupported signature version {:?}, expected \"2\" or \"4\"",
                self.signature_version
            )));
        }
        Ok(())
    }

    /// Endpoint URL for plain or TLS access.
    #[must_use]
    pub fn endpoint_url(&self, secure: bool) -> String {
        if secure {
            format!("https://{}:{}", self.host, self.ssl_port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Whether the run asked for SigV2 signing.
    #[must_use]
    pub fn wants_sigv2(&self) -> bool {
        self.signature_version == "2"
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_port(name: &str, value: &str) -> HarnessResult<u16> {
    value
        .parse::<u16>()
        .map_err(|e| HarnessError::Config(format!("{name}={value:?} is not a port: {e}")))
}
