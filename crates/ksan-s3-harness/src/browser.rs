//! Requests the SDK does not model: browser-style POST uploads signed with a
//! policy document, and plain HTTP against presigned URLs.

use std::io;

use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, KeyInit, Mac};
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use sha1::Sha1;
use tracing::{debug, error};

use crate::error::HarnessResult;

type HmacSha1 = Hmac<Sha1>;

// ---------------------------------------------------------------------------
// POST policy
// ---------------------------------------------------------------------------

/// POST policy document under construction.
///
/// # Examples
///
/// ```
/// use ksan_s3_harness::browser::PostPolicy;
///
/// let policy = PostPolicy::new(chrono::TimeDelta::minutes(100))
///     .eq("bucket", "photos")
///     .starts_with("$key", "foo")
///     .content_length_range(0, 1024);
/// assert_eq!(policy.document()["conditions"].as_array().map(Vec::len), Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct PostPolicy {
    expiration: DateTime<Utc>,
    conditions: Vec<Value>,
}

/// Base64 policy and its signature, ready for the form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPolicy {
    /// `policy` form field.
    pub policy: String,
    /// `signature` form field.
    pub signature: String,
}

impl PostPolicy {
    /// Policy expiring `valid_for` from now.
    #[must_use]
    pub fn new(valid_for: TimeDelta) -> Self {
        Self::expiring_at(Utc::now() + valid_for)
    }

    /// Policy expiring at a fixed instant.
    #[must_use]
    pub fn expiring_at(expiration: DateTime<Utc>) -> Self {
        Self {
            expiration,
            conditions: Vec::new(),
        }
    }

    /// Exact-match condition, `{"field": "value"}`.
    #[must_use]
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        let mut condition = serde_json::Map::new();
        condition.insert(field.to_owned(), Value::String(value.to_owned()));
        self.conditions.push(Value::Object(condition));
        self
    }

    /// Prefix condition, `["starts-with", "$field", "prefix"]`.
    #[must_use]
    pub fn starts_with(mut self, field: &str, prefix: &str) -> Self {
        self.conditions.push(json!(["starts-with", field, prefix]));
        self
    }

    /// Size condition, `["content-length-range", min, max]`.
    #[must_use]
    pub fn content_length_range(mut self, min: u64, max: u64) -> Self {
        self.conditions.push(json!(["content-length-range", min, max]));
        self
    }

    /// The JSON policy document.
    #[must_use]
    pub fn document(&self) -> Value {
        json!({
            "expiration": self.expiration.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "conditions": self.conditions,
        })
    }

    /// Encode the document and sign it: Base64(HMAC-SHA1(secret, policy)).
    pub fn sign(&self, secret_key: &str) -> HarnessResult<SignedPolicy> {
        let policy = BASE64.encode(self.document().to_string());
        let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
            .map_err(|e| anyhow!("invalid policy signing key: {e}"))?;
        mac.update(policy.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok(SignedPolicy { policy, signature })
    }
}

// ---------------------------------------------------------------------------
// Raw HTTP
// ---------------------------------------------------------------------------

/// Response of a request sent outside the SDK.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
    /// `<Code>` of an error body.
    pub error_code: Option<String>,
    /// `<Message>` of an error body.
    pub error_message: Option<String>,
}

impl RawResponse {
    async fn read(response: reqwest::Response) -> HarnessResult<Self> {
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        let (error_code, error_message) = if status >= 300 {
            parse_error_xml(&body)
        } else {
            (None, None)
        };
        debug!(status, code = ?error_code, "raw http response");
        Ok(Self {
            status,
            body,
            error_code,
            error_message,
        })
    }

    /// Body as text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Path-style URL of a bucket.
#[must_use]
pub fn bucket_url(endpoint: &str, bucket: &str) -> String {
    format!("{}/{bucket}", endpoint.trim_end_matches('/'))
}

/// Browser-style POST upload. `fields` are sent in order, `file` last.
pub async fn post_object(
    url: &str,
    fields: &[(String, String)],
    file_name: &str,
    file: impl Into<Bytes>,
) -> HarnessResult<RawResponse> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    let file: Bytes = file.into();
    form = form.part("file", Part::bytes(file.to_vec()).file_name(file_name.to_owned()));
    let response = reqwest::Client::new()
        .post(url)
        .multipart(form)
        .send()
        .await?;
    RawResponse::read(response).await
}

/// `PUT` to a presigned URL.
pub async fn http_put(url: &str, body: impl Into<Bytes>) -> HarnessResult<RawResponse> {
    let body: Bytes = body.into();
    let response = reqwest::Client::new().put(url).body(body).send().await?;
    RawResponse::read(response).await
}

/// `GET` from a presigned URL.
pub async fn http_get(url: &str) -> HarnessResult<RawResponse> {
    let response = reqwest::Client::new().get(url).send().await?;
    RawResponse::read(response).await
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

/// Extract `<Code>` and `<Message>` from an S3 error body.
#[must_use]
pub fn parse_error_xml(xml: &[u8]) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_reader(xml);

    let mut code = None;
    let mut message = None;
    let mut current: Option<Vec<u8>> = None;
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = Some(e.name().as_ref().to_vec());
                text.clear();
            }
            Ok(Event::Text(e)) => {
                if let Ok(decoded) = e.decode() {
                    if let Ok(unescaped) = quick_xml::escape::unescape(&decoded) {
                        text.push_str(&unescaped);
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Ok(name) = e.decode() {
                    if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
                        text.push_str(resolved);
                    } else if let Ok(Some(ch)) = e.resolve_char_ref() {
                        text.push(ch);
                    }
                }
            }
            Ok(Event::End(_)) => {
                match current.take().as_deref() {
                    Some(b"Code") => code = Some(text.trim().to_owned()),
                    Some(b"Message") => message = Some(text.trim().to_owned()),
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    (code, message)
}

/// `<Tagging><TagSet><Tag>..</Tag></TagSet></Tagging>` for the POST
/// `tagging` field.
#[must_use]
pub fn tagging_xml(tags: &[(String, String)]) -> String {
    let mut buf = Vec::with_capacity(64 + tags.len() * 48);
    if let Err(e) = write_tagging_xml(&mut buf, tags) {
        error!(error = %e, "failed to serialize tagging XML");
        buf.clear();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_tagging_xml(buf: &mut Vec<u8>, tags: &[(String, String)]) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.create_element("Tagging").write_inner_content(|w| {
        w.create_element("TagSet").write_inner_content(|w| {
            for (key, value) in tags {
                w.create_element("Tag").write_inner_content(|w| {
                    w.create_element("Key")
                        .write_text_content(BytesText::new(key))?;
                    w.create_element("Value")
                        .write_text_content(BytesText::new(value))?;
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}
