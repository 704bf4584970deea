//! Error types for the harness.
//!
//! [`S3Error`] is what every client facade call returns on failure. It keeps
//! the HTTP status and the service error code side by side because negative
//! tests discriminate on the pair: `400 BadRequest` and `400 InvalidTag` are
//! different outcomes.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;

/// Failure of a single S3 request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum S3Error {
    /// The server answered with an error status.
    #[error(
        "service error {status} {}: {}",
        code.as_deref().unwrap_or("-"),
        message.as_deref().unwrap_or("")
    )]
    Service {
        /// HTTP status code of the response.
        status: u16,
        /// Service error code (`<Code>` element), absent for bodiless responses.
        code: Option<String>,
        /// Human readable message from the service.
        message: Option<String>,
    },

    /// The request never produced a response (connect, timeout, stream error).
    #[error("request dispatch failed: {0}")]
    Dispatch(String),

    /// The request could not be constructed on the client side.
    #[error("invalid request: {0}")]
    Build(String),

    /// A successful response lacked a field the caller depends on.
    #[error("response is missing {0}")]
    MissingField(&'static str),
}

impl S3Error {
    /// Convert an SDK error without reinterpreting it.
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        if let Some(response) = err.raw_response() {
            return Self::Service {
                status: response.status().as_u16(),
                code: err.code().map(ToOwned::to_owned),
                message: err.message().map(ToOwned::to_owned),
            };
        }
        let detail = DisplayErrorContext(&err).to_string();
        if matches!(err, SdkError::ConstructionFailure(_)) {
            Self::Build(detail)
        } else {
            Self::Dispatch(detail)
        }
    }

    /// HTTP status, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service error code, if the server sent one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Service error message, if the server sent one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Service { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Whether this is a service error with exactly this status and code.
    #[must_use]
    pub fn is(&self, status: u16, code: &str) -> bool {
        self.status() == Some(status) && self.code() == Some(code)
    }
}

impl From<aws_sdk_s3::error::BuildError> for S3Error {
    fn from(err: aws_sdk_s3::error::BuildError) -> Self {
        Self::Build(err.to_string())
    }
}

/// Result of a client facade call.
pub type S3Result<T> = Result<T, S3Error>;

/// Errors raised by the harness itself rather than by the server under test.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for [`crate::HarnessConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// An S3 request failed.
    #[error(transparent)]
    S3(#[from] S3Error),

    /// A raw HTTP request (POST upload, presigned URL) failed to dispatch.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
