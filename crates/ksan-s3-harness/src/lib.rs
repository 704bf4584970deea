//! Black-box conformance harness for S3-compatible object stores.
//!
//! The harness drives a running server (KSAN or any other S3 implementation)
//! through the AWS SDK and exposes the pieces a conformance suite needs:
//! configuration, randomized content, a thin client facade whose errors carry
//! both HTTP status and service error code, multipart and versioning
//! orchestration, verification helpers, and a per-test fixture that removes
//! every bucket it handed out.
//!
//! # Architecture
//!
//! ```text
//!   tests (scenario catalogue)
//!        |
//!        v
//!   Fixture (bucket registry, scoped teardown)
//!        |
//!        +--> multipart / versioning (orchestration)
//!        +--> verify (assertions)
//!        +--> browser (POST policy uploads, presigned URLs)
//!        |
//!        v
//!   S3Client (one call per S3 primitive, S3Result<T>)
//!        |
//!        v
//!   aws-sdk-s3
//! ```

pub mod browser;
pub mod client;
pub mod config;
pub mod encryption;
pub mod error;
pub mod fixture;
pub mod generate;
pub mod multipart;
pub mod verify;
pub mod versioning;

pub use client::S3Client;
pub use config::{HarnessConfig, UserConfig};
pub use encryption::{CustomerKey, Encryption};
pub use error::{HarnessError, HarnessResult, S3Error, S3Result};
pub use fixture::Fixture;
pub use generate::{ByteRange, KB, MB};
pub use multipart::UploadSession;
