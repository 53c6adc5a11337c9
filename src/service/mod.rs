//! Remote registry protocol
//!
//! The operations a schema registry service exposes over its REST API:
//!
//! ```text
//! GET  /schemas/ids/{id}
//! GET  /subjects/{subject}/versions/latest
//! POST /subjects/{subject}/versions
//! GET  /subjects
//! ```
//!
//! [`RegistryService`] is the seam the remote store is written against;
//! [`HttpRegistryService`] speaks the protocol over HTTP.

mod http;

pub use http::HttpRegistryService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry error codes that mean "nothing registered under that key"
const NOT_FOUND_ERROR_CODES: [i32; 3] = [40401, 40402, 40403];
const HTTP_NOT_FOUND: u16 = 404;

/// Failures reported by a registry service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never got an answer (connection refused, DNS, timeouts...)
    #[error("Registry request failed: {0}")]
    Transport(String),

    /// The registry answered with an error status
    #[error("Registry responded with status {status} (error code {error_code}): {message}")]
    Status {
        status: u16,
        error_code: i32,
        message: String,
    },

    /// The registry answered but the body could not be understood
    #[error("Malformed registry response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Whether this is the protocol's "not found" answer rather than an outage.
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::Status {
                status, error_code, ..
            } => *status == HTTP_NOT_FOUND || NOT_FOUND_ERROR_CODES.contains(error_code),
            _ => false,
        }
    }
}

/// Latest version of a subject as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVersion {
    pub subject: String,
    pub version: i32,
    pub id: i64,
    /// Schema definition as a JSON string
    pub schema: String,
}

/// A schema registry reachable over some transport
#[async_trait]
pub trait RegistryService: Send + Sync {
    /// Fetch the schema text registered under `id`.
    async fn schema_by_id(&self, id: i64) -> Result<String, ServiceError>;

    /// Fetch the latest version registered under `subject`.
    async fn latest_by_subject(&self, subject: &str) -> Result<SubjectVersion, ServiceError>;

    /// Register `schema` under `subject` and return its id. Registering the same
    /// schema under the same subject again returns the existing id.
    async fn register(&self, subject: &str, schema: &str) -> Result<i64, ServiceError>;

    /// List every subject known to the registry.
    async fn subjects(&self) -> Result<Vec<String>, ServiceError>;
}
