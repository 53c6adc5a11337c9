//! Schema Registry Client
//!
//! Resolves Avro schemas by numeric id or by subject, registers new ones, and
//! bulk-imports a directory of `*.avsc` definitions into a registry service.
//!
//! ## Features
//!
//! - **Two Backends**: an in-memory store loaded from a directory, or a remote
//!   registry service reached over HTTP
//! - **Deterministic Ids**: local ids are 64-bit Rabin fingerprints of schema full names
//! - **Subject Cache**: remote subject lookups go through a bounded LRU cache
//! - **Batch Import**: every schema in a directory registered under one deadline
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────────────┐
//!  RegistryConfig ────► │ open_store           │
//!                       └──────────┬───────────┘
//!                  http(s)://      │      anything else
//!                ┌─────────────────┴──────────────────┐
//!                ▼                                    ▼
//!     RemoteRegistryStore                     LocalDirectoryStore
//!     ├── SubjectCache (LRU)                  ├── RabinHasher ids
//!     └── RegistryService (HTTP)              └── SchemaSource (*.avsc)
//!                ▲
//!                │ register()
//!          BatchImporter ◄── SchemaSource
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod importer;
pub mod schema;
pub mod service;
pub mod source;
pub mod store;

pub use config::{ClientConfig, ImportConfig, RegistryConfig};
pub use error::{Result, RetrievalCause, SchemaError};
pub use fingerprint::RabinHasher;
pub use importer::{BatchImporter, ImportOptions, ImportState};
pub use schema::{RegisteredSchema, Schema, SchemaId};
pub use service::{HttpRegistryService, RegistryService, ServiceError, SubjectVersion};
pub use source::{AvscDirectorySource, SchemaSource};
pub use store::{
    is_rest_endpoint, open_store, ConfiguredStore, LocalDirectoryStore, RemoteRegistryStore,
    SchemaStore, SubjectCache,
};
