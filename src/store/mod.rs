//! Schema stores
//!
//! A [`SchemaStore`] resolves schemas by id or subject and registers new
//! ones. Two backends implement it:
//!
//! - [`LocalDirectoryStore`]: an in-memory map built once from a directory of
//!   `*.avsc` files, ids derived from fingerprints of the full names.
//! - [`RemoteRegistryStore`]: a registry service behind a bounded read-through
//!   cache of subject lookups.
//!
//! [`open_store`] picks the backend from a single address value.

mod cache;
mod local;
mod remote;

pub use cache::SubjectCache;
pub use local::LocalDirectoryStore;
pub use remote::{RemoteRegistryStore, EVENT_ID_FIELD};

use async_trait::async_trait;
use tracing::info;

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::schema::{RegisteredSchema, Schema, SchemaId};

const HTTP: &str = "http://";
const HTTPS: &str = "https://";

/// Lookup and registration of schemas
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Schema registered under `id`.
    ///
    /// Fails with a retrieval error whose cause tells "never registered"
    /// apart from "backend unreachable".
    async fn lookup_by_id(&self, id: SchemaId) -> Result<Schema>;

    /// Latest schema registered under `subject`, with its id. An empty
    /// subject is an invalid argument.
    async fn lookup_by_subject(&self, subject: &str) -> Result<RegisteredSchema>;

    /// Register `schema` under its full name. Registering a schema that is
    /// already known returns the id it already has.
    async fn register(&self, schema: &Schema) -> Result<SchemaId>;
}

/// Whether `address` names a REST endpoint (`http://` or `https://`, any case)
/// rather than a directory.
pub fn is_rest_endpoint(address: &str) -> bool {
    let address = address.trim_start().to_ascii_lowercase();
    address.starts_with(HTTP) || address.starts_with(HTTPS)
}

/// The store variant chosen for a configured address
#[derive(Debug)]
pub enum ConfiguredStore {
    Local(LocalDirectoryStore),
    Remote(RemoteRegistryStore),
}

/// Build the store for `config.address`: a remote store for an http(s) URL,
/// otherwise a local store over the directory it names.
pub fn open_store(config: &RegistryConfig) -> Result<ConfiguredStore> {
    if is_rest_endpoint(&config.address) {
        info!(
            "Starting remote schema store [address={}, cache_maximum_size={}]",
            config.address, config.cache_maximum_size
        );
        let store = RemoteRegistryStore::connect(&config.address, config.cache_maximum_size)?;
        Ok(ConfiguredStore::Remote(store))
    } else {
        info!("Starting local schema store [address={}]", config.address);
        Ok(ConfiguredStore::Local(LocalDirectoryStore::open(&config.address)))
    }
}

#[async_trait]
impl SchemaStore for ConfiguredStore {
    async fn lookup_by_id(&self, id: SchemaId) -> Result<Schema> {
        match self {
            ConfiguredStore::Local(store) => store.lookup_by_id(id).await,
            ConfiguredStore::Remote(store) => store.lookup_by_id(id).await,
        }
    }

    async fn lookup_by_subject(&self, subject: &str) -> Result<RegisteredSchema> {
        match self {
            ConfiguredStore::Local(store) => store.lookup_by_subject(subject).await,
            ConfiguredStore::Remote(store) => store.lookup_by_subject(subject).await,
        }
    }

    async fn register(&self, schema: &Schema) -> Result<SchemaId> {
        match self {
            ConfiguredStore::Local(store) => store.register(schema).await,
            ConfiguredStore::Remote(store) => store.register(schema).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rest_endpoint_detection() {
        assert!(is_rest_endpoint("http://localhost:8081"));
        assert!(is_rest_endpoint("HTTPS://registry.example.com"));
        assert!(!is_rest_endpoint("/var/lib/schemas"));
        assert!(!is_rest_endpoint("ftp://registry"));
        assert!(!is_rest_endpoint("http:/missing-slash"));
    }

    #[test]
    fn test_open_store_picks_remote_for_urls() {
        let config = RegistryConfig::new("http://localhost:8081");
        let store = open_store(&config).unwrap();
        assert!(matches!(store, ConfiguredStore::Remote(_)));
    }

    #[test]
    fn test_open_store_picks_local_for_paths() {
        let dir = tempdir().unwrap();
        let config = RegistryConfig::new(dir.path().to_string_lossy());
        match open_store(&config).unwrap() {
            ConfiguredStore::Local(store) => assert!(store.is_empty()),
            other => panic!("Expected local store, got {:?}", other),
        }
    }

    #[test]
    fn test_open_store_tolerates_missing_directory() {
        let dir = tempdir().unwrap();
        let config = RegistryConfig::new(dir.path().join("missing").to_string_lossy());
        assert!(matches!(open_store(&config).unwrap(), ConfiguredStore::Local(_)));
    }
}
