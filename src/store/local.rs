//! Directory-backed schema store

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use super::SchemaStore;
use crate::error::{require_non_empty, Result, SchemaError};
use crate::fingerprint::RabinHasher;
use crate::schema::{RegisteredSchema, Schema, SchemaId};
use crate::source::{dedupe_by_id, AvscDirectorySource, SchemaSource};

/// In-memory store populated once from a directory of schema definitions.
///
/// Ids are fingerprints of the schemas' full names. Registration only adds to
/// the in-memory map; nothing is written back to disk.
pub struct LocalDirectoryStore {
    directory: PathBuf,
    hasher: RabinHasher,
    schemas: RwLock<HashMap<SchemaId, Schema>>,
}

impl LocalDirectoryStore {
    /// Scan `directory` for `*.avsc` files. Never fails: a missing directory
    /// or unreadable files leave the store empty or partial.
    pub fn open(directory: impl AsRef<Path>) -> Self {
        Self::open_with(directory, &AvscDirectorySource::new())
    }

    /// Populate the store from `directory` using `source`.
    pub fn open_with(directory: impl AsRef<Path>, source: &dyn SchemaSource) -> Self {
        let directory = directory.as_ref().to_path_buf();
        let hasher = RabinHasher::new();

        let schemas: HashMap<SchemaId, Schema> = match source.load(&directory) {
            Ok(schemas) => dedupe_by_id(&hasher, schemas).into_iter().collect(),
            Err(e) => {
                error!(
                    "Failed to populate schema store from [{}], starting empty: {}",
                    directory.display(),
                    e
                );
                HashMap::new()
            }
        };
        info!("Loaded {} schemas from [{}]", schemas.len(), directory.display());

        Self {
            directory,
            hasher,
            schemas: RwLock::new(schemas),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current id → schema map.
    pub fn snapshot(&self) -> HashMap<SchemaId, Schema> {
        self.schemas.read().clone()
    }

    pub fn schema_id(&self, subject: &str) -> SchemaId {
        SchemaId::for_subject(&self.hasher, subject)
    }
}

#[async_trait]
impl SchemaStore for LocalDirectoryStore {
    async fn lookup_by_id(&self, id: SchemaId) -> Result<Schema> {
        self.schemas.read().get(&id).cloned().ok_or_else(|| {
            SchemaError::not_found(format!("Could not retrieve schema with schema id: {}", id), None)
        })
    }

    async fn lookup_by_subject(&self, subject: &str) -> Result<RegisteredSchema> {
        require_non_empty("subject", subject)?;
        let id = self.schema_id(subject);
        match self.schemas.read().get(&id) {
            // A colliding subject must not resolve to another schema
            Some(schema) if schema.full_name() == subject => {
                Ok(RegisteredSchema::new(id, schema.clone()))
            }
            _ => Err(SchemaError::not_found(
                format!("No schema exists with subject name: {}", subject),
                None,
            )),
        }
    }

    async fn register(&self, schema: &Schema) -> Result<SchemaId> {
        let id = self.schema_id(schema.full_name());
        let mut schemas = self.schemas.write();
        if schemas.contains_key(&id) {
            debug!("Schema {} already registered under id {}", schema.full_name(), id);
        } else {
            schemas.insert(id, schema.clone());
            debug!("Registered schema {} under id {}", schema.full_name(), id);
        }
        Ok(id)
    }
}

impl std::fmt::Debug for LocalDirectoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDirectoryStore")
            .field("directory", &self.directory)
            .field("schemas", &self.len())
            .finish()
    }
}
