//! Schema sources
//!
//! Loads schema definitions from storage. The stock source walks a directory
//! tree for `*.avsc` files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, SchemaError};
use crate::fingerprint::RabinHasher;
use crate::schema::{Schema, SchemaId};

/// File extension of Avro schema definitions
pub const AVRO_FILE_EXTENSION: &str = "avsc";

/// Something that produces named schema definitions from a location.
///
/// Implementations skip malformed entries with a warning and treat a missing
/// location as empty.
pub trait SchemaSource: Send + Sync {
    fn load(&self, location: &Path) -> Result<Vec<Schema>>;
}

/// Recursive `*.avsc` directory scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct AvscDirectorySource;

impl AvscDirectorySource {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaSource for AvscDirectorySource {
    fn load(&self, location: &Path) -> Result<Vec<Schema>> {
        if !location.exists() {
            warn!("Schema directory [{}] does not exist, no schemas loaded", location.display());
            return Ok(Vec::new());
        }

        debug!("Scanning files in directory: [{}]", location.display());
        let mut schemas = Vec::new();
        let mut errors = false;

        for entry in WalkDir::new(location).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Couldn't read entry under [{}], skipping: {}", location.display(), e);
                    errors = true;
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                debug!("Processing directory: [{}] ...", path.display());
                continue;
            }
            if path.extension().map_or(true, |ext| ext != AVRO_FILE_EXTENSION) {
                debug!("Skipping file: [{}]", path.display());
                continue;
            }

            debug!("Processing file: [{}]", path.display());
            let parsed = fs::read_to_string(path)
                .map_err(SchemaError::from)
                .and_then(|content| Schema::parse_str(&content));
            match parsed {
                Ok(schema) => schemas.push(schema),
                Err(e) => {
                    warn!("Couldn't parse file [{}] to schema, skipping malformed file: {}", path.display(), e);
                    errors = true;
                }
            }
        }

        if errors {
            info!("Errors occurred when processing directory. Check logs for more details.");
        } else {
            info!("Finished processing directories without any errors");
        }
        Ok(schemas)
    }
}

/// Assign each schema its fingerprint id, keeping the first schema seen for
/// an id. Later schemas whose names collide are logged and dropped.
pub fn dedupe_by_id(hasher: &RabinHasher, schemas: Vec<Schema>) -> Vec<(SchemaId, Schema)> {
    let mut seen: HashMap<SchemaId, usize> = HashMap::with_capacity(schemas.len());
    let mut unique: Vec<(SchemaId, Schema)> = Vec::with_capacity(schemas.len());

    for schema in schemas {
        let id = SchemaId::for_subject(hasher, schema.full_name());
        if let Some(&index) = seen.get(&id) {
            let existing = &unique[index].1;
            if existing.full_name() == schema.full_name() {
                warn!("Schema [{}] is defined more than once, keeping the first definition", schema.full_name());
            } else {
                warn!(
                    "Schema [{}] and [{}] have the same hash {}, keeping [{}]",
                    schema.full_name(),
                    existing.full_name(),
                    id,
                    existing.full_name()
                );
            }
            continue;
        }
        seen.insert(id, unique.len());
        unique.push((id, schema));
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(namespace: &str, name: &str) -> String {
        format!(
            r#"{{"type": "record", "name": "{name}", "namespace": "{namespace}",
                "fields": [{{"name": "value", "type": "long"}}]}}"#
        )
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let schemas = AvscDirectorySource::new()
            .load(&dir.path().join("nope"))
            .unwrap();
        assert!(schemas.is_empty());
    }

    #[test]
    fn test_recursive_scan_skips_malformed_and_foreign_files() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("one.avsc"), record("x", "One")).unwrap();
        fs::write(dir.path().join("a/two.avsc"), record("x.a", "Two")).unwrap();
        fs::write(nested.join("three.avsc"), record("x.a.b.c", "Three")).unwrap();
        fs::write(dir.path().join("a/broken.avsc"), "{\"type\": \"record\"").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a schema").unwrap();

        let schemas = AvscDirectorySource::new().load(dir.path()).unwrap();
        let mut names: Vec<&str> = schemas.iter().map(Schema::full_name).collect();
        names.sort();
        assert_eq!(names, vec!["x.One", "x.a.Two", "x.a.b.c.Three"]);
    }

    #[test]
    fn test_dedupe_keeps_first_definition() {
        let hasher = RabinHasher::new();
        let first = Schema::parse_str(&record("x", "Dup")).unwrap();
        let second = Schema::parse_str(
            r#"{"type": "record", "name": "Dup", "namespace": "x",
                "fields": [{"name": "other", "type": "string"}]}"#,
        )
        .unwrap();
        let unique_schema = Schema::parse_str(&record("x", "Unique")).unwrap();

        let unique = dedupe_by_id(&hasher, vec![first.clone(), second, unique_schema]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].0, SchemaId::for_subject(&hasher, "x.Dup"));
        assert_eq!(unique[0].1, first);
        assert_eq!(unique[1].1.full_name(), "x.Unique");
    }
}
