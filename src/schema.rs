//! Schema types and structures

use std::fmt;

use apache_avro::Schema as AvroSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::fingerprint::RabinHasher;

/// Identifier of a registered schema.
///
/// For locally stored schemas this is the Rabin fingerprint of the schema's
/// fully-qualified name: stable across processes and machines, but only
/// probabilistically unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(i64);

impl SchemaId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Derive the id for a subject (fully-qualified schema name).
    pub fn for_subject(hasher: &RabinHasher, subject: &str) -> Self {
        Self(hasher.hash_str(subject))
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SchemaId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<SchemaId> for i64 {
    fn from(id: SchemaId) -> Self {
        id.0
    }
}

/// A named Avro schema (record, enum or fixed).
///
/// Immutable once parsed. Equality is structural: two schemas are equal when
/// their Avro canonical forms are and every record field declares the same
/// default. Docs and aliases are ignored.
#[derive(Debug, Clone)]
pub struct Schema {
    definition: AvroSchema,
    full_name: String,
    /// `(record, field, default)` for every defaulted field, nested records included
    defaults: Vec<(String, String, serde_json::Value)>,
}

impl Schema {
    /// Parse a schema from its JSON definition.
    pub fn parse_str(json: &str) -> Result<Self> {
        Self::from_avro(AvroSchema::parse_str(json)?)
    }

    /// Wrap an already parsed Avro schema. Only named types carry the
    /// fully-qualified name a schema is registered under.
    pub fn from_avro(definition: AvroSchema) -> Result<Self> {
        let full_name = definition
            .name()
            .map(|name| name.fullname(None))
            .ok_or_else(|| {
                SchemaError::InvalidFormat(format!(
                    "expected a named schema (record, enum or fixed), got {}",
                    definition.canonical_form()
                ))
            })?;
        let mut defaults = Vec::new();
        collect_defaults(&serde_json::to_value(&definition)?, &mut defaults);
        Ok(Self {
            definition,
            full_name,
            defaults,
        })
    }

    /// Namespace-qualified name, e.g. `com.example.events.SessionStarted`.
    /// This is the subject the schema is registered under.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(self.full_name.as_str(), |(_, name)| name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.full_name.rsplit_once('.').map(|(namespace, _)| namespace)
    }

    /// Field names in declaration order; empty for enums and fixed types.
    pub fn fields(&self) -> Vec<&str> {
        match &self.definition {
            AvroSchema::Record(record) => record.fields.iter().map(|f| f.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Default value declared for `field`, if the field exists and has one.
    pub fn field_default(&self, field: &str) -> Option<&serde_json::Value> {
        match &self.definition {
            AvroSchema::Record(record) => record
                .fields
                .iter()
                .find(|f| f.name == field)
                .and_then(|f| f.default.as_ref()),
            _ => None,
        }
    }

    /// Avro parsing canonical form.
    pub fn canonical_form(&self) -> String {
        self.definition.canonical_form()
    }

    /// Full JSON definition, including docs and defaults.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.definition)?)
    }

    pub fn as_avro(&self) -> &AvroSchema {
        &self.definition
    }
}

/// Canonical form drops field defaults, so they are gathered from the full
/// JSON definition.
fn collect_defaults(value: &serde_json::Value, out: &mut Vec<(String, String, serde_json::Value)>) {
    match value {
        serde_json::Value::Object(object) => {
            if let Some(serde_json::Value::Array(fields)) = object.get("fields") {
                let record = object
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                for field in fields {
                    let name = field.get("name").and_then(serde_json::Value::as_str);
                    if let (Some(name), Some(default)) = (name, field.get("default")) {
                        out.push((record.to_string(), name.to_string(), default.clone()));
                    }
                }
            }
            for nested in object.values() {
                collect_defaults(nested, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_defaults(item, out);
            }
        }
        _ => {}
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
            && self.defaults == other.defaults
            && self.definition == other.definition
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.definition) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str(&self.canonical_form()),
        }
    }
}

/// A schema together with the id it is registered under
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSchema {
    pub id: SchemaId,
    pub schema: Schema,
}

impl RegisteredSchema {
    pub fn new(id: SchemaId, schema: Schema) -> Self {
        Self { id, schema }
    }

    /// Subject the schema is registered under
    pub fn subject(&self) -> &str {
        self.schema.full_name()
    }
}

impl fmt::Display for RegisteredSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"schemaId\":{},\"schema\":{}}}", self.id, self.schema)
    }
}
