//! Registry-service-backed schema store

use async_trait::async_trait;
use tracing::{debug, info};

use super::{is_rest_endpoint, SchemaStore, SubjectCache};
use crate::error::{require_non_empty, Result, SchemaError};
use crate::schema::{RegisteredSchema, Schema, SchemaId};
use crate::service::{HttpRegistryService, RegistryService, ServiceError};

/// Record field whose default value carries a schema's event id
pub const EVENT_ID_FIELD: &str = "_ID";

const INVALID_REST_ENDPOINT_MESSAGE: &str = "registry endpoint must start with http:// or https://";
const SCHEMA_RETRIEVAL_MESSAGE: &str = "Failed to retrieve schemas";

/// Store that delegates to a registry service.
///
/// Subject lookups go through a bounded read-through cache that is filled on
/// misses only and never invalidated, so a subject's cached "latest" version
/// can go stale. Id lookups and registrations always reach the service.
#[derive(Debug)]
pub struct RemoteRegistryStore<S = HttpRegistryService> {
    service: S,
    cache: SubjectCache,
}

impl RemoteRegistryStore<HttpRegistryService> {
    /// Store over the HTTP registry at `address`, caching up to `cache_size`
    /// subjects.
    pub fn connect(address: &str, cache_size: usize) -> Result<Self> {
        if !is_rest_endpoint(address) {
            return Err(SchemaError::InvalidArgument(INVALID_REST_ENDPOINT_MESSAGE.to_string()));
        }
        let service = HttpRegistryService::new(address.trim())
            .map_err(|e| SchemaError::InvalidArgument(e.to_string()))?;
        Ok(Self::new(service, cache_size))
    }
}

impl<S: RegistryService> RemoteRegistryStore<S> {
    pub fn new(service: S, cache_size: usize) -> Self {
        Self {
            service,
            cache: SubjectCache::new(cache_size),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn cache(&self) -> &SubjectCache {
        &self.cache
    }

    /// Subjects currently held in the cache, most recently used first.
    pub fn cached_subjects(&self) -> Vec<String> {
        self.cache.subjects()
    }

    /// Drop the cached entry for `subject` so the next lookup reaches the service.
    pub fn evict(&self, subject: &str) -> bool {
        self.cache.remove(subject)
    }

    /// Every subject in the registry, resolved to its latest schema.
    pub async fn all_schemas(&self) -> Result<Vec<RegisteredSchema>> {
        self.schemas_where(|_| true).await
    }

    /// Latest schemas that declare `field` with a default value accepted by
    /// `predicate`.
    pub async fn schemas_matching_default<F>(
        &self,
        field: &str,
        predicate: F,
    ) -> Result<Vec<RegisteredSchema>>
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync,
    {
        self.schemas_where(|registered| {
            registered
                .schema
                .field_default(field)
                .map_or(false, |default| predicate(default))
        })
        .await
    }

    /// Latest schemas whose event id field defaults to one of `event_ids`.
    pub async fn schemas_by_event_ids(&self, event_ids: &[i64]) -> Result<Vec<RegisteredSchema>> {
        self.schemas_matching_default(EVENT_ID_FIELD, |default| {
            default.as_i64().map_or(false, |id| event_ids.contains(&id))
        })
        .await
    }

    async fn schemas_where<F>(&self, keep: F) -> Result<Vec<RegisteredSchema>>
    where
        F: Fn(&RegisteredSchema) -> bool + Send + Sync,
    {
        let subjects = self
            .service
            .subjects()
            .await
            .map_err(|e| SchemaError::retrieval(SCHEMA_RETRIEVAL_MESSAGE, e))?;

        let mut schemas = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let registered = self.lookup_by_subject(&subject).await?;
            if keep(&registered) {
                schemas.push(registered);
            }
        }
        Ok(schemas)
    }

    async fn fetch_latest(&self, subject: &str) -> Result<RegisteredSchema> {
        info!("Loading schema from registry with subject: {}", subject);
        let latest = self.service.latest_by_subject(subject).await.map_err(|e| {
            SchemaError::retrieval(format!("Failed to retrieve schema for subject {}", subject), e)
        })?;
        let schema = parse_response(&latest.schema, || format!("subject {}", subject))?;
        Ok(RegisteredSchema::new(SchemaId::new(latest.id), schema))
    }
}

/// Parse schema text returned by the registry. An unusable answer counts as
/// the backend being unavailable.
fn parse_response(text: &str, what: impl FnOnce() -> String) -> Result<Schema> {
    Schema::parse_str(text).map_err(|e| {
        SchemaError::unavailable(
            format!("Registry returned an unparseable schema for {}", what()),
            Some(ServiceError::Decode(e.to_string())),
        )
    })
}

#[async_trait]
impl<S: RegistryService> SchemaStore for RemoteRegistryStore<S> {
    async fn lookup_by_id(&self, id: SchemaId) -> Result<Schema> {
        let text = self.service.schema_by_id(id.value()).await.map_err(|e| {
            SchemaError::retrieval(format!("Could not retrieve schema with schema id: {}", id), e)
        })?;
        parse_response(&text, || format!("schema id {}", id))
    }

    async fn lookup_by_subject(&self, subject: &str) -> Result<RegisteredSchema> {
        require_non_empty("subject", subject)?;
        if let Some(cached) = self.cache.get(subject) {
            debug!("Subject cache hit for {}", subject);
            return Ok(cached);
        }
        let registered = self.fetch_latest(subject).await?;
        self.cache.insert(subject, registered.clone());
        Ok(registered)
    }

    async fn register(&self, schema: &Schema) -> Result<SchemaId> {
        let failure = |source: Option<ServiceError>| SchemaError::Registration {
            message: format!(
                "Could not register schema {} under subject {}",
                schema.name(),
                schema.full_name()
            ),
            source,
        };
        let json = schema.to_json().map_err(|_| failure(None))?;
        let id = self
            .service
            .register(schema.full_name(), &json)
            .await
            .map_err(|e| failure(Some(e)))?;
        debug!("Registered schema {} under id {}", schema.full_name(), id);
        Ok(SchemaId::new(id))
    }
}
