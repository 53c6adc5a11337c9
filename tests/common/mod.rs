//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use schema_registry_client::{RegistryService, ServiceError, SubjectVersion};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Record schema with a single `long` field
pub fn record_json(namespace: &str, name: &str) -> String {
    format!(
        r#"{{"type": "record", "name": "{name}", "namespace": "{namespace}",
            "fields": [{{"name": "value", "type": "long"}}]}}"#
    )
}

/// Record schema carrying an event id in the default of its `_ID` field
pub fn event_json(namespace: &str, name: &str, event_id: i64) -> String {
    format!(
        r#"{{"type": "record", "name": "{name}", "namespace": "{namespace}",
            "fields": [{{"name": "_ID", "type": "long", "default": {event_id}}},
                       {{"name": "payload", "type": "string"}}]}}"#
    )
}

pub fn write_schema(dir: &Path, file: &str, json: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, json).unwrap();
}

/// Write `count` distinct record schemas named `Event0..EventN` in namespace
/// `ns` and return their full names.
pub fn write_records(dir: &Path, ns: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let name = format!("Event{}", i);
            write_schema(dir, &format!("{}.avsc", name), &record_json(ns, &name));
            format!("{}.{}", ns, name)
        })
        .collect()
}

#[derive(Default)]
struct Registry {
    subjects: BTreeMap<String, SubjectVersion>,
    ids: HashMap<i64, String>,
}

#[derive(Default)]
struct FakeState {
    registry: Mutex<Registry>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    register_delay: Mutex<Option<Duration>>,
    by_id_calls: AtomicUsize,
    latest_calls: AtomicUsize,
    register_calls: AtomicUsize,
    subjects_calls: AtomicUsize,
}

/// In-memory registry service. Clones share state, so a test can keep a
/// handle after moving one into a store.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Arc<FakeState>,
}

fn refused() -> ServiceError {
    ServiceError::Transport("connection refused".to_string())
}

fn status(status: u16, error_code: i32, message: &str) -> ServiceError {
    ServiceError::Status {
        status,
        error_code,
        message: message.to_string(),
    }
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `schema` under `subject` as-is, without parsing it.
    pub fn put(&self, subject: &str, schema: &str) -> i64 {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut registry = self.state.registry.lock();
        let version = registry.subjects.get(subject).map_or(1, |v| v.version + 1);
        registry.subjects.insert(
            subject.to_string(),
            SubjectVersion {
                subject: subject.to_string(),
                version,
                id,
                schema: schema.to_string(),
            },
        );
        registry.ids.insert(id, schema.to_string());
        id
    }

    pub fn set_available(&self, available: bool) {
        self.state.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Answer registrations for `subject` with a 422.
    pub fn reject(&self, subject: &str) {
        self.state.rejected.lock().insert(subject.to_string());
    }

    pub fn set_register_delay(&self, delay: Duration) {
        *self.state.register_delay.lock() = Some(delay);
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.state.registry.lock().subjects.contains_key(subject)
    }

    pub fn by_id_calls(&self) -> usize {
        self.state.by_id_calls.load(Ordering::SeqCst)
    }

    pub fn latest_calls(&self) -> usize {
        self.state.latest_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.state.register_calls.load(Ordering::SeqCst)
    }

    pub fn subjects_calls(&self) -> usize {
        self.state.subjects_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), ServiceError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            Err(refused())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RegistryService for FakeRegistry {
    async fn schema_by_id(&self, id: i64) -> Result<String, ServiceError> {
        self.state.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.state
            .registry
            .lock()
            .ids
            .get(&id)
            .cloned()
            .ok_or_else(|| status(404, 40403, "Schema not found"))
    }

    async fn latest_by_subject(&self, subject: &str) -> Result<SubjectVersion, ServiceError> {
        self.state.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.state
            .registry
            .lock()
            .subjects
            .get(subject)
            .cloned()
            .ok_or_else(|| status(404, 40401, "Subject not found"))
    }

    async fn register(&self, subject: &str, schema: &str) -> Result<i64, ServiceError> {
        self.state.register_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.register_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        if self.state.rejected.lock().contains(subject) {
            return Err(status(422, 42201, "Invalid schema"));
        }
        let existing = self
            .state
            .registry
            .lock()
            .subjects
            .get(subject)
            .filter(|latest| latest.schema == schema)
            .map(|latest| latest.id);
        Ok(existing.unwrap_or_else(|| self.put(subject, schema)))
    }

    async fn subjects(&self) -> Result<Vec<String>, ServiceError> {
        self.state.subjects_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.state.registry.lock().subjects.keys().cloned().collect())
    }
}
