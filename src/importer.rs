//! Batch schema import
//!
//! Loads every schema from a [`SchemaSource`] and registers each one with a
//! [`SchemaStore`], all under a single deadline.
//!
//! ```text
//! Idle ──► Loading ──► Registering ──► Completed
//!             │  │           │
//!             │  │           ├──────► Failed     (registered count != loaded count)
//!             │  │           └──────► TimedOut   (deadline elapsed)
//!             │  └─ check-only ─────► Completed
//!             └─────────────────────► Failed     (source error)
//! ```
//!
//! Registrations run one at a time. A failed registration is recorded and the
//! batch carries on; the batch as a whole fails when fewer schemas were
//! registered than were loaded. The deadline covers loading and registering
//! together: when it elapses the caller gets [`SchemaError::Timeout`]
//! immediately and the worker is cancelled, stopping before its next
//! registration. A zero timeout leaves no time to load, so it always times out.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ImportConfig, DEFAULT_CACHE_MAX_SIZE, DEFAULT_IMPORT_TIMEOUT_SECS};
use crate::error::{require_non_empty, Result, SchemaError};
use crate::fingerprint::RabinHasher;
use crate::schema::{RegisteredSchema, Schema};
use crate::source::{dedupe_by_id, AvscDirectorySource, SchemaSource};
use crate::store::{is_rest_endpoint, RemoteRegistryStore, SchemaStore};

/// Deadline used when the configured timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Where a batch import is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportState {
    Idle,
    Loading,
    Registering,
    Completed,
    Failed,
    TimedOut,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Completed | ImportState::Failed | ImportState::TimedOut
        )
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportState::Idle => "idle",
            ImportState::Loading => "loading",
            ImportState::Registering => "registering",
            ImportState::Completed => "completed",
            ImportState::Failed => "failed",
            ImportState::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// What to import and how long it may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Location handed to the schema source
    pub location: PathBuf,
    /// Load and count only; never register
    pub check_only: bool,
    /// Deadline for loading and registering together
    pub timeout: Duration,
}

impl ImportOptions {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            check_only: false,
            timeout: Duration::from_secs(DEFAULT_IMPORT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(location: impl Into<PathBuf>, config: &ImportConfig) -> Self {
        Self {
            location: location.into(),
            check_only: config.check_only,
            timeout: config.timeout(),
        }
    }

    pub fn with_check_only(mut self, check_only: bool) -> Self {
        self.check_only = check_only;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct Progress {
    /// Bumped by every `import` call so a cancelled worker from an earlier
    /// run cannot overwrite the state of a later one.
    run: u64,
    state: ImportState,
    loaded: Vec<Schema>,
}

/// Write access to the progress of one particular run
#[derive(Clone)]
struct RunHandle {
    progress: Arc<Mutex<Progress>>,
    run: u64,
}

impl RunHandle {
    fn advance(&self, next: ImportState) {
        let mut progress = self.progress.lock();
        if progress.run != self.run || progress.state.is_terminal() {
            return;
        }
        debug!("Batch import {} -> {}", progress.state, next);
        progress.state = next;
    }

    fn record_loaded(&self, schemas: &[Schema]) {
        let mut progress = self.progress.lock();
        if progress.run == self.run {
            progress.loaded = schemas.to_vec();
        }
    }
}

/// Registers every schema found at a location, under a deadline
pub struct BatchImporter {
    store: Arc<dyn SchemaStore>,
    source: Arc<dyn SchemaSource>,
    options: ImportOptions,
    hasher: RabinHasher,
    progress: Arc<Mutex<Progress>>,
}

impl BatchImporter {
    pub fn new(
        store: Arc<dyn SchemaStore>,
        source: Arc<dyn SchemaSource>,
        options: ImportOptions,
    ) -> Self {
        Self {
            store,
            source,
            options,
            hasher: RabinHasher::new(),
            progress: Arc::new(Mutex::new(Progress {
                run: 0,
                state: ImportState::Idle,
                loaded: Vec::new(),
            })),
        }
    }

    /// Import the `*.avsc` files under `location` into the registry at
    /// `registry_url`.
    pub fn for_registry(
        location: impl Into<PathBuf>,
        registry_url: &str,
        check_only: bool,
        timeout_secs: u64,
    ) -> Result<Self> {
        let location = location.into();
        if location.as_os_str().is_empty() {
            return Err(SchemaError::InvalidArgument(
                "Argument 'location' cannot be empty".to_string(),
            ));
        }
        require_non_empty("registry", registry_url)?;
        if !is_rest_endpoint(registry_url) {
            return Err(SchemaError::InvalidArgument(format!(
                "registry endpoint must start with http:// or https://, got {}",
                registry_url
            )));
        }

        let store = RemoteRegistryStore::connect(registry_url, DEFAULT_CACHE_MAX_SIZE)?;
        let options = ImportOptions::new(location)
            .with_check_only(check_only)
            .with_timeout(Duration::from_secs(timeout_secs));
        Ok(Self::new(
            Arc::new(store),
            Arc::new(AvscDirectorySource::new()),
            options,
        ))
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// State of the most recent run
    pub fn state(&self) -> ImportState {
        self.progress.lock().state
    }

    /// Schemas loaded by the most recent run, after deduplication
    pub fn loaded(&self) -> Vec<Schema> {
        self.progress.lock().loaded.clone()
    }

    /// Run the import.
    ///
    /// Returns the registered schemas (empty in check-only mode). Fails with
    /// [`SchemaError::BatchRegistration`] when some registrations failed and
    /// with [`SchemaError::Timeout`] when the deadline elapsed first.
    pub async fn import(&self) -> Result<Vec<RegisteredSchema>> {
        let timeout = self.options.timeout;
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        let cancel = CancellationToken::new();

        let handle = {
            let mut progress = self.progress.lock();
            progress.run += 1;
            progress.state = ImportState::Idle;
            progress.loaded.clear();
            RunHandle {
                progress: Arc::clone(&self.progress),
                run: progress.run,
            }
        };

        info!(
            "Starting batch import [location={}, check_only={}, timeout={:?}]",
            self.options.location.display(),
            self.options.check_only,
            timeout
        );

        let worker = ImportWorker {
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            location: self.options.location.clone(),
            check_only: self.options.check_only,
            hasher: self.hasher.clone(),
            handle: handle.clone(),
            cancel: cancel.child_token(),
            deadline,
            timeout,
        };
        let task = tokio::spawn(worker.run());

        match timeout_at(deadline, task).await {
            Ok(Ok(result)) => {
                if result.is_ok() {
                    info!("Finished batch import");
                }
                result
            }
            Ok(Err(join_error)) => {
                handle.advance(ImportState::Failed);
                Err(SchemaError::Importer(join_error.to_string()))
            }
            Err(_) => {
                cancel.cancel();
                handle.advance(ImportState::TimedOut);
                error!(
                    "Timeout ({:?}) occurred while importing schemas; execution will be terminated",
                    timeout
                );
                Err(SchemaError::Timeout { timeout })
            }
        }
    }
}

impl fmt::Debug for BatchImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchImporter")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

/// The load-and-register unit of work, run on its own task
struct ImportWorker {
    store: Arc<dyn SchemaStore>,
    source: Arc<dyn SchemaSource>,
    location: PathBuf,
    check_only: bool,
    hasher: RabinHasher,
    handle: RunHandle,
    cancel: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl ImportWorker {
    async fn run(self) -> Result<Vec<RegisteredSchema>> {
        self.handle.advance(ImportState::Loading);
        let schemas = match self.load().await {
            Ok(schemas) => schemas,
            Err(e) => {
                error!("Failed to load schemas from {}: {}", self.location.display(), e);
                self.handle.advance(ImportState::Failed);
                return Err(e);
            }
        };
        let expected = schemas.len();
        info!("Number of schemas loaded from {}: {}", self.location.display(), expected);
        self.handle.record_loaded(&schemas);
        if self.cancel.is_cancelled() {
            self.handle.advance(ImportState::TimedOut);
            return Err(SchemaError::Timeout {
                timeout: self.timeout,
            });
        }

        if self.check_only {
            info!("Check-only mode, skipping registration");
            self.handle.advance(ImportState::Completed);
            return Ok(Vec::new());
        }

        self.handle.advance(ImportState::Registering);
        info!("Starting to import schemas into schema registry...");
        let mut registered = Vec::with_capacity(expected);
        let mut failed = Vec::new();

        for schema in schemas {
            if self.cancel.is_cancelled() || Instant::now() >= self.deadline {
                warn!(
                    "Batch import cancelled after {} of {} schemas",
                    registered.len() + failed.len(),
                    expected
                );
                self.handle.advance(ImportState::TimedOut);
                return Err(SchemaError::Timeout {
                    timeout: self.timeout,
                });
            }

            debug!("Importing {} schema into schema registry", schema.full_name());
            match self.store.register(&schema).await {
                Ok(id) => {
                    let imported = RegisteredSchema::new(id, schema);
                    debug!("Successfully imported schema: {}", imported);
                    registered.push(imported);
                }
                Err(e) => {
                    error!("Failed to register schema {}: {}", schema.full_name(), e);
                    failed.push(schema.full_name().to_string());
                }
            }
        }
        info!("Finished importing schemas into schema registry");
        info!("Number of schemas loaded into schema registry: {}", registered.len());

        if registered.len() != expected {
            error!(
                "Not all schemas were loaded into schema registry. Expected: {}, Was: {}",
                expected,
                registered.len()
            );
            error!(
                "Summary of failure, unable to register the following schemas:\n{}",
                failed.join("\n")
            );
            self.handle.advance(ImportState::Failed);
            return Err(SchemaError::BatchRegistration {
                expected,
                actual: registered.len(),
                failed,
            });
        }

        self.handle.advance(ImportState::Completed);
        Ok(registered)
    }

    /// Load on the blocking pool, then drop fingerprint duplicates.
    async fn load(&self) -> Result<Vec<Schema>> {
        let source = Arc::clone(&self.source);
        let location = self.location.clone();
        let schemas = tokio::task::spawn_blocking(move || source.load(&location))
            .await
            .map_err(|e| SchemaError::Importer(e.to_string()))??;
        Ok(dedupe_by_id(&self.hasher, schemas)
            .into_iter()
            .map(|(_, schema)| schema)
            .collect())
    }
}
