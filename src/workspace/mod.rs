//! Workspace registry: which mail sources are connected and whether onboarding
//! has finished.
//!
//! The store is constructed once and handed to whoever needs it. Reads return
//! owned copies; writes go through [`WorkspaceStore::update`] or
//! [`WorkspaceStore::save`], are persisted before they become visible, and
//! then notify subscribers.

pub mod backend;
pub mod model;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use backend::{FileBackend, MemoryBackend, MetaBackend};
pub use model::{AppMeta, AppSource, SourceCommit, DEFAULT_SOURCE_KIND};

use crate::config::Config;
use crate::lock;

/// Versioned key the registry document is stored under
pub const APP_META_KEY: &str = "maillens.appMeta.v1";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize app meta: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

type Listener = Arc<dyn Fn(&AppMeta) + Send + Sync>;

/// Handle returned by [`WorkspaceStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct StoreInner {
    backend: Box<dyn MetaBackend>,
    key: String,
    /// `None` until the first access hydrates it
    cache: Mutex<Option<AppMeta>>,
    /// Serializes read-modify-write cycles
    writer: Mutex<()>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

/// Shared handle to the workspace registry
#[derive(Clone)]
pub struct WorkspaceStore {
    inner: Arc<StoreInner>,
}

impl WorkspaceStore {
    pub fn new(backend: impl MetaBackend + 'static) -> Self {
        Self::with_key(backend, APP_META_KEY)
    }

    pub fn with_key(backend: impl MetaBackend + 'static, key: &str) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: Box::new(backend),
                key: key.to_string(),
                cache: Mutex::new(None),
                writer: Mutex::new(()),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Store persisted under the configured state directory
    pub fn open(config: &Config) -> Self {
        Self::new(FileBackend::new(config.state_path()))
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Current metadata (an independent copy)
    pub fn load(&self) -> AppMeta {
        let mut cache = lock(&self.inner.cache);
        cache.get_or_insert_with(|| self.hydrate()).clone()
    }

    /// Replace the metadata wholesale
    pub fn save(&self, next: AppMeta) -> Result<(), StoreError> {
        let snapshot = {
            let _writer = lock(&self.inner.writer);
            self.persist(next)?
        };
        self.notify(&snapshot);
        Ok(())
    }

    /// Apply `apply` to a copy of the current metadata and save the result.
    ///
    /// Concurrent updates are serialized. `apply` must not call back into the
    /// store; subscribers may.
    pub fn update<R>(&self, apply: impl FnOnce(&mut AppMeta) -> R) -> Result<R, StoreError> {
        let (result, snapshot) = {
            let _writer = lock(&self.inner.writer);
            let mut draft = self.load();
            let result = apply(&mut draft);
            (result, self.persist(draft)?)
        };
        self.notify(&snapshot);
        Ok(result)
    }

    /// Register an observer called after every successful save
    pub fn subscribe(&self, listener: impl Fn(&AppMeta) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Whether any wizard run has ever been finished
    pub fn onboarding_complete(&self) -> bool {
        self.load().first_run_complete
    }

    pub fn active_source(&self) -> Option<AppSource> {
        self.load().active().cloned()
    }

    pub fn sources(&self) -> Vec<AppSource> {
        self.load().sources
    }

    /// Record a finished ingest: upsert by path and make it the active source
    pub fn commit_source(&self, commit: &SourceCommit) -> Result<AppSource, StoreError> {
        let source = self.update(|meta| {
            let id = meta.upsert_source(commit);
            meta.source_by_id(&id).cloned()
        })?;
        let source = source.ok_or_else(|| StoreError::UnknownSource(commit.path.clone()))?;
        info!(id = %source.id, path = %source.path, total = source.total_emails, "Committed source");
        Ok(source)
    }

    pub fn set_active_source(&self, id: &str) -> Result<(), StoreError> {
        let found = self.update(|meta| meta.set_active(id))?;
        if found {
            Ok(())
        } else {
            Err(StoreError::UnknownSource(id.to_string()))
        }
    }

    /// Read the persisted document, falling back to defaults on any problem
    fn hydrate(&self) -> AppMeta {
        match self.inner.backend.read(&self.inner.key) {
            Ok(Some(raw)) => AppMeta::from_persisted(&raw).unwrap_or_default(),
            Ok(None) => {
                debug!("No persisted app meta, starting fresh");
                AppMeta::default()
            }
            Err(e) => {
                warn!("Failed to read persisted app meta: {}", e);
                AppMeta::default()
            }
        }
    }

    /// Write `next` to the backend and, only if that worked, make it current
    fn persist(&self, next: AppMeta) -> Result<AppMeta, StoreError> {
        let contents = serde_json::to_string(&next)?;
        self.inner.backend.write(&self.inner.key, &contents)?;
        *lock(&self.inner.cache) = Some(next.clone());
        Ok(next)
    }

    fn notify(&self, snapshot: &AppMeta) {
        // Clone the list so listeners can subscribe or update without deadlocking
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}
