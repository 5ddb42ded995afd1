//! Autosave persistence
//!
//! A `WorkflowStorage` holds at most one serialized workflow. The
//! `Autosaver` watches the graph store, waits until edits have been quiet
//! for the configured interval and then writes the document out.
//!
//! Running out of quota never touches the document: autosave switches
//! itself off, tells the user, and stays off until `enable()` is called.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::constants::autosave;
use crate::error::Result;
use crate::events::{DomainEvent, NoticeLevel};
use crate::exchange::parse_document;
use crate::store::{GraphStore, SubscriptionId};
use crate::types::{EditorState, Timestamp};

/// Zstd frame magic, used to recognise compressed saves
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

const ZSTD_LEVEL: i32 = 3;

/// Errors from a persistence backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Storage quota exceeded: {size} bytes (limit {quota})")]
    QuotaExceeded { size: usize, quota: usize },
}

/// What a backend currently holds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub has_data: bool,
    /// Stored size in bytes (after compression)
    pub size: usize,
    pub last_saved: Option<Timestamp>,
}

impl StorageInfo {
    pub fn size_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }
}

/// A single-slot store for the serialized workflow
pub trait WorkflowStorage: Send + Sync {
    /// Replace the stored document. Returns the stored size in bytes.
    fn save(&self, json: &str) -> std::result::Result<usize, StorageError>;

    /// The stored document, if any
    fn load(&self) -> std::result::Result<Option<String>, StorageError>;

    /// Drop the stored document. Returns false if there was nothing to drop.
    fn clear(&self) -> std::result::Result<bool, StorageError>;

    fn info(&self) -> StorageInfo;
}

fn check_quota(size: usize, quota: Option<usize>) -> std::result::Result<(), StorageError> {
    match quota {
        Some(quota) if size > quota => Err(StorageError::QuotaExceeded { size, quota }),
        _ => Ok(()),
    }
}

// =============================================================================
// File backend
// =============================================================================

/// Stores the workflow as a single file, optionally zstd-compressed
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    compress: bool,
    quota: Option<usize>,
    last_saved: Mutex<Option<Timestamp>>,
}

impl FileStorage {
    /// Storage at `dir/autosave.json`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::at(dir.as_ref().join(autosave::FILE_NAME))
    }

    /// Storage at an explicit file path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compress: false,
            quota: None,
            last_saved: Mutex::new(None),
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkflowStorage for FileStorage {
    fn save(&self, json: &str) -> std::result::Result<usize, StorageError> {
        let bytes = if self.compress {
            zstd::encode_all(json.as_bytes(), ZSTD_LEVEL)
                .map_err(|e| StorageError::Compression(e.to_string()))?
        } else {
            json.as_bytes().to_vec()
        };
        check_quota(bytes.len(), self.quota)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated save
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, &bytes)?;
        std::fs::rename(&staging, &self.path)?;

        *self.last_saved.lock() = Some(Utc::now());
        log::debug!("Saved {} bytes to {:?}", bytes.len(), self.path);
        Ok(bytes.len())
    }

    fn load(&self) -> std::result::Result<Option<String>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        let bytes = if bytes.starts_with(&ZSTD_MAGIC) {
            zstd::decode_all(&bytes[..]).map_err(|e| StorageError::Compression(e.to_string()))?
        } else {
            bytes
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StorageError::Compression(e.to_string()))
    }

    fn clear(&self) -> std::result::Result<bool, StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn info(&self) -> StorageInfo {
        let size = std::fs::metadata(&self.path)
            .map(|m| m.len() as usize)
            .ok();
        StorageInfo {
            has_data: size.is_some(),
            size: size.unwrap_or(0),
            last_saved: *self.last_saved.lock(),
        }
    }
}

// =============================================================================
// Memory backend
// =============================================================================

/// In-process storage, used by tests and headless sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<Option<String>>,
    quota: Option<usize>,
    last_saved: Mutex<Option<Timestamp>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }
}

impl WorkflowStorage for MemoryStorage {
    fn save(&self, json: &str) -> std::result::Result<usize, StorageError> {
        check_quota(json.len(), self.quota)?;
        *self.data.lock() = Some(json.to_string());
        *self.last_saved.lock() = Some(Utc::now());
        Ok(json.len())
    }

    fn load(&self) -> std::result::Result<Option<String>, StorageError> {
        Ok(self.data.lock().clone())
    }

    fn clear(&self) -> std::result::Result<bool, StorageError> {
        Ok(self.data.lock().take().is_some())
    }

    fn info(&self) -> StorageInfo {
        let size = self.data.lock().as_ref().map(String::len);
        StorageInfo {
            has_data: size.is_some(),
            size: size.unwrap_or(0),
            last_saved: *self.last_saved.lock(),
        }
    }
}

// =============================================================================
// Autosaver
// =============================================================================

/// Debounced background persistence of the current workflow
pub struct Autosaver {
    store: Arc<GraphStore>,
    storage: Arc<dyn WorkflowStorage>,
    interval: Duration,
    /// Time of the first change not yet saved
    pending_since: Mutex<Option<Instant>>,
    /// Time of the latest change; the debounce runs from here
    last_change: Mutex<Option<Instant>>,
    enabled: AtomicBool,
    running: Arc<AtomicBool>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Autosaver {
    pub fn new(store: Arc<GraphStore>, storage: Arc<dyn WorkflowStorage>) -> Self {
        Self::with_interval(store, storage, Duration::from_millis(autosave::INTERVAL_MS))
    }

    pub fn with_interval(
        store: Arc<GraphStore>,
        storage: Arc<dyn WorkflowStorage>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            interval,
            pending_since: Mutex::new(None),
            last_change: Mutex::new(None),
            enabled: AtomicBool::new(true),
            running: Arc::new(AtomicBool::new(false)),
            subscription: Mutex::new(None),
        }
    }

    /// Start watching the store for changes
    pub fn attach(self: &Arc<Self>) -> SubscriptionId {
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = self.store.subscribe(move |_| {
            if let Some(saver) = weak.upgrade() {
                saver.mark_dirty(Instant::now());
            }
        });
        if let Some(previous) = self.subscription.lock().replace(id) {
            self.store.unsubscribe(previous);
        }
        id
    }

    /// Stop watching the store and stop the ticker
    pub fn detach(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.store.unsubscribe(id);
        }
        self.stop();
    }

    fn mark_dirty(&self, now: Instant) {
        self.pending_since.lock().get_or_insert(now);
        *self.last_change.lock() = Some(now);
    }

    pub fn storage(&self) -> &Arc<dyn WorkflowStorage> {
        &self.storage
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn autosave back on, e.g. after a quota failure
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            log::info!("Autosave enabled");
        }
    }

    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            log::info!("Autosave disabled");
        }
    }

    /// True when a change has happened since the last save
    pub fn has_pending(&self) -> bool {
        self.pending_since.lock().is_some()
    }

    /// Save if enabled, dirty and quiet for at least the interval
    ///
    /// Returns true when a save happened.
    pub fn flush_if_due(&self, now: Instant) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let due = match *self.last_change.lock() {
            Some(changed) => now.saturating_duration_since(changed) >= self.interval,
            None => false,
        };
        if !due {
            return Ok(false);
        }
        self.save_now()?;
        Ok(true)
    }

    /// Write the current workflow immediately
    pub fn save_now(&self) -> Result<Timestamp> {
        let workflow = self.store.get_workflow();
        let json = serde_json::to_string(&workflow)?;

        match self.storage.save(&json) {
            Ok(size) => {
                let saved_at = Utc::now();
                *self.pending_since.lock() = None;
                *self.last_change.lock() = None;
                log::debug!("Autosaved workflow {} ({} bytes)", workflow.id, size);
                self.store
                    .bus()
                    .emit(&DomainEvent::WorkflowSaved { saved_at });
                Ok(saved_at)
            }
            Err(err @ StorageError::QuotaExceeded { .. }) => {
                log::warn!("Autosave disabled: {}", err);
                self.enabled.store(false, Ordering::SeqCst);
                self.store.bus().emit(&DomainEvent::notice(
                    NoticeLevel::Warning,
                    "Storage quota exceeded. Please export your workflow.",
                ));
                Err(err.into())
            }
            Err(err) => {
                log::error!("Autosave failed: {}", err);
                Err(err.into())
            }
        }
    }

    /// Load the saved workflow into the store
    ///
    /// Returns false when nothing was saved. A saved document that fails
    /// validation is reported as an error and the store is left alone.
    pub fn restore(&self) -> Result<bool> {
        let Some(text) = self.storage.load()? else {
            return Ok(false);
        };
        let workflow = match parse_document(&text) {
            Ok(workflow) => workflow,
            Err(err) => {
                log::error!("Invalid saved workflow: {}", err);
                return Err(err);
            }
        };

        let mut ui = self.store.get_ui_state();
        ui.selected_nodes.clear();
        ui.selected_connections.clear();
        let workflow_id = workflow.id.clone();
        self.store.set_state(EditorState { workflow, ui });

        // Restoring is not an edit
        *self.pending_since.lock() = None;
        *self.last_change.lock() = None;

        log::info!("Restored workflow {}", workflow_id);
        let bus = self.store.bus();
        bus.emit(&DomainEvent::WorkflowLoaded { workflow_id });
        bus.emit(&DomainEvent::notice(
            NoticeLevel::Info,
            "Previous workflow restored",
        ));
        Ok(true)
    }

    /// Drop the saved workflow
    pub fn clear(&self) -> Result<bool> {
        Ok(self.storage.clear()?)
    }

    pub fn info(&self) -> StorageInfo {
        self.storage.info()
    }

    /// Run `flush_if_due` every `tick` on the tokio runtime
    ///
    /// Must be called from within a runtime. The task ends after `stop()`
    /// or once the autosaver is dropped.
    pub fn spawn(self: &Arc<Self>, tick: Duration) -> Option<tokio::task::JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("Autosave ticker already running");
            return None;
        }
        let weak = Arc::downgrade(self);
        let running = Arc::clone(&self.running);
        log::info!("Starting autosave ticker every {}ms", tick.as_millis());

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                let Some(saver) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = saver.flush_if_due(Instant::now()) {
                    log::warn!("Autosave tick failed: {}", e);
                }
            }
            log::debug!("Autosave ticker stopped");
        }))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
