//! # Persistence
//!
//! Writes whole document trees through a [`FileSystem`].
//!
//! Writes to one document are serialized behind a per-document async lock.
//! A request for a version older than the newest one requested (or already
//! written) is skipped, so the last committed batch wins even if writes
//! complete out of order. A failed write leaves the in-memory tree alone;
//! the caller reports it as "not saved".

use crate::config::EditorConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tandem_common::{CommonError, FileSystem};
use tandem_model::{
    deserialize_document, serialize_document, Deserialized, DocumentHeader, Node, Resolver,
    SerializeError,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Serialization failed: {0}")]
    Serialize(#[from] SerializeError),

    #[error("Storage error: {0}")]
    Storage(#[from] CommonError),

    #[error("Persistence task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written { version: u64 },

    /// A newer version was requested; this one was not written
    Superseded { version: u64, latest: u64 },
}

/// Everything needed to write one version of a document
#[derive(Debug, Clone)]
pub struct PersistRequest {
    pub document_id: String,
    pub path: PathBuf,
    pub version: u64,
    pub root: Arc<Node>,
}

#[derive(Default)]
struct DocumentSlot {
    latest_requested: AtomicU64,

    /// Last version written; held across the write
    written: tokio::sync::Mutex<Option<u64>>,
}

pub struct Persister {
    fs: Arc<dyn FileSystem>,
    pretty: bool,
    documents: Mutex<HashMap<String, Arc<DocumentSlot>>>,
}

impl Persister {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_config(fs, &EditorConfig::default())
    }

    pub fn with_config(fs: Arc<dyn FileSystem>, config: &EditorConfig) -> Self {
        Self {
            fs,
            pretty: config.pretty_print,
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, document_id: &str) -> Arc<DocumentSlot> {
        let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        documents.entry(document_id.to_string()).or_default().clone()
    }

    /// Newest version requested for a document
    pub fn latest_requested(&self, document_id: &str) -> Option<u64> {
        let documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        documents
            .get(document_id)
            .map(|slot| slot.latest_requested.load(Ordering::SeqCst))
    }

    #[instrument(skip_all, fields(document_id = %request.document_id, version = request.version))]
    pub async fn persist(&self, request: PersistRequest) -> Result<PersistOutcome, PersistenceError> {
        let slot = self.slot(&request.document_id);
        slot.latest_requested.fetch_max(request.version, Ordering::SeqCst);

        let bytes = serialize_document(&request.document_id, request.version, &request.root, self.pretty)?;

        let mut written = slot.written.lock().await;
        let last_written = *written;

        let latest = slot
            .latest_requested
            .load(Ordering::SeqCst)
            .max(last_written.unwrap_or(0));
        let already_covered = last_written.is_some_and(|w| request.version <= w);
        if request.version < latest || already_covered {
            debug!(latest, "Skipping superseded write");
            return Ok(PersistOutcome::Superseded {
                version: request.version,
                latest,
            });
        }

        let fs = self.fs.clone();
        let path = request.path.clone();
        let result = tokio::task::spawn_blocking(move || fs.write(&path, &bytes))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))?;

        if let Err(err) = result {
            warn!(path = %request.path.display(), error = %err, "Failed to write document");
            return Err(err.into());
        }

        *written = Some(request.version);
        info!(path = %request.path.display(), "Saved document");
        Ok(PersistOutcome::Written {
            version: request.version,
        })
    }

    /// Read and decode a persisted document
    pub async fn load(
        &self,
        path: &Path,
        resolver: Arc<dyn Resolver>,
    ) -> Result<(DocumentHeader, Deserialized), PersistenceError> {
        let fs = self.fs.clone();
        let read_path = path.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || fs.read(&read_path))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))??;

        let (header, deserialized) = deserialize_document(&bytes, resolver)?;

        // writes for older versions than what is on disk are stale
        let slot = self.slot(&header.document_id);
        slot.latest_requested.fetch_max(header.version, Ordering::SeqCst);

        Ok((header, deserialized))
    }
}
