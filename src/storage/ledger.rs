//! Durable upload ledger.
//!
//! A single JSON document mapping segment filename to uploaded state, loaded
//! once at startup and rewritten synchronously on every mark. A missing or
//! unparsable document is an empty ledger, never an error: the worst outcome
//! is a redundant re-upload, which the collector tolerates (delivery is
//! at-least-once).

use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Ledger handle shared between the capture thread (eviction) and the upload
/// worker.
pub type SharedLedger = Arc<Mutex<UploadLedger>>;

pub struct UploadLedger {
    path: PathBuf,
    entries: HashMap<String, bool>,
}

impl UploadLedger {
    /// Loads the ledger document, or starts empty when absent or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("upload ledger at {} is unparsable ({}), starting empty", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    pub fn is_uploaded(&self, name: &str) -> bool {
        self.entries.get(name).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks a segment uploaded and persists the document before returning.
    ///
    /// Callers must only delete the local file after this succeeds; that
    /// ordering is what makes a crash between the two steps safe.
    pub fn mark_uploaded(&mut self, name: &str) -> Result<()> {
        self.entries.insert(name.to_string(), true);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string(&self.entries).map_err(|e| {
            crate::error::RemrecError::Other(format!("ledger serialization failed: {}", e))
        })?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
