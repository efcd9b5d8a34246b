//! Storage budget enforcement.
//!
//! Invoked after every segment rotation. When the capture directory exceeds
//! the budget, already-uploaded segment files are deleted (in filesystem
//! enumeration order) until usage drops below `max_bytes - min_free_reserve`.
//! The hysteresis band keeps the very next rotation from re-triggering a
//! scan. Un-uploaded files and the open segment are never touched: if uploads
//! stall long enough, the directory fills and new segments simply fail to
//! open until space frees.

use crate::defaults::SEGMENT_EXT;
use crate::segment::writer::OpenSegmentRegister;
use crate::storage::ledger::SharedLedger;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct StorageManager {
    dir: PathBuf,
    max_bytes: u64,
    min_free_reserve: u64,
}

impl StorageManager {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, min_free_reserve: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            min_free_reserve,
        }
    }

    /// Total bytes used by files in the capture directory.
    pub fn used_bytes(&self) -> u64 {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .flatten()
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum()
    }

    /// Evicts uploaded segments if usage exceeds the budget.
    pub fn maybe_evict(&self, ledger: &SharedLedger, open: &OpenSegmentRegister) {
        let mut used = self.used_bytes();
        if used < self.max_bytes {
            return;
        }
        info!(
            "storage over budget ({} of {} bytes), evicting uploaded segments",
            used, self.max_bytes
        );

        let stop_below = self.max_bytes.saturating_sub(self.min_free_reserve);
        let open_path = open.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let ledger = ledger.lock().unwrap_or_else(|e| e.into_inner());

        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !Self::is_segment_file(&path) {
                continue;
            }
            if open_path.as_deref() == Some(path.as_path()) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !ledger.is_uploaded(name) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if std::fs::remove_file(&path).is_ok() {
                debug!("evicted {}", path.display());
                used = used.saturating_sub(size);
                if used < stop_below {
                    break;
                }
            }
        }
    }

    fn is_segment_file(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(SEGMENT_EXT)
    }
}
