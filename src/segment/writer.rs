//! Segment file lifecycle.
//!
//! At most one segment is open at a time. A segment is created with a
//! provisional WAV header, fed raw PCM, and finalized by patching the header
//! size fields in place. Segments that never saw a speech frame are deleted
//! on finalize instead of persisted.

use crate::error::{RemrecError, Result};
use crate::segment::wav::{self, HEADER_LEN, WavFormat};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Path of the currently open segment, shared with eviction and upload so
/// neither ever touches a file that is still being written.
pub type OpenSegmentRegister = Arc<Mutex<Option<PathBuf>>>;

/// One open segment file.
struct OpenSegment {
    file: File,
    path: PathBuf,
    started_at: DateTime<Utc>,
    started_tick: Instant,
    payload_bytes: u64,
    has_speech: bool,
}

/// Owns the currently open segment and its on-disk representation.
pub struct ChunkWriter {
    dir: PathBuf,
    fmt: WavFormat,
    current: Option<OpenSegment>,
    register: OpenSegmentRegister,
}

impl ChunkWriter {
    pub fn new(dir: impl Into<PathBuf>, fmt: WavFormat, register: OpenSegmentRegister) -> Self {
        Self {
            dir: dir.into(),
            fmt,
            current: None,
            register,
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }

    pub fn payload_bytes(&self) -> u64 {
        self.current.as_ref().map(|s| s.payload_bytes).unwrap_or(0)
    }

    pub fn has_speech(&self) -> bool {
        self.current.as_ref().map(|s| s.has_speech).unwrap_or(false)
    }

    /// Monotonic tick at which the open segment started.
    pub fn started_tick(&self) -> Option<Instant> {
        self.current.as_ref().map(|s| s.started_tick)
    }

    /// Creates a new timestamp-named segment file with a provisional header.
    ///
    /// Fails without touching existing state when the file cannot be created,
    /// e.g. when storage is exhausted.
    pub fn open(&mut self, now_tick: Instant) -> Result<()> {
        debug_assert!(self.current.is_none(), "segment already open");

        let started_at = Utc::now();
        let path = self.unique_path(&started_at);

        let mut file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| RemrecError::SegmentCreate {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        wav::write_provisional_header(&mut file, &self.fmt)?;

        info!("segment opened: {}", path.display());
        *lock(&self.register) = Some(path.clone());
        self.current = Some(OpenSegment {
            file,
            path,
            started_at,
            started_tick: now_tick,
            payload_bytes: 0,
            has_speech: false,
        });
        Ok(())
    }

    /// Appends raw PCM payload bytes to the open segment.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let seg = self.current.as_mut().ok_or_else(|| RemrecError::SegmentWrite {
            message: "no open segment".to_string(),
        })?;
        use std::io::Write;
        seg.file
            .write_all(bytes)
            .map_err(|e| RemrecError::SegmentWrite {
                message: e.to_string(),
            })?;
        seg.payload_bytes += bytes.len() as u64;
        Ok(())
    }

    /// Flags the open segment as speech-bearing so finalize retains it.
    pub fn mark_speech(&mut self) {
        if let Some(seg) = self.current.as_mut() {
            seg.has_speech = true;
        }
    }

    /// Closes the open segment.
    ///
    /// Patches the header size fields, then either retains the file
    /// (returning its path and wall start time) or deletes it when `discard`
    /// is requested or no speech frame was ever observed.
    pub fn finalize(&mut self, discard: bool) -> Result<Option<(PathBuf, DateTime<Utc>)>> {
        let Some(mut seg) = self.current.take() else {
            return Ok(None);
        };
        *lock(&self.register) = None;

        use std::io::Write;
        seg.file.flush()?;
        let file_size = HEADER_LEN + seg.payload_bytes;
        wav::patch_header_sizes(&mut seg.file, file_size)?;
        drop(seg.file);

        if discard || !seg.has_speech {
            debug!("segment discarded: {}", seg.path.display());
            std::fs::remove_file(&seg.path)?;
            return Ok(None);
        }

        info!(
            "segment closed: {} ({} payload bytes)",
            seg.path.display(),
            seg.payload_bytes
        );
        Ok(Some((seg.path, seg.started_at)))
    }

    /// Drops the open segment without patching and deletes its file.
    ///
    /// Recovery path for mid-segment I/O failures: the file is half-written
    /// and carries a sentinel header, so it must not survive. Cannot fail.
    pub fn abandon(&mut self) {
        let Some(seg) = self.current.take() else {
            return;
        };
        *lock(&self.register) = None;
        drop(seg.file);
        if std::fs::remove_file(&seg.path).is_ok() {
            info!("segment abandoned: {}", seg.path.display());
        }
    }

    /// Timestamp-derived path, suffixed if a same-second segment exists.
    fn unique_path(&self, started_at: &DateTime<Utc>) -> PathBuf {
        let stem = started_at.format("%Y%m%d_%H%M%S").to_string();
        let mut path = self.dir.join(format!("{stem}.wav"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}_{n}.wav"));
            n += 1;
        }
        path
    }
}

fn lock(register: &OpenSegmentRegister) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
    // A poisoned register only means another thread panicked mid-update;
    // the contained path is still coherent.
    register.lock().unwrap_or_else(|e| e.into_inner())
}
