//! Default configuration constants for remrec.
//!
//! Shared across the config types and the capture/upload paths so the same
//! numbers are never duplicated in two places.

/// Default audio sample rate in Hz.
///
/// 16kHz mono is plenty for speech and keeps segment files small enough to
/// upload over a flaky link.
pub const SAMPLE_RATE: u32 = 16_000;

/// Bits per sample for captured audio. Only 16-bit signed PCM is supported.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Channel count for captured audio. Mono only.
pub const CHANNELS: u16 = 1;

/// Samples per capture frame (128ms at 16kHz, 4096 bytes).
pub const FRAME_SAMPLES: usize = 2048;

/// How long a frame read may block before the frame is counted as dropped.
pub const FRAME_READ_TIMEOUT_MS: u64 = 500;

/// Integer RMS threshold above which a frame counts as speech.
pub const SPEECH_THRESHOLD: u32 = 300;

/// Continuous above-threshold time required before capture starts.
///
/// A single sub-threshold frame resets the accumulated run, so transients
/// (door slams, keyboard clicks) never open a segment.
pub const SPEECH_START_DEBOUNCE_MS: u64 = 100;

/// Continuous silence required before an open segment is finished.
pub const SILENCE_TIMEOUT_MS: u64 = 3_000;

/// Minimum segment length. Silence cannot close a segment younger than this.
pub const MIN_CHUNK_MS: u64 = 2_000;

/// Maximum segment length. Reached even mid-speech, the segment rotates.
pub const MAX_CHUNK_MS: u64 = 300_000;

/// Pre-roll duration retained while idle and backfilled into a new segment.
///
/// Captures soft onsets that occur before energy crosses the threshold.
pub const PRE_ROLL_MS: u64 = 500;

/// Storage budget for the capture directory.
pub const MAX_STORAGE_BYTES: u64 = 512 * 1024 * 1024;

/// Hysteresis band: eviction runs until usage drops this far below budget.
pub const MIN_FREE_RESERVE_BYTES: u64 = 64 * 1024 * 1024;

/// Filename of the persisted upload ledger inside the capture directory.
pub const LEDGER_FILENAME: &str = "upload_index.json";

/// Extension of segment files.
pub const SEGMENT_EXT: &str = "wav";

/// How often the upload worker scans for pending segments.
pub const UPLOAD_SCAN_INTERVAL_MS: u64 = 30_000;

/// Timeout for the whole upload request (connect + response).
pub const HTTP_TIMEOUT_MS: u64 = 30_000;

/// Consecutive upload failures before the long breaker pause.
pub const UPLOAD_MAX_RETRIES: u32 = 5;

/// First backoff step after a failed upload attempt.
pub const UPLOAD_RETRY_BASE_MS: u64 = 1_000;

/// Backoff ceiling, also the breaker pause length.
pub const UPLOAD_RETRY_MAX_MS: u64 = 60_000;
