use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

/// Audio input configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub frame_read_timeout_ms: u64,
}

/// Capture gating configuration (voice activity gate and segment bounds)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub policy: CapturePolicy,
    pub speech_threshold: u32,
    pub speech_start_debounce_ms: u64,
    pub silence_timeout_ms: u64,
    pub min_chunk_ms: u64,
    pub max_chunk_ms: u64,
    pub pre_roll_ms: u64,
}

/// Which policy decides when a segment is open.
///
/// `Vad` gates on the voice activity state machine; `Always` records
/// unconditionally and rotates on the maximum duration only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CapturePolicy {
    Vad,
    Always,
}

/// Local storage budget configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub min_free_reserve: u64,
}

/// Collector upload configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    pub endpoint: String,
    pub api_key: String,
    pub device_id: String,
    pub scan_interval_ms: u64,
    pub http_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_samples: defaults::FRAME_SAMPLES,
            frame_read_timeout_ms: defaults::FRAME_READ_TIMEOUT_MS,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            policy: CapturePolicy::Vad,
            speech_threshold: defaults::SPEECH_THRESHOLD,
            speech_start_debounce_ms: defaults::SPEECH_START_DEBOUNCE_MS,
            silence_timeout_ms: defaults::SILENCE_TIMEOUT_MS,
            min_chunk_ms: defaults::MIN_CHUNK_MS,
            max_chunk_ms: defaults::MAX_CHUNK_MS,
            pre_roll_ms: defaults::PRE_ROLL_MS,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("recordings"),
            max_bytes: defaults::MAX_STORAGE_BYTES,
            min_free_reserve: defaults::MIN_FREE_RESERVE_BYTES,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            device_id: "recorder-0".to_string(),
            scan_interval_ms: defaults::UPLOAD_SCAN_INTERVAL_MS,
            http_timeout_ms: defaults::HTTP_TIMEOUT_MS,
            max_retries: defaults::UPLOAD_MAX_RETRIES,
            retry_base_ms: defaults::UPLOAD_RETRY_BASE_MS,
            retry_max_ms: defaults::UPLOAD_RETRY_MAX_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - REMREC_ENDPOINT → upload.endpoint
    /// - REMREC_API_KEY → upload.api_key
    /// - REMREC_DEVICE_ID → upload.device_id
    /// - REMREC_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("REMREC_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.upload.endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("REMREC_API_KEY")
            && !key.is_empty()
        {
            self.upload.api_key = key;
        }

        if let Ok(device_id) = std::env::var("REMREC_DEVICE_ID")
            && !device_id.is_empty()
        {
            self.upload.device_id = device_id;
        }

        if let Ok(device) = std::env::var("REMREC_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/remrec/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remrec")
            .join("config.toml")
    }

    /// Pre-roll buffer capacity in bytes for the configured audio format.
    pub fn pre_roll_capacity(&self) -> usize {
        let bytes_per_sec = self.audio.sample_rate as u64 * 2;
        (bytes_per_sec * self.capture.pre_roll_ms / 1000) as usize
    }
}
