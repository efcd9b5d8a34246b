//! Error types for remrec.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemrecError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Timed out waiting for an audio frame")]
    FrameTimeout,

    // Segment errors
    #[error("Failed to create segment file {path}: {message}")]
    SegmentCreate { path: String, message: String },

    #[error("Segment write failed: {message}")]
    SegmentWrite { message: String },

    // Upload errors
    #[error("Upload rejected with HTTP status {status}")]
    UploadRejected { status: u16 },

    #[error("Upload transport error: {message}")]
    UploadTransport { message: String },

    #[error("Segment name {name} is not timestamp-derived")]
    BadSegmentName { name: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for RemrecError {
    fn from(err: reqwest::Error) -> Self {
        RemrecError::UploadTransport {
            message: err.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RemrecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn segment_create_display() {
        let error = RemrecError::SegmentCreate {
            path: "/rec/20250101_000000.wav".to_string(),
            message: "no space left on device".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to create segment file /rec/20250101_000000.wav: no space left on device"
        );
    }

    #[test]
    fn upload_rejected_display() {
        let error = RemrecError::UploadRejected { status: 403 };
        assert_eq!(error.to_string(), "Upload rejected with HTTP status 403");
    }

    #[test]
    fn from_io_error_keeps_message() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: RemrecError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn from_toml_error_maps_to_config() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: RemrecError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: RemrecError = io_error.into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RemrecError>();
        assert_sync::<RemrecError>();
    }
}
