//! Collector upload client.
//!
//! One segment per request: a multipart/form-data POST with the device
//! identity, the segment's own time window, and the WAV bytes streamed
//! straight from disk. The file part carries an explicit length, so the
//! request goes out with an exact Content-Length and no full-body buffering.

use crate::config::UploadConfig;
use crate::error::{RemrecError, Result};
use crate::segment::wav::HEADER_LEN;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use reqwest::blocking::{Client, multipart};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Wall-clock window covered by a segment file.
///
/// Derived strictly from the file itself: `started_at` from the
/// timestamp-derived name, `ended_at` from the payload size and byte rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWindow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SegmentWindow {
    pub fn from_file(name: &str, file_size: u64, byte_rate: u32) -> Result<Self> {
        let started_at = parse_started_at(name)?;
        let payload = file_size.saturating_sub(HEADER_LEN);
        let millis = payload * 1000 / byte_rate as u64;
        let ended_at = started_at + TimeDelta::milliseconds(millis as i64);
        Ok(Self {
            started_at,
            ended_at,
        })
    }
}

/// Parses `YYYYMMDD_HHMMSS[ _n ].wav` into a UTC timestamp.
fn parse_started_at(name: &str) -> Result<DateTime<Utc>> {
    let stem = name.strip_suffix(".wav").unwrap_or(name);
    // Same-second collision suffix does not shift the start time.
    let stem = stem.get(..15).unwrap_or(stem);
    NaiveDateTime::parse_from_str(stem, "%Y%m%d_%H%M%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| RemrecError::BadSegmentName {
            name: name.to_string(),
        })
}

/// True when `name` is a timestamp-derived segment name this crate produced.
pub fn is_timestamp_name(name: &str) -> bool {
    parse_started_at(name).is_ok()
}

fn iso8601(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub struct UploadClient {
    client: Client,
    endpoint: String,
    api_key: String,
    device_id: String,
    byte_rate: u32,
}

impl UploadClient {
    pub fn new(config: &UploadConfig, byte_rate: u32) -> Result<Self> {
        let timeout = Duration::from_millis(config.http_timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            device_id: config.device_id.clone(),
            byte_rate,
        })
    }

    /// Uploads one segment file; Ok only on a 2xx response.
    pub fn upload(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RemrecError::BadSegmentName {
                name: path.display().to_string(),
            })?
            .to_string();

        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let window = SegmentWindow::from_file(&name, file_size, self.byte_rate)?;

        debug!("uploading {} ({} bytes)", name, file_size);

        let file_part = multipart::Part::reader_with_length(file, file_size)
            .file_name(name)
            .mime_str("audio/wav")?;

        let form = multipart::Form::new()
            .text("deviceId", self.device_id.clone())
            .text("startedAt", iso8601(window.started_at))
            .text("endedAt", iso8601(window.ended_at))
            .part("file", file_part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RemrecError::UploadRejected {
                status: status.as_u16(),
            })
        }
    }
}
