//! Real audio capture using CPAL (Cross-Platform Audio Library).
//!
//! The cpal callback pushes sample blocks into a bounded channel; the engine
//! side reassembles them into fixed-size frames with a blocking, timeout-bound
//! read. Capture never waits on the consumer: when the channel is full the
//! block is dropped, which bounds memory if the engine ever stalls.

use crate::audio::source::AudioSource;
use crate::error::{RemrecError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::time::Duration;
use tracing::warn;

/// Blocks buffered between the cpal callback and the reader.
const CHANNEL_BLOCKS: usize = 64;

/// List all available audio input device names.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| RemrecError::AudioCapture {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by one `CpalAudioSource` and only touched from
/// whichever thread currently owns that source; it never crosses threads
/// while in use.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Audio capture over cpal, delivering fixed frames of 16-bit mono PCM.
///
/// Asks the device for i16/mono at the configured rate first, falling back to
/// f32 with sample conversion for devices that only expose float formats.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    rx: Receiver<Vec<i16>>,
    tx: Sender<Vec<i16>>,
    pending: Vec<i16>,
    sample_rate: u32,
    frame_samples: usize,
    read_timeout: Duration,
}

impl CpalAudioSource {
    /// Create a source for the named device, or the host default.
    pub fn new(
        device_name: Option<&str>,
        sample_rate: u32,
        frame_samples: usize,
        read_timeout: Duration,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| RemrecError::AudioCapture {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            devices
                .into_iter()
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| RemrecError::AudioDeviceNotFound {
                    device: name.to_string(),
                })?
        } else {
            host.default_input_device()
                .ok_or_else(|| RemrecError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })?
        };

        let (tx, rx) = bounded(CHANNEL_BLOCKS);
        Ok(Self {
            device,
            stream: None,
            rx,
            tx,
            pending: Vec::new(),
            sample_rate,
            frame_samples,
            read_timeout,
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            warn!("audio stream error: {}", err);
        };

        // Preferred path: i16 mono at the configured rate. PipeWire and
        // PulseAudio convert transparently for most hardware.
        let tx = self.tx.clone();
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if tx.try_send(data.to_vec()).is_err() {
                    warn!("audio channel full, dropping {} samples", data.len());
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback for devices that only expose float formats.
        let tx = self.tx.clone();
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    if tx.try_send(converted).is_err() {
                        warn!("audio channel full, dropping {} samples", data.len());
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| RemrecError::AudioCapture {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.build_stream()?;
        stream.play().map_err(|e| RemrecError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.0.pause().map_err(|e| RemrecError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<i16>> {
        while self.pending.len() < self.frame_samples {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(block) => self.pending.extend_from_slice(&block),
                Err(_) => return Err(RemrecError::FrameTimeout),
            }
        }
        let rest = self.pending.split_off(self.frame_samples);
        let frame = std::mem::replace(&mut self.pending, rest);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio hardware
    fn create_with_default_device() {
        let source = CpalAudioSource::new(None, 16_000, 2048, Duration::from_millis(500));
        assert!(source.is_ok());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn create_with_invalid_device_name_fails() {
        let source = CpalAudioSource::new(
            Some("NonExistentDevice12345"),
            16_000,
            2048,
            Duration::from_millis(500),
        );
        match source {
            Err(RemrecError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            _ => panic!("Expected AudioDeviceNotFound error"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn frames_have_fixed_size() {
        let mut source =
            CpalAudioSource::new(None, 16_000, 2048, Duration::from_millis(500)).unwrap();
        source.start().unwrap();
        let frame = source.read_frame().unwrap();
        assert_eq!(frame.len(), 2048);
        source.stop().unwrap();
    }
}
