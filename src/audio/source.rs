//! Audio source abstraction.
//!
//! The engine consumes fixed-size frames of 16-bit mono PCM through this
//! trait, so the real cpal device and test doubles are interchangeable.

use crate::error::{RemrecError, Result};
use std::collections::VecDeque;

/// Trait for audio input devices.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Blocking read of one fixed-size frame.
    ///
    /// Blocks up to the source's read timeout; returns
    /// [`RemrecError::FrameTimeout`] when no full frame arrived in time.
    /// A timeout means the frame is dropped, never that capture is broken.
    fn read_frame(&mut self) -> Result<Vec<i16>>;
}

/// Scripted audio source for tests: plays back a fixed frame sequence.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAudioSource {
    frames: VecDeque<Vec<i16>>,
    started: bool,
    fail_start: bool,
}

impl ScriptedAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame to the script.
    pub fn push_frame(&mut self, frame: Vec<i16>) {
        self.frames.push_back(frame);
    }

    /// Appends `count` copies of a constant-amplitude frame.
    pub fn push_constant_frames(&mut self, amplitude: i16, samples: usize, count: usize) {
        for _ in 0..count {
            self.frames.push_back(vec![amplitude; samples]);
        }
    }

    /// Configure the source to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl AudioSource for ScriptedAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(RemrecError::AudioCapture {
                message: "scripted start failure".to_string(),
            });
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<i16>> {
        self.frames.pop_front().ok_or(RemrecError::FrameTimeout)
    }
}
