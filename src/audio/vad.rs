//! Voice activity gate.
//!
//! Classifies each audio frame by integer RMS energy against a fixed
//! threshold and drives a two-state machine (Idle / Capturing) with start
//! debounce, a silence-run stop timer, and min/max duration bounds. The gate
//! only decides; writing frames and opening files is the engine's job.

use crate::clock::Clock;
use crate::config::CaptureConfig;
use std::time::{Duration, Instant};

/// Integer root-mean-square energy of a frame.
///
/// `sqrt(sum(sample²)/count)` truncated to an integer; an empty frame is 0.
pub fn frame_rms(samples: &[i16]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let sum_squares: u64 = samples.iter().map(|&s| (s as i64 * s as i64) as u64).sum();
    let mean_square = sum_squares / samples.len() as u64;
    (mean_square as f64).sqrt() as u32
}

/// Macro-state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Capturing,
}

/// Per-frame decision returned to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Stay idle; the frame belongs in the pre-roll buffer.
    Idle,
    /// Speech confirmed: open a segment, backfill pre-roll, write this frame.
    StartCapture,
    /// Write this frame into the open segment.
    Continue { speech: bool },
    /// Finish the open segment; the triggering frame goes back to pre-roll.
    Finish,
    /// Max duration hit mid-speech: finish, then immediately open a new
    /// segment pre-marked speech-bearing and write this frame into it.
    Rotate,
}

/// Voice activity gate state machine.
///
/// Invariant: the debounce timer only runs while Idle and the silence-run
/// timer only runs while Capturing; they are never both set.
pub struct VoiceActivityGate<C: Clock> {
    threshold: u32,
    debounce: Duration,
    silence_timeout: Duration,
    min_chunk: Duration,
    max_chunk: Duration,
    state: GateState,
    speech_pending_since: Option<Instant>,
    silence_since: Option<Instant>,
    capture_started_at: Option<Instant>,
    last_rms: u32,
    clock: C,
}

impl<C: Clock> VoiceActivityGate<C> {
    pub fn with_clock(config: &CaptureConfig, clock: C) -> Self {
        Self {
            threshold: config.speech_threshold,
            debounce: Duration::from_millis(config.speech_start_debounce_ms),
            silence_timeout: Duration::from_millis(config.silence_timeout_ms),
            min_chunk: Duration::from_millis(config.min_chunk_ms),
            max_chunk: Duration::from_millis(config.max_chunk_ms),
            state: GateState::Idle,
            speech_pending_since: None,
            silence_since: None,
            capture_started_at: None,
            last_rms: 0,
            clock,
        }
    }

    /// Classifies one frame and advances the state machine.
    pub fn observe(&mut self, samples: &[i16]) -> GateDecision {
        let rms = frame_rms(samples);
        self.last_rms = rms;
        let is_speech = rms >= self.threshold;
        let now = self.clock.now();

        match self.state {
            GateState::Idle => {
                if !is_speech {
                    // A single quiet frame fully resets the debounce run.
                    self.speech_pending_since = None;
                    return GateDecision::Idle;
                }
                let pending_since = *self.speech_pending_since.get_or_insert(now);
                if now.duration_since(pending_since) >= self.debounce {
                    self.state = GateState::Capturing;
                    self.speech_pending_since = None;
                    self.silence_since = None;
                    self.capture_started_at = Some(now);
                    GateDecision::StartCapture
                } else {
                    GateDecision::Idle
                }
            }
            GateState::Capturing => {
                let started_at = self.capture_started_at.unwrap_or(now);
                let elapsed = now.duration_since(started_at);

                // Duration ceiling applies regardless of speech or silence.
                if elapsed >= self.max_chunk {
                    if is_speech {
                        self.capture_started_at = Some(now);
                        self.silence_since = None;
                        return GateDecision::Rotate;
                    }
                    self.to_idle();
                    return GateDecision::Finish;
                }

                if is_speech {
                    self.silence_since = None;
                    return GateDecision::Continue { speech: true };
                }

                // Silence cannot stop a segment younger than the minimum.
                if elapsed < self.min_chunk {
                    self.silence_since = None;
                    return GateDecision::Continue { speech: false };
                }

                let silence_since = *self.silence_since.get_or_insert(now);
                if now.duration_since(silence_since) >= self.silence_timeout {
                    self.to_idle();
                    GateDecision::Finish
                } else {
                    GateDecision::Continue { speech: false }
                }
            }
        }
    }

    fn to_idle(&mut self) {
        self.state = GateState::Idle;
        self.speech_pending_since = None;
        self.silence_since = None;
        self.capture_started_at = None;
    }

    /// Returns to idle, e.g. after a failed segment open.
    pub fn reset(&mut self) {
        self.to_idle();
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// RMS of the most recently observed frame.
    pub fn last_rms(&self) -> u32 {
        self.last_rms
    }
}
