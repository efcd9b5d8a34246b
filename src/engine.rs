//! Capture engine.
//!
//! Pulls fixed-size frames from the audio source and routes them according to
//! the capture policy: through the voice activity gate and pre-roll buffer,
//! or straight into rotating segments when recording unconditionally. The
//! engine owns every capture-side component; the upload worker only sees the
//! shared ledger and open-segment register.

use crate::audio::ring::PreRollBuffer;
use crate::audio::source::AudioSource;
use crate::audio::vad::{GateDecision, VoiceActivityGate};
use crate::clock::Clock;
use crate::config::{CapturePolicy, Config};
use crate::error::{RemrecError, Result};
use crate::segment::writer::{ChunkWriter, OpenSegmentRegister};
use crate::storage::ledger::SharedLedger;
use crate::storage::manager::StorageManager;
use std::time::Duration;
use tracing::{trace, warn};

pub struct CaptureEngine<C: Clock> {
    source: Box<dyn AudioSource>,
    gate: VoiceActivityGate<C>,
    pre_roll: PreRollBuffer,
    writer: ChunkWriter,
    storage: StorageManager,
    ledger: SharedLedger,
    open: OpenSegmentRegister,
    policy: CapturePolicy,
    max_chunk: Duration,
    clock: C,
}

impl<C: Clock + Clone> CaptureEngine<C> {
    pub fn new(
        source: Box<dyn AudioSource>,
        config: &Config,
        writer: ChunkWriter,
        storage: StorageManager,
        ledger: SharedLedger,
        open: OpenSegmentRegister,
        clock: C,
    ) -> Self {
        Self {
            source,
            gate: VoiceActivityGate::with_clock(&config.capture, clock.clone()),
            pre_roll: PreRollBuffer::new(config.pre_roll_capacity()),
            writer,
            storage,
            ledger,
            open,
            policy: config.capture.policy,
            max_chunk: Duration::from_millis(config.capture.max_chunk_ms),
            clock,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.source.start()
    }

    /// Reads and processes one frame.
    ///
    /// A frame read timeout only drops that frame, and a segment I/O failure
    /// (e.g. storage exhausted mid-write) costs at most the current segment:
    /// it is abandoned, the gate returns to idle, and capture carries on.
    /// Only a broken audio source surfaces as an error.
    pub fn ingest_step(&mut self) -> Result<()> {
        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(RemrecError::FrameTimeout) => {
                trace!("frame read timed out, dropping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let result = match self.policy {
            CapturePolicy::Vad => self.step_vad(&frame),
            CapturePolicy::Always => self.step_always(&frame),
        };
        if let Err(e) = result {
            warn!("segment I/O failed ({}), discarding the open segment", e);
            self.writer.abandon();
            self.gate.reset();
            self.storage.maybe_evict(&self.ledger, &self.open);
        }
        Ok(())
    }

    /// Finalizes any open segment and stops the source.
    ///
    /// The segment is retained if it saw speech, so an interrupt mid-sentence
    /// never throws audio away. A failed finalize abandons the file rather
    /// than blocking shutdown.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.writer.finalize(false) {
            warn!("finalize failed during shutdown ({}), abandoning segment", e);
            self.writer.abandon();
        }
        self.source.stop()
    }

    fn step_vad(&mut self, frame: &[i16]) -> Result<()> {
        let bytes = pcm_bytes(frame);
        match self.gate.observe(frame) {
            GateDecision::Idle => {
                self.pre_roll.push(&bytes);
                Ok(())
            }
            GateDecision::StartCapture => {
                if !self.open_segment()? {
                    self.pre_roll.push(&bytes);
                    return Ok(());
                }
                // Backfill the onset retained while idle, then this frame.
                let backfill = self.pre_roll.drain();
                if !backfill.is_empty() {
                    self.writer.write(&backfill)?;
                }
                self.writer.write(&bytes)?;
                self.writer.mark_speech();
                Ok(())
            }
            GateDecision::Continue { speech } => {
                self.writer.write(&bytes)?;
                if speech {
                    self.writer.mark_speech();
                }
                Ok(())
            }
            GateDecision::Finish => {
                self.writer.finalize(false)?;
                self.storage.maybe_evict(&self.ledger, &self.open);
                // The closing frame starts the next pre-roll window.
                self.pre_roll.push(&bytes);
                Ok(())
            }
            GateDecision::Rotate => {
                self.writer.finalize(false)?;
                self.storage.maybe_evict(&self.ledger, &self.open);
                if !self.open_segment()? {
                    self.pre_roll.push(&bytes);
                    return Ok(());
                }
                // The rotated-into segment is mid-speech by definition.
                self.writer.mark_speech();
                self.writer.write(&bytes)
            }
        }
    }

    fn step_always(&mut self, frame: &[i16]) -> Result<()> {
        let now = self.clock.now();
        if let Some(started) = self.writer.started_tick() {
            if now.duration_since(started) >= self.max_chunk {
                self.writer.finalize(false)?;
                self.storage.maybe_evict(&self.ledger, &self.open);
            }
        }
        if !self.writer.is_open() {
            if let Err(e) = self.writer.open(now) {
                warn!("segment open failed: {}", e);
                return Ok(());
            }
        }
        // Unconditional recording never discards on finalize.
        self.writer.mark_speech();
        self.writer.write(&pcm_bytes(frame))
    }

    /// Opens a segment; on failure (e.g. storage exhausted) logs, resets the
    /// gate and reports false so the caller keeps the frame in pre-roll.
    fn open_segment(&mut self) -> Result<bool> {
        match self.writer.open(self.clock.now()) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("segment open failed: {}", e);
                self.gate.reset();
                Ok(false)
            }
        }
    }
}

fn pcm_bytes(frame: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.len() * 2);
    for sample in frame {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
