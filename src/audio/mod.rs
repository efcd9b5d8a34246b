//! Audio input, voice activity gating, and the pre-roll buffer.

pub mod capture;
pub mod ring;
pub mod source;
pub mod vad;
