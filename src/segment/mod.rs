//! Bounded-duration segment files: WAV container and writer lifecycle.

pub mod wav;
pub mod writer;
