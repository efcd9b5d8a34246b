//! remrec: continuous voice-gated audio recorder.
//!
//! Captures 16-bit mono PCM from a microphone, gates it through an
//! energy-based voice activity state machine (with pre-roll backfill so soft
//! onsets are kept), writes bounded-duration WAV segments into a
//! budget-managed directory, and delivers them to an HTTP collector from a
//! background worker with retry backoff and a durable upload ledger.

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod app;
pub mod audio;
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod segment;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use error::{RemrecError, Result};

/// Version string including the git hash when built from a checkout.
pub fn version_string() -> String {
    match option_env!("GIT_HASH") {
        Some(hash) => format!("remrec {} ({})", env!("CARGO_PKG_VERSION"), hash),
        None => format!("remrec {}", env!("CARGO_PKG_VERSION")),
    }
}
