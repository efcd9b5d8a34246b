//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "remrec",
    version,
    about = "Voice-gated audio recorder with budgeted storage and collector upload"
)]
pub struct Cli {
    /// Path to the configuration file (default: ~/.config/remrec/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Capture directory, overriding the configured one
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Audio input device name, overriding the configured one
    #[arg(long)]
    pub device: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log errors only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available audio input devices
    Devices,
}
