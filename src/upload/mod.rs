//! Segment delivery to the collector: HTTP client and background worker.

pub mod client;
pub mod worker;
