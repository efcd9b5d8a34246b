//! Background upload worker.
//!
//! A dedicated thread scans the capture directory on an interval and pushes
//! pending segments to the collector, oldest first. Capture never blocks on
//! the network: the only state shared with the capture thread is the upload
//! ledger and the open-segment register.
//!
//! Failures back off progressively. After `max_retries` consecutive failures
//! the worker takes one long breaker pause and starts the count over, so a
//! dead collector costs a bounded amount of retry traffic.

use crate::config::UploadConfig;
use crate::defaults::SEGMENT_EXT;
use crate::error::Result;
use crate::segment::writer::OpenSegmentRegister;
use crate::storage::ledger::SharedLedger;
use crate::upload::client::{UploadClient, is_timestamp_name};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::collections::HashSet;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Reachability probe consulted before each scan pass.
pub trait Connectivity: Send {
    fn is_reachable(&self) -> bool;
}

/// Probes the collector with a plain TCP connect.
///
/// Cheaper than letting every upload attempt in a pass time out while the
/// network is down.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn from_endpoint(endpoint: &str, timeout: Duration) -> Option<Self> {
        let url = reqwest::Url::parse(endpoint).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self {
            host,
            port,
            timeout,
        })
    }
}

impl Connectivity for TcpProbe {
    fn is_reachable(&self) -> bool {
        let Ok(mut addrs) = (self.host.as_str(), self.port).to_socket_addrs() else {
            return false;
        };
        addrs.any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Fallback probe when the endpoint cannot be parsed; every scan proceeds and
/// failures are handled by the retry path instead.
pub struct AssumeReachable;

impl Connectivity for AssumeReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

pub struct UploadWorker {
    dir: PathBuf,
    client: UploadClient,
    ledger: SharedLedger,
    open: OpenSegmentRegister,
    connectivity: Box<dyn Connectivity>,
    scan_interval: Duration,
    max_retries: u32,
    retry_base: Duration,
    retry_max: Duration,
    failures: u32,
    online: bool,
    ignored: HashSet<String>,
}

/// Handle to the running worker thread.
pub struct WorkerHandle {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Requests shutdown and waits for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl UploadWorker {
    pub fn new(
        config: &UploadConfig,
        dir: impl Into<PathBuf>,
        byte_rate: u32,
        ledger: SharedLedger,
        open: OpenSegmentRegister,
        connectivity: Box<dyn Connectivity>,
    ) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            client: UploadClient::new(config, byte_rate)?,
            ledger,
            open,
            connectivity,
            scan_interval: Duration::from_millis(config.scan_interval_ms),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
            retry_max: Duration::from_millis(config.retry_max_ms),
            failures: 0,
            online: true,
            ignored: HashSet::new(),
        })
    }

    /// Spawns the worker thread; runs until the handle requests shutdown.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let thread = std::thread::spawn(move || self.run(shutdown_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            thread: Some(thread),
        }
    }

    fn run(mut self, shutdown: Receiver<()>) {
        info!("upload worker started");
        loop {
            if !self.tick(&shutdown) {
                break;
            }
            match shutdown.recv_timeout(self.scan_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        info!("upload worker stopped");
    }

    /// One connectivity check plus scan pass; false once shutdown is seen.
    fn tick(&mut self, shutdown: &Receiver<()>) -> bool {
        let reachable = self.connectivity.is_reachable();
        if reachable != self.online {
            if reachable {
                info!("collector reachable again, resuming uploads");
            } else {
                warn!("collector unreachable, pausing uploads");
            }
            self.online = reachable;
        }
        if !reachable {
            return true;
        }
        self.scan_once(shutdown)
    }

    /// Uploads pending segments oldest-first until the directory is clean or
    /// an attempt fails. A failure ends the pass after its backoff pause.
    pub fn scan_once(&mut self, shutdown: &Receiver<()>) -> bool {
        for path in self.pending_segments() {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            match self.client.upload(&path) {
                Ok(()) => {
                    // Mark before delete: a crash between the two costs one
                    // redundant re-upload, never a lost segment.
                    let marked = self
                        .ledger
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .mark_uploaded(&name);
                    if let Err(e) = marked {
                        warn!("uploaded {} but ledger write failed: {}", name, e);
                        continue;
                    }
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!("uploaded {} but delete failed: {}", name, e);
                    }
                    self.failures = 0;
                    info!("uploaded {}", name);
                }
                Err(e) => {
                    self.failures += 1;
                    warn!(
                        "upload of {} failed ({}), consecutive failures: {}",
                        name, e, self.failures
                    );
                    let keep_running = if self.failures >= self.max_retries {
                        warn!(
                            "too many consecutive failures, backing off for {:?}",
                            self.retry_max
                        );
                        self.failures = 0;
                        pause(shutdown, self.retry_max)
                    } else {
                        pause(shutdown, self.backoff())
                    };
                    return keep_running;
                }
            }
        }
        true
    }

    /// Progressive backoff: base doubled per consecutive failure, capped.
    fn backoff(&self) -> Duration {
        let exp = self.failures.saturating_sub(1).min(16);
        let millis = (self.retry_base.as_millis() as u64).saturating_mul(1 << exp);
        Duration::from_millis(millis).min(self.retry_max)
    }

    /// Closed segment files not yet in the ledger, oldest first.
    ///
    /// A `.wav` whose name is not timestamp-derived was not produced by this
    /// crate; it is excluded from delivery and warned about once, since it
    /// also occupies storage that eviction will never reclaim.
    fn pending_segments(&mut self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let open_path = self.open.lock().unwrap_or_else(|e| e.into_inner()).clone();

        let mut candidates: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
                continue;
            }
            if open_path.as_deref() == Some(path.as_path()) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_timestamp_name(name) {
                if self.ignored.insert(name.to_string()) {
                    warn!("{} is not a segment of ours, leaving it alone", name);
                }
                continue;
            }
            candidates.push((name.to_string(), path));
        }

        let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|(name, _)| !ledger.is_uploaded(name))
            .map(|(_, path)| path)
            .collect();
        drop(ledger);
        // Timestamp-derived names sort chronologically.
        pending.sort();
        pending
    }
}

/// Shutdown-aware sleep; false once shutdown is requested.
fn pause(shutdown: &Receiver<()>, duration: Duration) -> bool {
    matches!(
        shutdown.recv_timeout(duration),
        Err(RecvTimeoutError::Timeout)
    )
}
