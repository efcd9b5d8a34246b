//! Application composition and the capture loop.
//!
//! Wires the audio source, capture engine and upload worker together, then
//! runs the frame loop until SIGINT or SIGTERM. All state is owned here and
//! handed to the components that need it; nothing lives in globals except the
//! signal flag itself.

use crate::audio::capture::CpalAudioSource;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::defaults::{BITS_PER_SAMPLE, CHANNELS, LEDGER_FILENAME};
use crate::engine::CaptureEngine;
use crate::segment::wav::WavFormat;
use crate::segment::writer::{ChunkWriter, OpenSegmentRegister};
use crate::storage::ledger::UploadLedger;
use crate::storage::manager::StorageManager;
use crate::upload::worker::{AssumeReachable, Connectivity, TcpProbe, UploadWorker, WorkerHandle};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Connectivity probe timeout; short so an offline check never stalls a scan.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_signal(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

fn install_signal_handlers() {
    // SAFETY: the handler only touches an atomic flag, which is
    // async-signal-safe.
    unsafe {
        let handler = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

/// Runs the recorder until interrupted.
pub fn run(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.storage.dir)?;

    let register: OpenSegmentRegister = std::sync::Arc::new(Mutex::new(None));
    let ledger = UploadLedger::load(config.storage.dir.join(LEDGER_FILENAME)).into_shared();

    let fmt = WavFormat {
        sample_rate: config.audio.sample_rate,
        channels: CHANNELS,
        bits_per_sample: BITS_PER_SAMPLE,
    };
    let writer = ChunkWriter::new(&config.storage.dir, fmt, register.clone());
    let storage = StorageManager::new(
        &config.storage.dir,
        config.storage.max_bytes,
        config.storage.min_free_reserve,
    );

    let source = CpalAudioSource::new(
        config.audio.device.as_deref(),
        config.audio.sample_rate,
        config.audio.frame_samples,
        Duration::from_millis(config.audio.frame_read_timeout_ms),
    )?;

    let mut engine = CaptureEngine::new(
        Box::new(source),
        &config,
        writer,
        storage,
        ledger.clone(),
        register.clone(),
        SystemClock,
    );

    let worker = spawn_upload_worker(&config, fmt.byte_rate(), ledger, register)?;

    install_signal_handlers();
    engine.start()?;
    info!(
        "recording into {} (policy: {:?})",
        config.storage.dir.display(),
        config.capture.policy
    );

    while RUNNING.load(Ordering::SeqCst) {
        if let Err(e) = engine.ingest_step() {
            error!("capture failed: {}", e);
            break;
        }
    }

    info!("shutting down");
    engine.shutdown()?;
    if let Some(worker) = worker {
        worker.shutdown();
    }
    Ok(())
}

/// Starts the upload worker when an endpoint is configured.
fn spawn_upload_worker(
    config: &Config,
    byte_rate: u32,
    ledger: crate::storage::ledger::SharedLedger,
    register: OpenSegmentRegister,
) -> anyhow::Result<Option<WorkerHandle>> {
    if config.upload.endpoint.is_empty() {
        warn!("no upload endpoint configured, segments stay local");
        return Ok(None);
    }
    let connectivity: Box<dyn Connectivity> =
        match TcpProbe::from_endpoint(&config.upload.endpoint, PROBE_TIMEOUT) {
            Some(probe) => Box::new(probe),
            None => {
                warn!(
                    "cannot derive a reachability probe from {}, assuming reachable",
                    config.upload.endpoint
                );
                Box::new(AssumeReachable)
            }
        };
    let worker = UploadWorker::new(
        &config.upload,
        PathBuf::from(&config.storage.dir),
        byte_rate,
        ledger,
        register,
        connectivity,
    )?;
    Ok(Some(worker.spawn()))
}
