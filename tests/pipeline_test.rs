//! End-to-end pipeline tests: scripted audio through the capture engine into
//! segment files on disk, then delivery to a fake collector over real HTTP.

use crossbeam_channel::bounded;
use remrec::audio::source::ScriptedAudioSource;
use remrec::clock::SystemClock;
use remrec::config::{CaptureConfig, CapturePolicy, Config, StorageConfig, UploadConfig};
use remrec::engine::CaptureEngine;
use remrec::segment::wav::WavFormat;
use remrec::segment::writer::{ChunkWriter, OpenSegmentRegister};
use remrec::storage::ledger::{SharedLedger, UploadLedger};
use remrec::storage::manager::StorageManager;
use remrec::upload::worker::{AssumeReachable, UploadWorker};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const FRAME_SAMPLES: usize = 320; // 20ms at 16kHz
const FRAME_BYTES: u64 = 640;

/// Zero debounce and zero timers: every gate transition happens on the frame
/// that triggers it, so the whole pipeline runs without waiting on wall time.
fn instant_config(dir: &Path) -> Config {
    Config {
        capture: CaptureConfig {
            policy: CapturePolicy::Vad,
            speech_threshold: 300,
            speech_start_debounce_ms: 0,
            silence_timeout_ms: 0,
            min_chunk_ms: 0,
            max_chunk_ms: 600_000,
            pre_roll_ms: 60, // three frames
            ..CaptureConfig::default()
        },
        storage: StorageConfig {
            dir: dir.to_path_buf(),
            ..StorageConfig::default()
        },
        ..Config::default()
    }
}

fn mono16k() -> WavFormat {
    WavFormat {
        sample_rate: 16_000,
        channels: 1,
        bits_per_sample: 16,
    }
}

fn build_engine(
    config: &Config,
    source: ScriptedAudioSource,
) -> (CaptureEngine<SystemClock>, SharedLedger, OpenSegmentRegister) {
    let register: OpenSegmentRegister = Arc::new(Mutex::new(None));
    let writer = ChunkWriter::new(&config.storage.dir, mono16k(), register.clone());
    let storage = StorageManager::new(
        &config.storage.dir,
        config.storage.max_bytes,
        config.storage.min_free_reserve,
    );
    let ledger = UploadLedger::load(config.storage.dir.join("upload_index.json")).into_shared();
    let engine = CaptureEngine::new(
        Box::new(source),
        config,
        writer,
        storage,
        ledger.clone(),
        register.clone(),
        SystemClock,
    );
    (engine, ledger, register)
}

fn wav_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("wav"))
        .collect();
    files.sort();
    files
}

/// One-shot collector: answers `count` requests with `status` and records
/// each raw request (headers plus body).
fn fake_collector(status: u16, count: usize, requests: Arc<Mutex<Vec<Vec<u8>>>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/upload", listener.local_addr().unwrap());
    std::thread::spawn(move || {
        for _ in 0..count {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let (mut header_end, mut content_length) = (None, 0usize);
            loop {
                let n = match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                raw.extend_from_slice(&buf[..n]);
                if header_end.is_none()
                    && let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n")
                {
                    header_end = Some(pos + 4);
                    let headers = String::from_utf8_lossy(&raw[..pos]).to_string();
                    content_length = headers
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().to_string())
                        })
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                }
                if let Some(end) = header_end
                    && raw.len() >= end + content_length
                {
                    break;
                }
            }
            requests.lock().unwrap().push(raw);
            let reason = if status < 400 { "OK" } else { "Error" };
            let _ = stream.write_all(
                format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                )
                .as_bytes(),
            );
        }
    });
    endpoint
}

fn upload_config(endpoint: &str) -> UploadConfig {
    UploadConfig {
        endpoint: endpoint.to_string(),
        api_key: "integration-key".to_string(),
        device_id: "bench-recorder".to_string(),
        retry_base_ms: 1,
        retry_max_ms: 5,
        ..UploadConfig::default()
    }
}

fn worker_for(dir: &Path, endpoint: &str, ledger: SharedLedger, open: OpenSegmentRegister) -> UploadWorker {
    UploadWorker::new(
        &upload_config(endpoint),
        dir,
        mono16k().byte_rate(),
        ledger,
        open,
        Box::new(AssumeReachable),
    )
    .unwrap()
}

/// Scripted speech burst becomes exactly one WAV on disk, pre-roll included,
/// which the worker then uploads, marks in the ledger, and deletes locally.
#[test]
fn speech_reaches_the_collector_and_leaves_the_disk() {
    let dir = tempdir().unwrap();
    let config = instant_config(dir.path());

    let mut source = ScriptedAudioSource::new();
    source.push_constant_frames(50, FRAME_SAMPLES, 3); // pre-roll fodder
    source.push_constant_frames(500, FRAME_SAMPLES, 5); // speech
    source.push_constant_frames(50, FRAME_SAMPLES, 1); // closes the segment

    let (mut engine, ledger, register) = build_engine(&config, source);
    engine.start().unwrap();
    for _ in 0..9 {
        engine.ingest_step().unwrap();
    }
    engine.shutdown().unwrap();

    // Pre-roll (3 frames) + 5 speech frames; the closing quiet frame is not
    // written.
    let files = wav_files(dir.path());
    assert_eq!(files.len(), 1);
    let size = std::fs::metadata(&files[0]).unwrap().len();
    assert_eq!(size, 44 + 8 * FRAME_BYTES);
    let name = files[0].file_name().unwrap().to_str().unwrap().to_string();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let endpoint = fake_collector(200, 1, requests.clone());
    let mut worker = worker_for(dir.path(), &endpoint, ledger.clone(), register);
    let (_tx, rx) = bounded::<()>(1);
    assert!(worker.scan_once(&rx));

    // Delivered: marked in the ledger, removed from disk.
    assert!(!files[0].exists());
    assert!(ledger.lock().unwrap().is_uploaded(&name));

    // The request carried the auth header, the metadata fields, and a body
    // whose length matched its Content-Length exactly.
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let raw = &requests[0];
    let text = String::from_utf8_lossy(raw);
    assert!(text.contains("x-api-key: integration-key"));
    assert!(text.contains("name=\"deviceId\""));
    assert!(text.contains("bench-recorder"));
    assert!(text.contains("name=\"startedAt\""));
    assert!(text.contains("name=\"endedAt\""));
    assert!(text.contains(&format!("filename=\"{name}\"")));
    assert!(text.contains("Content-Type: audio/wav"));

    let header_end = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let declared: usize = text
        .lines()
        .find_map(|l| {
            l.to_ascii_lowercase()
                .strip_prefix("content-length:")
                .map(|v| v.trim().to_string())
        })
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert_eq!(raw.len() - header_end, declared);
    // Body contains the full WAV payload plus multipart framing.
    assert!(declared > (44 + 8 * FRAME_BYTES) as usize);
}

/// A rejecting collector leaves the file and the ledger untouched; delivery
/// is retried on a later pass.
#[test]
fn rejected_segment_stays_local() {
    let dir = tempdir().unwrap();
    let config = instant_config(dir.path());

    let mut source = ScriptedAudioSource::new();
    source.push_constant_frames(500, FRAME_SAMPLES, 5);

    let (mut engine, ledger, register) = build_engine(&config, source);
    for _ in 0..5 {
        engine.ingest_step().unwrap();
    }
    engine.shutdown().unwrap();

    let files = wav_files(dir.path());
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_str().unwrap().to_string();

    let endpoint = fake_collector(500, 1, Arc::new(Mutex::new(Vec::new())));
    let mut worker = worker_for(dir.path(), &endpoint, ledger.clone(), register);
    let (_tx, rx) = bounded::<()>(1);
    assert!(worker.scan_once(&rx));

    assert!(files[0].exists());
    assert!(!ledger.lock().unwrap().is_uploaded(&name));
}

/// Speech-free audio produces no files at all, so there is nothing to upload.
#[test]
fn silence_produces_no_uploads() {
    let dir = tempdir().unwrap();
    let config = instant_config(dir.path());

    let mut source = ScriptedAudioSource::new();
    source.push_constant_frames(50, FRAME_SAMPLES, 40);

    let (mut engine, _ledger, _register) = build_engine(&config, source);
    for _ in 0..40 {
        engine.ingest_step().unwrap();
    }
    engine.shutdown().unwrap();

    assert!(wav_files(dir.path()).is_empty());
}

/// Restart semantics: a fresh process sees the persisted ledger and only
/// delivers the segments that were never marked uploaded.
#[test]
fn restart_resumes_only_pending_segments() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("upload_index.json");

    // First life: two segments, one delivered.
    for name in ["20250101_090000.wav", "20250101_090100.wav"] {
        let mut bytes = vec![0u8; 44 + 640];
        bytes[..4].copy_from_slice(b"RIFF");
        std::fs::write(dir.path().join(name), bytes).unwrap();
    }
    {
        let mut ledger = UploadLedger::load(&ledger_path);
        ledger.mark_uploaded("20250101_090000.wav").unwrap();
    }

    // Second life: fresh load of everything from disk.
    let ledger = UploadLedger::load(&ledger_path).into_shared();
    let register: OpenSegmentRegister = Arc::new(Mutex::new(None));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let endpoint = fake_collector(200, 1, requests.clone());
    let mut worker = worker_for(dir.path(), &endpoint, ledger.clone(), register);
    let (_tx, rx) = bounded::<()>(1);
    assert!(worker.scan_once(&rx));

    // Only the pending segment went out.
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert!(!dir.path().join("20250101_090100.wav").exists());
    assert!(ledger.lock().unwrap().is_uploaded("20250101_090100.wav"));
    // The already-marked one was never re-sent and is still eligible for
    // eviction rather than upload.
    assert!(dir.path().join("20250101_090000.wav").exists());
}
