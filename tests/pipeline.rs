//! End-to-end pipeline tests with synthetic frames and a mock PLC.

use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};

use fenceguard::actuator::{Actuator, CoilStateRegistry, PlcCoilController, PlcConfig};
use fenceguard::backend_client::EventSink;
use fenceguard::camera_worker::CameraWorker;
use fenceguard::config_store::CameraZones;
use fenceguard::event_dispatcher::{DispatcherConfig, EventDispatcher};
use fenceguard::frame_source::SourcedFrame;
use fenceguard::media_store::FsMediaStore;
use fenceguard::state::SessionHandle;
use fenceguard::zone_detector::{DetectorConfig, NullObjectDetector, ZoneDetector};

const COIL_ADDRESS: u16 = 8196;

/// Mock PLC echoing write-single-coil requests and recording every PDU.
async fn mock_plc() -> (u16, Arc<Mutex<Vec<Vec<u8>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let writes: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let log = writes.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let mut header = [0u8; 7];
            if stream.read_exact(&mut header).await.is_err() {
                continue;
            }
            let len = u16::from_be_bytes([header[4], header[5]]) as usize;
            let mut pdu = vec![0u8; len - 1];
            if stream.read_exact(&mut pdu).await.is_err() {
                continue;
            }
            log.lock().await.push(pdu.clone());

            let mut frame = Vec::new();
            frame.extend_from_slice(&header[0..2]);
            frame.extend_from_slice(&[0, 0]);
            frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
            frame.push(header[6]);
            frame.extend_from_slice(&pdu);
            let _ = stream.write_all(&frame).await;
        }
    });

    (port, writes)
}

fn black_frame() -> Arc<RgbImage> {
    Arc::new(RgbImage::new(128, 96))
}

fn intrusion_frame() -> Arc<RgbImage> {
    let mut img = RgbImage::new(128, 96);
    for y in 30..70 {
        for x in 40..80 {
            img.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    Arc::new(img)
}

fn sourced(frame: Arc<RgbImage>) -> Option<SourcedFrame> {
    Some(SourcedFrame {
        frame,
        captured_at: chrono::Utc::now(),
    })
}

struct Harness {
    session: Arc<SessionHandle>,
    dispatcher: EventDispatcher,
    frames_tx: watch::Sender<Option<SourcedFrame>>,
    shutdown_tx: watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
    dispatcher_worker: tokio::task::JoinHandle<()>,
    media_root: tempfile::TempDir,
}

async fn start_harness(actuator: Arc<Actuator>) -> Harness {
    let media_root = tempfile::tempdir().unwrap();
    let store = Arc::new(FsMediaStore::new(
        media_root.path(),
        media_root.path().join("tmp"),
    ));
    let sink = Arc::new(EventSink::Noop);

    let dispatcher = EventDispatcher::new(DispatcherConfig {
        capacity: 16,
        log_size: (128, 96),
        org_size: (128, 96),
        ..DispatcherConfig::default()
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_worker = dispatcher.spawn_worker(store, sink.clone(), shutdown_rx.clone());

    let detector_config = DetectorConfig {
        working_width: 128,
        working_height: 96,
        median_kernel: 5,
        ..DetectorConfig::default()
    };
    let zones = CameraZones {
        trigger_zone: vec![[0, 0], [127, 0], [127, 95], [0, 95]],
        display_zone: vec![[0, 0], [127, 0], [127, 95], [0, 95]],
    };
    let detector = Arc::new(ZoneDetector::new(
        detector_config,
        zones.trigger_zone.clone(),
    ));

    let session = Arc::new(SessionHandle::new("camera-1".to_string()));
    let (frames_tx, frames_rx) = watch::channel(None);

    let worker = CameraWorker::new(
        session.clone(),
        zones,
        detector,
        Arc::new(NullObjectDetector),
        7,
        actuator,
        dispatcher.clone(),
        sink,
        frames_rx,
    )
    .spawn(shutdown_rx);

    Harness {
        session,
        dispatcher,
        frames_tx,
        shutdown_tx,
        worker,
        dispatcher_worker,
        media_root,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn intrusion_actuates_coil_and_archives_image() {
    let (plc_port, writes) = mock_plc().await;
    let registry = CoilStateRegistry::new();
    let plc_config = PlcConfig {
        host: "127.0.0.1".to_string(),
        port: plc_port,
        unit_id: 1,
        coil_address: COIL_ADDRESS,
        status_address: None,
    };
    let controller = PlcCoilController::new(&plc_config, &registry).await;
    let harness = start_harness(Arc::new(Actuator::Coil(controller))).await;

    // First frame seeds the baseline.
    harness.frames_tx.send(sourced(black_frame())).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Object appears inside the trigger polygon.
    harness.frames_tx.send(sourced(intrusion_frame())).unwrap();

    let session = harness.session.clone();
    wait_for(|| session.recording(), "alarm to raise").await;

    // One ON write: function 0x05, the configured address, value 0xFF00.
    {
        let writes = writes.lock().await;
        assert_eq!(writes.len(), 1);
        let addr = COIL_ADDRESS.to_be_bytes();
        assert_eq!(writes[0], vec![0x05, addr[0], addr[1], 0xFF, 0x00]);
    }

    // A second intrusion frame in the same episode raises nothing new.
    harness.frames_tx.send(sourced(intrusion_frame())).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(writes.lock().await.len(), 1);

    harness.shutdown_tx.send(true).unwrap();
    harness.worker.await.unwrap();
    harness.dispatcher_worker.await.unwrap();

    // Exactly one image event was processed and its artifacts persisted.
    let stats = harness.dispatcher.stats().await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.dropped, 0);

    let camera_dir = harness
        .media_root
        .path()
        .join("images/motion-detections/camera-1");
    let entries: Vec<_> = std::fs::read_dir(&camera_dir)
        .expect("image directory created")
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().any(|n| n.ends_with("_org.jpg")));
    assert!(entries
        .iter()
        .all(|n| n.starts_with("motion-detections_camera-1_")));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_recording_fills_and_flushes_buffer() {
    let harness = start_harness(Arc::new(Actuator::Noop)).await;

    // Seed the baseline, then request a manual recording.
    harness.frames_tx.send(sourced(black_frame())).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.session.set_manual_recording(true);

    // Quiet frames: no alarm, but the evidence buffer fills (fallback
    // capacity while fps is unmeasured) and flushes exactly once.
    let session = harness.session.clone();
    for _ in 0..200 {
        if !session.capturing() {
            break;
        }
        harness.frames_tx.send(sourced(black_frame())).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!session.capturing(), "buffer flush should clear the flags");

    harness.shutdown_tx.send(true).unwrap();
    harness.worker.await.unwrap();
    harness.dispatcher_worker.await.unwrap();

    // The completed clip reached the dispatcher (mux success depends on the
    // host's ffmpeg, so only queue accounting is asserted).
    let stats = harness.dispatcher.stats().await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.queued, 0);
}
