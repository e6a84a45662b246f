//! Camera Worker - Per-Camera Detection Loop
//!
//! ## Responsibilities
//!
//! - Consume frames at the source's cadence and keep a baseline that
//!   advances once per second
//! - Run the zone detector off the async runtime's worker threads
//! - Apply alarm decisions in the mandated order: coil command strictly
//!   before the evidence enqueue for the same frame
//! - Manage the evidence buffer and the recording flags, measure fps, push
//!   preview frames
//!
//! The loop is its own supervisor: any per-cycle fault (including a panic in
//! the detection task) is logged and the loop continues with the next frame
//! pair. One bad frame must never terminate a camera.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use image::RgbImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::actuator::Actuator;
use crate::alarm::{AlarmStateMachine, CoilCommand};
use crate::backend_client::EventSink;
use crate::config_store::CameraZones;
use crate::error::{Error, Result};
use crate::event_dispatcher::{EventDispatcher, EvidenceEvent};
use crate::evidence_buffer::EvidenceBuffer;
use crate::frame_source::SourcedFrame;
use crate::state::SessionHandle;
use crate::zone_detector::{annotate_status, ObjectDetector, ZoneDetector};

/// How often the diff baseline advances to the current frame.
const BASELINE_REFRESH: Duration = Duration::from_secs(1);

/// CameraWorker instance; owns all mutable per-camera state.
pub struct CameraWorker {
    session: Arc<SessionHandle>,
    zones: CameraZones,
    detector: Arc<ZoneDetector>,
    object_detector: Arc<dyn ObjectDetector>,
    alarm: AlarmStateMachine,
    buffer: EvidenceBuffer,
    actuator: Arc<Actuator>,
    dispatcher: EventDispatcher,
    sink: Arc<EventSink>,
    frames: watch::Receiver<Option<SourcedFrame>>,
}

impl CameraWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<SessionHandle>,
        zones: CameraZones,
        detector: Arc<ZoneDetector>,
        object_detector: Arc<dyn ObjectDetector>,
        clear_frame_threshold: u32,
        actuator: Arc<Actuator>,
        dispatcher: EventDispatcher,
        sink: Arc<EventSink>,
        frames: watch::Receiver<Option<SourcedFrame>>,
    ) -> Self {
        Self {
            session,
            zones,
            detector,
            object_detector,
            alarm: AlarmStateMachine::new(clear_frame_threshold),
            buffer: EvidenceBuffer::new(),
            actuator,
            dispatcher,
            sink,
            frames,
        }
    }

    /// Spawn the detection loop.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let camera_id = self.session.camera_id.clone();
        tracing::info!(camera_id = %camera_id, "Camera worker started");

        let mut baseline: Option<Arc<RgbImage>> = None;
        let mut baseline_at = Instant::now();
        let mut window_start = Instant::now();
        let mut frames_in_window = 0u32;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                changed = self.frames.changed() => {
                    if changed.is_err() {
                        tracing::warn!(camera_id = %camera_id, "Frame source closed");
                        break;
                    }
                }
            }

            let Some(sourced) = self.frames.borrow_and_update().clone() else {
                continue;
            };
            let current = sourced.frame;

            let Some(base) = baseline.clone() else {
                baseline = Some(current);
                baseline_at = Instant::now();
                continue;
            };

            if let Err(e) = self.process_frame(base, current.clone()).await {
                tracing::error!(
                    camera_id = %camera_id,
                    error = %e,
                    "Frame cycle failed, continuing with next frame"
                );
            }

            frames_in_window += 1;
            if window_start.elapsed() >= Duration::from_secs(1) {
                self.session.set_current_fps(frames_in_window);
                // Capacity is pinned for the duration of a clip.
                if self.buffer.is_empty() {
                    self.buffer.set_fps(frames_in_window);
                }
                frames_in_window = 0;
                window_start = Instant::now();
            }

            if baseline_at.elapsed() >= BASELINE_REFRESH {
                baseline = Some(current);
                baseline_at = Instant::now();
            }
        }

        tracing::info!(camera_id = %camera_id, "Camera worker stopped");
    }

    async fn process_frame(&mut self, baseline: Arc<RgbImage>, current: Arc<RgbImage>) -> Result<()> {
        let camera_id = self.session.camera_id.clone();

        let external = self.object_detector.detect(&current);
        let detector = self.detector.clone();
        let detect_current = current.clone();
        let result = tokio::task::spawn_blocking(move || {
            detector.detect(&baseline, &detect_current, &external)
        })
        .await
        .map_err(|e| Error::Detection(format!("detection task panicked: {e}")))?;

        let epoch_second = Utc::now().timestamp();
        let decision = self.alarm.on_detection(result.inside_zone, epoch_second);
        self.session.set_status(decision.status).await;

        let mut annotated = result.annotated;
        annotate_status(
            &mut annotated,
            decision.status.is_danger(),
            &self.zones.display_zone,
        );
        let annotated = Arc::new(annotated);

        // Coil state must be settled before the matching evidence is queued
        // so coil history and artifacts correlate. Actuator failures are
        // logged, not propagated: the alarm episode carries on.
        if let Some(command) = decision.command {
            let desired = matches!(command, CoilCommand::On);
            if let Err(e) = self.actuator.set_state(desired).await {
                tracing::warn!(camera_id = %camera_id, desired, error = %e, "Actuator command failed");
            }
        }

        if decision.start_recording {
            self.session.set_recording(true);
        }

        if decision.emit_image {
            tracing::info!(camera_id = %camera_id, timestamp = epoch_second, "Zone intrusion alarm");
            self.dispatcher
                .enqueue(EvidenceEvent::Image {
                    camera_id: camera_id.clone(),
                    timestamp_secs: epoch_second,
                    raw: current.clone(),
                    annotated: annotated.clone(),
                })
                .await;
        }

        if self.session.capturing() {
            let full = self.buffer.append(current.clone(), annotated.clone());
            if full {
                let clip = self.buffer.flush();
                tracing::info!(
                    camera_id = %camera_id,
                    frames = clip.raw_frames.len(),
                    fps = clip.fps,
                    "Evidence clip completed"
                );
                self.dispatcher
                    .enqueue(EvidenceEvent::Video {
                        camera_id: camera_id.clone(),
                        timestamp_secs: epoch_second,
                        raw_frames: clip.raw_frames,
                        annotated_frames: clip.annotated_frames,
                        fps: clip.fps,
                    })
                    .await;
                self.session.clear_capture();
            }
        }

        self.sink.post_frame(&camera_id, &annotated).await;

        Ok(())
    }
}
