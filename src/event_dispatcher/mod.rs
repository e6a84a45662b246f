//! Event Dispatcher - Evidence Queue and Worker
//!
//! ## Responsibilities
//!
//! - Accept evidence events from every camera session without ever blocking
//!   the detection path
//! - Bounded queue, drop-oldest on overflow with a dropped-event counter
//! - One worker draining strictly in arrival order: resize, persist via the
//!   media store, notify the backend
//! - Bounded best-effort drain on shutdown
//!
//! Persist/notify failures are logged and the event is dropped; evidence may
//! be lost on transient network failure, which is accepted rather than
//! escalated.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{imageops, RgbImage};
use serde::Serialize;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::backend_client::{EventMessage, EventSink};
use crate::error::Result;
use crate::media_store::{ArtifactId, FsMediaStore};

/// Evidence payloads owned by the queue until processed.
pub enum EvidenceEvent {
    Image {
        camera_id: String,
        timestamp_secs: i64,
        raw: Arc<RgbImage>,
        annotated: Arc<RgbImage>,
    },
    Video {
        camera_id: String,
        timestamp_secs: i64,
        raw_frames: Vec<Arc<RgbImage>>,
        annotated_frames: Vec<Arc<RgbImage>>,
        fps: u32,
    },
}

impl EvidenceEvent {
    fn camera_id(&self) -> &str {
        match self {
            EvidenceEvent::Image { camera_id, .. } => camera_id,
            EvidenceEvent::Video { camera_id, .. } => camera_id,
        }
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Queue capacity before drop-oldest kicks in.
    pub capacity: usize,
    /// Output size for annotated (log) artifacts.
    pub log_size: (u32, u32),
    /// Output size for raw (org) artifacts.
    pub org_size: (u32, u32),
    /// Backend event type code.
    pub msg_type: i32,
    pub module_id: String,
    /// Host name reported for video artifacts.
    pub host_dns: String,
    /// Budget for the final drain on shutdown.
    pub drain_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            log_size: (1280, 720),
            org_size: (1280, 720),
            msg_type: 2,
            module_id: "motion-detections".to_string(),
            host_dns: "localhost".to_string(),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Queue health surfaced on the status API.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub queued: usize,
    pub dropped: u64,
    pub processed: u64,
}

struct DispatchShared {
    config: DispatcherConfig,
    queue: Mutex<VecDeque<EvidenceEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    processed: AtomicU64,
}

/// Cloneable producer/observer handle.
#[derive(Clone)]
pub struct EventDispatcher {
    shared: Arc<DispatchShared>,
}

impl EventDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            shared: Arc::new(DispatchShared {
                config,
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
                processed: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue an event. Returns immediately; at capacity the oldest queued
    /// event is dropped and counted.
    pub async fn enqueue(&self, event: EvidenceEvent) {
        {
            let mut queue = self.shared.queue.lock().await;
            if queue.len() >= self.shared.config.capacity {
                if let Some(victim) = queue.pop_front() {
                    let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        camera_id = %victim.camera_id(),
                        dropped_total = dropped,
                        "Evidence queue full, dropped oldest event"
                    );
                }
            }
            queue.push_back(event);
        }
        self.shared.notify.notify_one();
    }

    pub async fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queued: self.shared.queue.lock().await.len(),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            processed: self.shared.processed.load(Ordering::Relaxed),
        }
    }

    async fn pop(&self) -> Option<EvidenceEvent> {
        self.shared.queue.lock().await.pop_front()
    }

    /// Start the single worker. Events are processed strictly in arrival
    /// order; on shutdown the remaining queue is drained within the
    /// configured budget.
    pub fn spawn_worker(
        &self,
        store: Arc<FsMediaStore>,
        sink: Arc<EventSink>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();

        tokio::spawn(async move {
            tracing::info!("Event dispatcher worker started");

            loop {
                while let Some(event) = dispatcher.pop().await {
                    dispatcher.process(&store, &sink, event).await;
                }

                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    _ = dispatcher.shared.notify.notified() => {}
                    _ = shutdown.changed() => {}
                }
            }

            // Best-effort bounded drain of whatever is still queued.
            let drain = async {
                while let Some(event) = dispatcher.pop().await {
                    dispatcher.process(&store, &sink, event).await;
                }
            };
            if tokio::time::timeout(dispatcher.shared.config.drain_timeout, drain)
                .await
                .is_err()
            {
                let left = dispatcher.shared.queue.lock().await.len();
                tracing::warn!(remaining = left, "Dispatcher drain budget exceeded");
            }

            tracing::info!("Event dispatcher worker stopped");
        })
    }

    async fn process(&self, store: &FsMediaStore, sink: &EventSink, event: EvidenceEvent) {
        let camera_id = event.camera_id().to_string();
        if let Err(e) = self.try_process(store, sink, event).await {
            tracing::error!(camera_id = %camera_id, error = %e, "Evidence event dropped");
        }
        self.shared.processed.fetch_add(1, Ordering::Relaxed);
    }

    async fn try_process(
        &self,
        store: &FsMediaStore,
        sink: &EventSink,
        event: EvidenceEvent,
    ) -> Result<()> {
        let config = &self.shared.config;

        match event {
            EvidenceEvent::Image {
                camera_id,
                timestamp_secs,
                raw,
                annotated,
            } => {
                let id = ArtifactId::new(&config.module_id, &camera_id, timestamp_secs);
                let log_frame = resize_to(&annotated, config.log_size);
                let org_frame = resize_to(&raw, config.org_size);

                let stored = store.store_image(&id, &log_frame, &org_frame).await?;
                tracing::debug!(camera_id = %camera_id, uri = %stored.log_uri, "Image evidence stored");

                sink.post_image_event(&EventMessage {
                    camera_id,
                    module_id: config.module_id.clone(),
                    timestamp: timestamp_secs,
                    image_uri: Some(stored.log_uri),
                    video_uri: None,
                    msg_type: config.msg_type,
                    dns: None,
                })
                .await
            }
            EvidenceEvent::Video {
                camera_id,
                timestamp_secs,
                raw_frames,
                annotated_frames,
                fps,
            } => {
                let id = ArtifactId::new(&config.module_id, &camera_id, timestamp_secs);
                let log_frames: Vec<Arc<RgbImage>> = annotated_frames
                    .iter()
                    .map(|f| Arc::new(resize_to(f, config.log_size)))
                    .collect();
                let org_frames: Vec<Arc<RgbImage>> = raw_frames
                    .iter()
                    .map(|f| Arc::new(resize_to(f, config.org_size)))
                    .collect();

                let stored = store.store_clip(&id, &log_frames, &org_frames, fps).await?;
                tracing::debug!(camera_id = %camera_id, uri = %stored.log_uri, "Video evidence stored");

                sink.post_video_event(&EventMessage {
                    camera_id,
                    module_id: config.module_id.clone(),
                    timestamp: timestamp_secs,
                    image_uri: None,
                    video_uri: Some(stored.log_uri),
                    msg_type: config.msg_type,
                    dns: Some(config.host_dns.clone()),
                })
                .await
            }
        }
    }
}

fn resize_to(frame: &RgbImage, (w, h): (u32, u32)) -> RgbImage {
    if frame.width() == w && frame.height() == h {
        frame.clone()
    } else {
        imageops::resize(frame, w, h, imageops::FilterType::Triangle)
    }
}
