//! Application state
//!
//! Holds configuration and the per-camera handles shared between the
//! detection loops and the control plane.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::actuator::{CoilMonitor, PlcConfig};
use crate::alarm::AlarmStatus;
use crate::event_dispatcher::EventDispatcher;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Control-plane listen host
    pub host: String,
    /// Control-plane listen port
    pub port: u16,
    /// Backend base URL (roster + event notifications); absent selects the
    /// no-op event sink
    pub backend_url: Option<String>,
    /// Stream manager base URL (frame source + live push)
    pub stream_url: String,
    /// Root directory for evidence media
    pub media_root: PathBuf,
    /// Scratch directory for clip muxing
    pub temp_dir: PathBuf,
    /// Zone configuration file
    pub zones_path: PathBuf,
    /// Module identity in artifact names and stream endpoints
    pub module_id: String,
    /// Backend event type code
    pub msg_type: i32,
    /// This host's name for roster lookup and video DNS reporting
    pub server_name: String,
    /// Frame refresh cadence per camera
    pub refresh_interval_ms: u64,
    /// Explicit camera list overriding the roster service
    pub camera_ids: Option<Vec<String>>,
    /// PLC endpoint; absent selects the no-op actuator
    pub plc: Option<PlcConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let plc = std::env::var("PLC_HOST").ok().map(|host| PlcConfig {
            host,
            port: std::env::var("PLC_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(502),
            unit_id: std::env::var("PLC_UNIT_ID")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1),
            coil_address: std::env::var("PLC_COIL_ADDRESS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8196),
            status_address: std::env::var("PLC_STATUS_ADDRESS")
                .ok()
                .and_then(|p| p.parse().ok()),
        });

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8090),
            backend_url: std::env::var("BACKEND_URL").ok(),
            stream_url: std::env::var("STREAM_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8005".to_string()),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/fenceguard/media")),
            temp_dir: std::env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/fenceguard/temp")),
            zones_path: std::env::var("ZONES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc/fenceguard/zones.json")),
            module_id: std::env::var("MODULE_ID")
                .unwrap_or_else(|_| "motion-detections".to_string()),
            msg_type: std::env::var("MSG_TYPE")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(2),
            server_name: std::env::var("SERVER_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "localhost".to_string()),
            refresh_interval_ms: std::env::var("FRAME_REFRESH_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(100),
            camera_ids: std::env::var("CAMERA_IDS").ok().map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
            plc,
        }
    }
}

/// Per-camera state shared across tasks.
///
/// Owned by the camera's detection loop; the control plane only touches the
/// recording flags, the status API only reads.
pub struct SessionHandle {
    pub camera_id: String,
    /// Zone-triggered evidence capture in progress.
    recording: AtomicBool,
    /// Manually requested capture; kept separate so the zone logic cannot
    /// cancel an operator's request.
    manual_recording: AtomicBool,
    current_fps: AtomicU32,
    status: RwLock<AlarmStatus>,
}

impl SessionHandle {
    pub fn new(camera_id: String) -> Self {
        Self {
            camera_id,
            recording: AtomicBool::new(false),
            manual_recording: AtomicBool::new(false),
            current_fps: AtomicU32::new(0),
            status: RwLock::new(AlarmStatus::Safe),
        }
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn set_recording(&self, value: bool) {
        self.recording.store(value, Ordering::Relaxed);
    }

    pub fn manual_recording(&self) -> bool {
        self.manual_recording.load(Ordering::Relaxed)
    }

    pub fn set_manual_recording(&self, value: bool) {
        self.manual_recording.store(value, Ordering::Relaxed);
    }

    /// Whether any capture (zone-triggered or manual) is active.
    pub fn capturing(&self) -> bool {
        self.recording() || self.manual_recording()
    }

    /// Clear both capture flags after a flush.
    pub fn clear_capture(&self) {
        self.set_recording(false);
        self.set_manual_recording(false);
    }

    pub fn current_fps(&self) -> u32 {
        self.current_fps.load(Ordering::Relaxed)
    }

    pub fn set_current_fps(&self, fps: u32) {
        self.current_fps.store(fps, Ordering::Relaxed);
    }

    pub async fn status(&self) -> AlarmStatus {
        *self.status.read().await
    }

    pub async fn set_status(&self, status: AlarmStatus) {
        *self.status.write().await = status;
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: Arc<AppConfig>,
    /// Per-camera session handles
    pub sessions: Arc<HashMap<String, Arc<SessionHandle>>>,
    /// Evidence dispatcher handle (stats + enqueue)
    pub dispatcher: EventDispatcher,
    /// Coil status poller, present when a PLC is configured
    pub coil_monitor: Option<Arc<CoilMonitor>>,
}
