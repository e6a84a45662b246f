//! fenceguard - Perimeter Intrusion Detection Service
//!
//! Per camera: compare successive frames, decide whether a moving object has
//! entered a restricted zone, drive a PLC coil on the alarm edge and archive
//! visual evidence.
//!
//! ## Architecture
//!
//! 1. ConfigStore - zone file + camera roster
//! 2. FrameSource - per-camera latest-frame acquisition
//! 3. ZoneDetector - frame diff, box merge, polygon containment
//! 4. AlarmStateMachine - hysteresis, dedup, edge-triggered actuation
//! 5. EvidenceBuffer - bounded clip buffer per camera
//! 6. EventDispatcher - single-consumer evidence queue
//! 7. MediaStore - JPEG/MP4 artifact persistence
//! 8. BackendClient - event notifications + live frame push
//! 9. Actuator - Modbus TCP coil writer with cached-state suppression
//! 10. CameraWorker - supervised per-camera detection loop
//! 11. WebAPI - control plane (status, manual record commands)
//!
//! ## Design Principles
//!
//! - Detection path never blocks on network or disk; all evidence and
//!   hardware I/O happens downstream of the dispatcher queue
//! - Per-camera faults are isolated; one camera can never take down another

pub mod actuator;
pub mod alarm;
pub mod backend_client;
pub mod camera_worker;
pub mod config_store;
pub mod error;
pub mod event_dispatcher;
pub mod evidence_buffer;
pub mod frame_source;
pub mod geometry;
pub mod media_store;
pub mod state;
pub mod web_api;
pub mod zone_detector;

pub use error::{Error, Result};
pub use state::AppState;
