//! Alarm State Machine
//!
//! Per-camera transition logic between `SAFE` and `ALARM`. Consumes one zone
//! decision per frame and answers with the side effects the camera loop must
//! apply: an optional coil command edge, whether to emit image evidence, and
//! whether evidence recording starts.
//!
//! The machine itself is pure state so every transition rule is directly
//! testable; ordering of the side effects (coil write strictly before the
//! evidence enqueue) is enforced by the caller.

use serde::Serialize;

/// Externally visible alarm state of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    /// No recent intrusion.
    Safe,
    /// Object currently inside the trigger zone.
    Alarm,
    /// Zone is clear but the hysteresis window has not elapsed.
    Clearing,
}

impl AlarmStatus {
    /// Whether the danger overlay is shown for this state.
    pub fn is_danger(&self) -> bool {
        !matches!(self, AlarmStatus::Safe)
    }
}

/// Desired coil edge produced by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoilCommand {
    On,
    Off,
}

/// What the camera loop must do for this frame, in order: apply `command`,
/// then emit evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmDecision {
    pub status: AlarmStatus,
    pub command: Option<CoilCommand>,
    /// Enqueue an image event with this frame's raw + annotated pair.
    pub emit_image: bool,
    /// Begin (or re-confirm) evidence recording.
    pub start_recording: bool,
}

/// Per-camera alarm state machine.
pub struct AlarmStateMachine {
    /// Consecutive clear frames required to leave alarm state.
    clear_threshold: u32,
    /// Pre-seeded at the threshold so the first frame is trusted as safe.
    consecutive_clear_frames: u32,
    /// Per-second dedup gate for raising alarms.
    last_alarm_epoch_second: i64,
    /// Whether ON has been issued for the current alarm episode.
    actuator_armed: bool,
}

impl AlarmStateMachine {
    pub fn new(clear_threshold: u32) -> Self {
        Self {
            clear_threshold,
            consecutive_clear_frames: clear_threshold,
            last_alarm_epoch_second: 0,
            actuator_armed: false,
        }
    }

    pub fn armed(&self) -> bool {
        self.actuator_armed
    }

    /// Advance the machine by one frame decision.
    ///
    /// `epoch_second` is the current wall-clock unix second; alarms within
    /// one second dedup to a single coil ON, but a continuous intrusion can
    /// still raise again in a later second once the actuator has disarmed.
    pub fn on_detection(&mut self, inside_zone: bool, epoch_second: i64) -> AlarmDecision {
        if inside_zone {
            self.consecutive_clear_frames = 0;

            if !self.actuator_armed && epoch_second != self.last_alarm_epoch_second {
                self.last_alarm_epoch_second = epoch_second;
                self.actuator_armed = true;
                return AlarmDecision {
                    status: AlarmStatus::Alarm,
                    command: Some(CoilCommand::On),
                    emit_image: true,
                    start_recording: true,
                };
            }

            AlarmDecision {
                status: AlarmStatus::Alarm,
                command: None,
                emit_image: false,
                start_recording: false,
            }
        } else {
            self.consecutive_clear_frames = self.consecutive_clear_frames.saturating_add(1);

            if self.consecutive_clear_frames >= self.clear_threshold {
                let command = if self.actuator_armed {
                    Some(CoilCommand::Off)
                } else {
                    None
                };
                self.actuator_armed = false;
                AlarmDecision {
                    status: AlarmStatus::Safe,
                    command,
                    emit_image: false,
                    start_recording: false,
                }
            } else {
                AlarmDecision {
                    status: AlarmStatus::Clearing,
                    command: None,
                    emit_image: false,
                    start_recording: false,
                }
            }
        }
    }
}
