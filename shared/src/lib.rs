//! groundctl shared types
//!
//! This crate provides the operator instruction grammar, the session state
//! machine and the telemetry snapshot codec shared by the ground-control
//! session and its tooling.

pub mod codec;
pub mod instruction;
pub mod state_machine;

use chrono::{DateTime, SubsecRound, Utc};

pub use codec::TelemetryCodecError;
pub use instruction::{
    parse_input, validate, Input, Instruction, MoveDirection, Rejection, RotateDirection,
};
pub use state_machine::{SessionEvent, SessionState, SessionStateMachine, TransitionResult};

/// Current wall-clock time, truncated to the precision the telemetry file keeps
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Limits and defaults for the session
pub mod limits {
    /// Shortest translation the vehicle accepts, in centimetres
    pub const MIN_DISTANCE_CM: u32 = 20;

    /// Longest translation the vehicle accepts, in centimetres
    pub const MAX_DISTANCE_CM: u32 = 500;

    /// Smallest rotation, in degrees
    pub const MIN_ANGLE_DEG: u32 = 1;

    /// Largest rotation, in degrees
    pub const MAX_ANGLE_DEG: u32 = 360;

    /// Telemetry poll interval in milliseconds
    pub const SAMPLE_INTERVAL_MS: u64 = 1000;

    /// File the telemetry log is written to at teardown
    pub const TELEMETRY_FILE: &str = "telemetry_log.csv";
}

/// One reading of every tracked vehicle status field
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    /// Battery charge in percent
    pub battery: u8,
    /// Height above takeoff point (cm)
    pub height: i32,
    /// Time-of-flight sensor distance (cm)
    pub tof_altitude: i32,
    pub barometer: f32,
    /// Temperature in degrees Celsius
    pub temperature: f32,
    /// Attitude in degrees
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
    /// Velocity components (cm/s)
    pub speed_x: i32,
    pub speed_y: i32,
    pub speed_z: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_utc_has_microsecond_precision() {
        let ts = now_utc();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }
}
