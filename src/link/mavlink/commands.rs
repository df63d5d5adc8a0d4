//! MAVLink Command Translation
//!
//! Builds the MAVLink messages behind each vehicle link call.

use groundctl_shared::{MoveDirection, RotateDirection};
use mavlink::ardupilotmega::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType,
    PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
};

/// Type mask that makes a position target use x/y/z only
/// (velocity, acceleration, yaw and yaw-rate ignored)
const POSITION_ONLY_MASK: u16 = 0x0DF8;

/// MAVLink message IDs the status cache listens to
pub mod message_id {
    pub const SYS_STATUS: u32 = 1;
    pub const SCALED_PRESSURE: u32 = 29;
    pub const ATTITUDE: u32 = 30;
    pub const GLOBAL_POSITION_INT: u32 = 33;
    pub const DISTANCE_SENSOR: u32 = 132;
}

/// Builds messages addressed to one flight controller
#[derive(Debug, Clone, Copy)]
pub struct MavCommandBuilder {
    target_system: u8,
    target_component: u8,
}

impl MavCommandBuilder {
    /// Create a new command builder
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
        }
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        })
    }

    /// Arm the motors
    pub fn arm(&self) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], // 1 = arm
        )
    }

    /// Switch flight mode
    pub fn set_mode(&self, mode: ArduPilotMode) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [
                1.0, // MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
                mode as u32 as f32,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
            ],
        )
    }

    /// Take off to `altitude_m` above the current position
    pub fn takeoff(&self, altitude_m: f32) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [
                0.0,        // Minimum pitch
                0.0,        // Empty
                0.0,        // Empty
                f32::NAN,   // Yaw angle (NAN = current)
                f32::NAN,   // Latitude (NAN = current)
                f32::NAN,   // Longitude (NAN = current)
                altitude_m, // Altitude
            ],
        )
    }

    /// Land at current position
    pub fn land(&self) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_NAV_LAND,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, 0.0],
        )
    }

    /// Position offset in the body frame (x forward, y right, z down)
    pub fn move_body(&self, direction: MoveDirection, distance_cm: u32) -> MavMessage {
        let metres = distance_cm as f32 / 100.0;
        let (x, y) = match direction {
            MoveDirection::Forward => (metres, 0.0),
            MoveDirection::Back => (-metres, 0.0),
            MoveDirection::Right => (0.0, metres),
            MoveDirection::Left => (0.0, -metres),
        };

        MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
            time_boot_ms: 0,
            x,
            y,
            z: 0.0,
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: 0.0,
            type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_ONLY_MASK),
            target_system: self.target_system,
            target_component: self.target_component,
            coordinate_frame: MavFrame::MAV_FRAME_BODY_OFFSET_NED,
        })
    }

    /// Relative yaw turn
    pub fn rotate(&self, direction: RotateDirection, degrees: u32, rate_deg_s: f32) -> MavMessage {
        let sense = match direction {
            RotateDirection::Clockwise => 1.0,
            RotateDirection::CounterClockwise => -1.0,
        };

        self.command_long(
            MavCmd::MAV_CMD_CONDITION_YAW,
            [
                degrees as f32,
                rate_deg_s,
                sense,
                1.0, // Relative to current heading
                0.0,
                0.0,
                0.0,
            ],
        )
    }

    /// Ask the flight controller to stream `message` at `hz`
    pub fn request_interval(&self, message: u32, hz: f32) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [message as f32, 1_000_000.0 / hz, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }
}

/// Heartbeat announcing this node as a ground station
pub fn gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

/// ArduPilot Copter flight modes used by the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArduPilotMode {
    Stabilize = 0,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Land = 9,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ardupilot_modes() {
        assert_eq!(ArduPilotMode::Guided as u32, 4);
        assert_eq!(ArduPilotMode::Land as u32, 9);
    }

    #[test]
    fn test_rotate_direction_sign() {
        let builder = MavCommandBuilder::new(1, 1);
        match builder.rotate(RotateDirection::CounterClockwise, 90, 30.0) {
            MavMessage::COMMAND_LONG(cmd) => {
                assert_eq!(cmd.command, MavCmd::MAV_CMD_CONDITION_YAW);
                assert_eq!(cmd.param1, 90.0);
                assert_eq!(cmd.param3, -1.0);
                assert_eq!(cmd.param4, 1.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_move_body_offsets() {
        let builder = MavCommandBuilder::new(1, 1);
        match builder.move_body(MoveDirection::Left, 150) {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(target) => {
                assert_eq!(target.x, 0.0);
                assert_eq!(target.y, -1.5);
                assert_eq!(target.coordinate_frame, MavFrame::MAV_FRAME_BODY_OFFSET_NED);
                assert_eq!(target.target_system, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_request_interval_period() {
        let builder = MavCommandBuilder::new(1, 1);
        match builder.request_interval(message_id::ATTITUDE, 4.0) {
            MavMessage::COMMAND_LONG(cmd) => {
                assert_eq!(cmd.param1, 30.0);
                assert_eq!(cmd.param2, 250_000.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
