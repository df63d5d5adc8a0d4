//! MAVLink Status Cache
//!
//! Keeps the latest value of every status field the link reports, fed by the
//! reader thread and read by the status getters.

use crate::link::{LinkError, LinkResult};
use mavlink::ardupilotmega::{MavCmd, MavMessage, MavResult};
use mavlink::MavHeader;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Latest status values, already converted to link units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusValues {
    pub battery: u8,
    pub height_cm: i32,
    pub tof_cm: i32,
    pub pressure_hpa: f32,
    pub temperature_c: f32,
    pub pitch_deg: i32,
    pub roll_deg: i32,
    pub yaw_deg: i32,
    pub vx_cm_s: i32,
    pub vy_cm_s: i32,
    pub vz_cm_s: i32,
    pub armed: bool,
    pub custom_mode: u32,
}

#[derive(Debug, Default)]
struct StatusInner {
    values: StatusValues,
    last_heartbeat: Option<Instant>,
    lost: Option<String>,
    acks: Vec<(MavCmd, MavResult)>,
}

/// Thread-safe cache of flight controller status
#[derive(Debug)]
pub struct StatusCache {
    /// System ID of the vehicle; messages from other systems are ignored
    target_system: u8,
    inner: RwLock<StatusInner>,
}

impl StatusCache {
    pub fn new(target_system: u8) -> Self {
        Self {
            target_system,
            inner: RwLock::new(StatusInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StatusInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatusInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process a MAVLink message and update the cache
    pub fn apply(&self, header: &MavHeader, msg: &MavMessage) {
        if header.system_id != self.target_system {
            return;
        }

        let mut guard = self.write();
        let inner = &mut *guard;
        let values = &mut inner.values;

        match msg {
            MavMessage::HEARTBEAT(hb) => {
                values.armed = (hb.base_mode.bits() & 0x80) != 0; // MAV_MODE_FLAG_SAFETY_ARMED
                values.custom_mode = hb.custom_mode;
                inner.last_heartbeat = Some(Instant::now());
            }

            MavMessage::SYS_STATUS(sys) => {
                // -1 means the autopilot doesn't know
                if sys.battery_remaining >= 0 {
                    values.battery = sys.battery_remaining as u8;
                }
            }

            MavMessage::GLOBAL_POSITION_INT(pos) => {
                values.height_cm = pos.relative_alt / 10; // mm to cm
                values.vx_cm_s = pos.vx as i32;
                values.vy_cm_s = pos.vy as i32;
                values.vz_cm_s = pos.vz as i32;
            }

            MavMessage::ATTITUDE(att) => {
                values.pitch_deg = att.pitch.to_degrees().round() as i32;
                values.roll_deg = att.roll.to_degrees().round() as i32;
                values.yaw_deg = att.yaw.to_degrees().round() as i32;
            }

            MavMessage::SCALED_PRESSURE(p) => {
                values.pressure_hpa = p.press_abs;
                values.temperature_c = p.temperature as f32 / 100.0; // cdegC to degC
            }

            MavMessage::DISTANCE_SENSOR(d) => {
                // Assumes the only rangefinder points down
                values.tof_cm = d.current_distance as i32;
            }

            MavMessage::COMMAND_ACK(ack) => {
                inner.acks.retain(|(cmd, _)| *cmd != ack.command);
                inner.acks.push((ack.command, ack.result));
            }

            _ => {
                // Other messages we don't process
            }
        }
    }

    /// Record that the reader lost the connection
    pub fn mark_lost(&self, reason: impl Into<String>) {
        self.write().lost = Some(reason.into());
    }

    pub fn has_heartbeat(&self) -> bool {
        self.read().last_heartbeat.is_some()
    }

    /// Fail if the link is gone or the vehicle has gone quiet
    pub fn check_alive(&self, timeout: Duration) -> LinkResult<()> {
        let inner = self.read();

        if let Some(ref reason) = inner.lost {
            return Err(LinkError::Lost(reason.clone()));
        }

        match inner.last_heartbeat {
            Some(at) if at.elapsed() > timeout => Err(LinkError::Lost(format!(
                "no heartbeat for {:.1}s",
                at.elapsed().as_secs_f32()
            ))),
            Some(_) => Ok(()),
            None => Err(LinkError::Lost("no heartbeat received".into())),
        }
    }

    /// Current values, if the link is alive
    pub fn values(&self, timeout: Duration) -> LinkResult<StatusValues> {
        self.check_alive(timeout)?;
        Ok(self.read().values)
    }

    /// Forget any earlier acknowledgement for `command`
    pub fn clear_ack(&self, command: MavCmd) {
        self.write().acks.retain(|(cmd, _)| *cmd != command);
    }

    /// Latest acknowledgement result for `command`
    pub fn ack(&self, command: MavCmd) -> Option<MavResult> {
        self.read()
            .acks
            .iter()
            .find(|(cmd, _)| *cmd == command)
            .map(|(_, result)| *result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::ardupilotmega::{ATTITUDE_DATA, SCALED_PRESSURE_DATA};

    fn header(system_id: u8) -> MavHeader {
        MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        }
    }

    #[test]
    fn test_requires_heartbeat() {
        let cache = StatusCache::new(1);
        assert!(!cache.has_heartbeat());
        assert!(matches!(
            cache.values(Duration::from_secs(5)),
            Err(LinkError::Lost(_))
        ));
    }

    #[test]
    fn test_converts_units() {
        let cache = StatusCache::new(1);
        cache.apply(
            &header(1),
            &MavMessage::ATTITUDE(ATTITUDE_DATA {
                time_boot_ms: 0,
                roll: 0.0,
                pitch: std::f32::consts::FRAC_PI_4,
                yaw: -std::f32::consts::FRAC_PI_2,
                ..Default::default()
            }),
        );
        cache.apply(
            &header(1),
            &MavMessage::SCALED_PRESSURE(SCALED_PRESSURE_DATA {
                time_boot_ms: 0,
                press_abs: 1009.5,
                temperature: 2315,
                ..Default::default()
            }),
        );

        let inner = cache.read();
        assert_eq!(inner.values.pitch_deg, 45);
        assert_eq!(inner.values.yaw_deg, -90);
        assert_eq!(inner.values.pressure_hpa, 1009.5);
        assert_eq!(inner.values.temperature_c, 23.15);
    }

    #[test]
    fn test_ignores_other_systems() {
        let cache = StatusCache::new(1);
        cache.apply(
            &header(42),
            &MavMessage::SCALED_PRESSURE(SCALED_PRESSURE_DATA {
                time_boot_ms: 0,
                press_abs: 900.0,
                ..Default::default()
            }),
        );
        assert_eq!(cache.read().values, StatusValues::default());
    }

    #[test]
    fn test_lost_link_reported() {
        let cache = StatusCache::new(1);
        cache.mark_lost("socket closed");
        assert_eq!(
            cache.check_alive(Duration::from_secs(5)),
            Err(LinkError::Lost("socket closed".into()))
        );
    }
}
