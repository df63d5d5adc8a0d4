//! MAVLink Vehicle Link
//!
//! Drives an ArduPilot flight controller over MAVLink (serial, UDP or TCP).
//! A reader thread feeds incoming messages into a status cache; commands are
//! sent from the caller's task and, where the autopilot acknowledges them,
//! wait for the COMMAND_ACK.

mod commands;
mod status;

pub use commands::{ArduPilotMode, MavCommandBuilder};
pub use status::{StatusCache, StatusValues};

use super::{FrameSource, LinkError, LinkResult, NoVideo, VehicleLink};
use async_trait::async_trait;
use commands::message_id;
use groundctl_shared::{MoveDirection, RotateDirection};
use mavlink::ardupilotmega::{MavCmd, MavMessage, MavResult};
use mavlink::{MavConnection, MavHeader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Connection = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// Connection type for flight controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FcConnectionType {
    /// Serial port connection (e.g., "/dev/ttyACM0" or "/dev/serial0")
    Serial { port: String, baud: u32 },
    /// Listen for UDP (e.g., "0.0.0.0:14550")
    Udp { address: String },
    /// TCP client (e.g., "127.0.0.1:5760")
    Tcp { address: String },
}

impl FcConnectionType {
    /// Address string understood by `mavlink::connect`
    pub fn address(&self) -> String {
        match self {
            FcConnectionType::Serial { port, baud } => format!("serial:{}:{}", port, baud),
            FcConnectionType::Udp { address } => format!("udpin:{}", address),
            FcConnectionType::Tcp { address } => format!("tcpout:{}", address),
        }
    }
}

impl Default for FcConnectionType {
    fn default() -> Self {
        // Default to SITL UDP for development
        Self::Udp {
            address: "0.0.0.0:14550".into(),
        }
    }
}

/// Configuration for the MAVLink link
#[derive(Debug, Clone)]
pub struct MavlinkConfig {
    /// Connection type and parameters
    pub connection: FcConnectionType,
    /// System ID for this ground station
    pub system_id: u8,
    /// Component ID for this ground station
    pub component_id: u8,
    /// Target system ID (flight controller)
    pub target_system: u8,
    /// Target component ID (autopilot)
    pub target_component: u8,
    /// Altitude to climb to on takeoff (m)
    pub takeoff_altitude_m: f32,
    /// Yaw rate for rotations (deg/s)
    pub yaw_rate_deg_s: f32,
    /// Vehicle silence after which the link counts as lost
    pub link_timeout: Duration,
    /// How long to wait for a COMMAND_ACK
    pub ack_timeout: Duration,
    /// Rate of our own heartbeat
    pub heartbeat_interval: Duration,
    /// Rate at which status messages are requested (Hz)
    pub status_rate_hz: f32,
}

impl Default for MavlinkConfig {
    fn default() -> Self {
        Self {
            connection: FcConnectionType::default(),
            system_id: 255,    // Ground station
            component_id: 190, // MAV_COMP_ID_MISSIONPLANNER
            target_system: 1,
            target_component: 1, // MAV_COMP_ID_AUTOPILOT1
            takeoff_altitude_m: 1.2,
            yaw_rate_deg_s: 30.0,
            link_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(1),
            status_rate_hz: 4.0,
        }
    }
}

/// Vehicle link over MAVLink
pub struct MavlinkLink {
    config: MavlinkConfig,
    commands: MavCommandBuilder,
    connection: Option<Connection>,
    status: Arc<StatusCache>,
    /// Cleared to stop the reader thread and heartbeat task
    running: Arc<AtomicBool>,
    heartbeat: Option<JoinHandle<()>>,
}

impl MavlinkLink {
    pub fn new(config: MavlinkConfig) -> Self {
        Self {
            commands: MavCommandBuilder::new(config.target_system, config.target_component),
            status: Arc::new(StatusCache::new(config.target_system)),
            config,
            connection: None,
            running: Arc::new(AtomicBool::new(false)),
            heartbeat: None,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &MavlinkConfig {
        &self.config
    }

    fn header(&self) -> MavHeader {
        MavHeader {
            system_id: self.config.system_id,
            component_id: self.config.component_id,
            sequence: 0, // Will be set by connection
        }
    }

    fn connection(&self) -> LinkResult<&Connection> {
        self.connection.as_ref().ok_or(LinkError::NotConnected)
    }

    /// Send a message on a live link
    fn send(&self, msg: &MavMessage) -> LinkResult<()> {
        let conn = self.connection()?;
        self.status.check_alive(self.config.link_timeout)?;
        conn.send(&self.header(), msg)
            .map(|_| ())
            .map_err(|e| LinkError::Io(e.to_string()))
    }

    /// Send a COMMAND_LONG and wait for the autopilot to accept it
    async fn send_acked(&self, command: MavCmd, msg: &MavMessage) -> LinkResult<()> {
        self.status.clear_ack(command);
        self.send(msg)?;

        let deadline = tokio::time::Instant::now() + self.config.ack_timeout;
        loop {
            match self.status.ack(command) {
                Some(MavResult::MAV_RESULT_ACCEPTED) => return Ok(()),
                Some(MavResult::MAV_RESULT_IN_PROGRESS) => {}
                Some(result) => {
                    return Err(LinkError::Rejected(format!("{:?}: {:?}", command, result)))
                }
                None => {}
            }

            if tokio::time::Instant::now() >= deadline {
                // A silent vehicle is a lost link, a live one just ignored us
                self.status.check_alive(self.config.link_timeout)?;
                return Err(LinkError::Rejected(format!("{:?}: no acknowledgement", command)));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn values(&self) -> LinkResult<StatusValues> {
        self.connection()?;
        self.status.values(self.config.link_timeout)
    }

    async fn wait_for_heartbeat(&self) -> LinkResult<()> {
        let deadline = tokio::time::Instant::now() + self.config.link_timeout;
        while !self.status.has_heartbeat() {
            if tokio::time::Instant::now() >= deadline {
                return Err(LinkError::Lost(
                    "no heartbeat from flight controller".into(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    fn request_streams(&self) -> LinkResult<()> {
        let rate = self.config.status_rate_hz;
        for id in [
            message_id::SYS_STATUS,
            message_id::SCALED_PRESSURE,
            message_id::ATTITUDE,
            message_id::GLOBAL_POSITION_INT,
            message_id::DISTANCE_SENSOR,
        ] {
            self.send(&self.commands.request_interval(id, rate))?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
        self.connection = None;
    }
}

impl Drop for MavlinkLink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl VehicleLink for MavlinkLink {
    async fn connect(&mut self) -> LinkResult<()> {
        let address = self.config.connection.address();
        info!("[MAVLink] Connecting to flight controller at {}", address);

        let conn = tokio::task::spawn_blocking(move || mavlink::connect::<MavMessage>(&address))
            .await
            .map_err(|e| LinkError::Io(e.to_string()))?
            .map_err(|e| LinkError::Io(format!("connect failed: {}", e)))?;
        let conn: Connection = Arc::from(conn);

        self.status = Arc::new(StatusCache::new(self.config.target_system));
        self.running = Arc::new(AtomicBool::new(true));

        let reader_conn = conn.clone();
        let reader_status = self.status.clone();
        let reader_running = self.running.clone();
        std::thread::Builder::new()
            .name("mavlink-reader".into())
            .spawn(move || read_loop(reader_conn, reader_status, reader_running))
            .map_err(|e| LinkError::Io(e.to_string()))?;

        let hb_conn = conn.clone();
        let hb_running = self.running.clone();
        let header = self.header();
        let period = self.config.heartbeat_interval;
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let heartbeat = commands::gcs_heartbeat();
            while hb_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(e) = hb_conn.send(&header, &heartbeat) {
                    debug!("[MAVLink] Heartbeat send failed: {}", e);
                }
            }
        }));

        self.connection = Some(conn);

        if let Err(e) = self.wait_for_heartbeat().await {
            self.stop();
            return Err(e);
        }
        self.request_streams()?;

        info!("[MAVLink] Connected to flight controller");
        Ok(())
    }

    async fn disconnect(&mut self) -> LinkResult<()> {
        self.connection()?;
        self.stop();
        info!("[MAVLink] Disconnected");
        Ok(())
    }

    async fn enable_video(&mut self) -> LinkResult<()> {
        self.connection()?;
        debug!("[MAVLink] No video channel on this link");
        Ok(())
    }

    async fn disable_video(&mut self) -> LinkResult<()> {
        self.connection()?;
        Ok(())
    }

    async fn takeoff(&mut self) -> LinkResult<()> {
        info!(
            "[MAVLink] Takeoff to {}m",
            self.config.takeoff_altitude_m
        );
        self.send_acked(
            MavCmd::MAV_CMD_DO_SET_MODE,
            &self.commands.set_mode(ArduPilotMode::Guided),
        )
        .await?;
        self.send_acked(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, &self.commands.arm())
            .await?;
        self.send_acked(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            &self.commands.takeoff(self.config.takeoff_altitude_m),
        )
        .await
    }

    async fn land(&mut self) -> LinkResult<()> {
        info!("[MAVLink] Land");
        self.send_acked(MavCmd::MAV_CMD_NAV_LAND, &self.commands.land())
            .await
    }

    async fn move_by(&mut self, direction: MoveDirection, distance_cm: u32) -> LinkResult<()> {
        info!("[MAVLink] Move {:?} {}cm", direction, distance_cm);
        // Position targets are not acknowledged
        self.send(&self.commands.move_body(direction, distance_cm))
    }

    async fn rotate(&mut self, direction: RotateDirection, degrees: u32) -> LinkResult<()> {
        info!("[MAVLink] Rotate {:?} {}deg", direction, degrees);
        self.send_acked(
            MavCmd::MAV_CMD_CONDITION_YAW,
            &self
                .commands
                .rotate(direction, degrees, self.config.yaw_rate_deg_s),
        )
        .await
    }

    async fn get_battery(&mut self) -> LinkResult<u8> {
        Ok(self.values()?.battery)
    }

    async fn get_height(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.height_cm)
    }

    async fn get_tof_altitude(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.tof_cm)
    }

    async fn get_barometer(&mut self) -> LinkResult<f32> {
        Ok(self.values()?.pressure_hpa)
    }

    async fn get_temperature(&mut self) -> LinkResult<f32> {
        Ok(self.values()?.temperature_c)
    }

    async fn get_pitch(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.pitch_deg)
    }

    async fn get_roll(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.roll_deg)
    }

    async fn get_yaw(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.yaw_deg)
    }

    async fn get_speed_x(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.vx_cm_s)
    }

    async fn get_speed_y(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.vy_cm_s)
    }

    async fn get_speed_z(&mut self) -> LinkResult<i32> {
        Ok(self.values()?.vz_cm_s)
    }

    fn frame_source(&self) -> Arc<dyn FrameSource> {
        Arc::new(NoVideo)
    }

    fn name(&self) -> &'static str {
        "mavlink"
    }
}

/// Reader thread: feed every incoming message into the status cache
///
/// `recv` blocks, so this runs on its own OS thread rather than the runtime.
fn read_loop(conn: Connection, status: Arc<StatusCache>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match conn.recv() {
            Ok((header, msg)) => status.apply(&header, &msg),
            Err(mavlink::error::MessageReadError::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // No data available, continue
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(mavlink::error::MessageReadError::Io(e)) => {
                warn!("[MAVLink] Read error: {}", e);
                status.mark_lost(e.to_string());
                break;
            }
            Err(e) => {
                // Corrupt frame, keep reading
                debug!("[MAVLink] Dropped message: {}", e);
            }
        }
    }
    debug!("[MAVLink] Reader stopped");
}
