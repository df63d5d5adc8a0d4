//! Simulated vehicle link
//!
//! An in-process vehicle for development and tests. It keeps a simple flight
//! model, honours a configurable per-call latency, and records every call in
//! a timed journal so callers can check what reached the vehicle and that no
//! two calls overlapped.

use super::{FrameSource, LinkError, LinkResult, VehicleLink, VideoFrame};
use async_trait::async_trait;
use bytes::Bytes;
use groundctl_shared::{MoveDirection, RotateDirection};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Height the vehicle climbs to on takeoff (cm)
const TAKEOFF_HEIGHT_CM: i32 = 80;

/// Distance sensor reading while on the ground (cm)
const GROUND_TOF_CM: i32 = 10;

/// Sea-level pressure (hPa)
const SEA_LEVEL_HPA: f32 = 1013.25;

/// Configuration for the simulated vehicle
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Latency of connect/takeoff/land/move/rotate and video toggles
    pub command_latency: Duration,
    /// Latency of each individual status getter
    pub status_latency: Duration,
    /// Time between video frames
    pub frame_interval: Duration,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Starting battery charge (percent)
    pub initial_battery: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            command_latency: Duration::from_millis(50),
            status_latency: Duration::from_millis(2),
            frame_interval: Duration::from_millis(33), // ~30 fps
            frame_width: 960,
            frame_height: 720,
            initial_battery: 100,
        }
    }
}

/// A call the simulated vehicle received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    Connect,
    Disconnect,
    EnableVideo,
    DisableVideo,
    Takeoff,
    Land,
    Move(MoveDirection, u32),
    Rotate(RotateDirection, u32),
    /// Status getter, by field name
    Status(&'static str),
}

/// Kinds of calls a fault can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Connect,
    Disconnect,
    EnableVideo,
    DisableVideo,
    Takeoff,
    Land,
    Move,
    Rotate,
    Status,
}

impl LinkOp {
    fn fault_point(&self) -> FaultPoint {
        match self {
            LinkOp::Connect => FaultPoint::Connect,
            LinkOp::Disconnect => FaultPoint::Disconnect,
            LinkOp::EnableVideo => FaultPoint::EnableVideo,
            LinkOp::DisableVideo => FaultPoint::DisableVideo,
            LinkOp::Takeoff => FaultPoint::Takeoff,
            LinkOp::Land => FaultPoint::Land,
            LinkOp::Move(..) => FaultPoint::Move,
            LinkOp::Rotate(..) => FaultPoint::Rotate,
            LinkOp::Status(_) => FaultPoint::Status,
        }
    }
}

/// Journal entry for one call
#[derive(Debug, Clone)]
pub struct LinkCall {
    pub op: LinkOp,
    pub started: Instant,
    pub finished: Instant,
    pub succeeded: bool,
}

#[derive(Debug)]
struct InjectedFault {
    point: FaultPoint,
    error: LinkError,
    remaining: usize,
}

/// State shared between the link, its frame source and any handles
#[derive(Debug, Default)]
struct SimShared {
    journal: Mutex<Vec<LinkCall>>,
    faults: Mutex<Vec<InjectedFault>>,
    video_on: AtomicBool,
    frames_served: AtomicU64,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimShared {
    fn take_fault(&self, point: FaultPoint) -> Option<LinkError> {
        let mut faults = lock(&self.faults);
        let pos = faults.iter().position(|f| f.point == point)?;
        let error = faults[pos].error.clone();
        faults[pos].remaining -= 1;
        if faults[pos].remaining == 0 {
            faults.remove(pos);
        }
        Some(error)
    }
}

/// Observer/controller for a [`SimulatedLink`], usable after the link has
/// been moved into a session
#[derive(Debug, Clone)]
pub struct SimHandle {
    shared: Arc<SimShared>,
}

impl SimHandle {
    /// Make the next `times` calls of kind `point` fail with `error`
    pub fn inject_fault(&self, point: FaultPoint, error: LinkError, times: usize) {
        if times == 0 {
            return;
        }
        lock(&self.shared.faults).push(InjectedFault {
            point,
            error,
            remaining: times,
        });
    }

    /// All calls so far, in order
    pub fn journal(&self) -> Vec<LinkCall> {
        lock(&self.shared.journal).clone()
    }

    /// Number of calls matching `op` exactly
    pub fn count(&self, op: LinkOp) -> usize {
        lock(&self.shared.journal)
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    /// Number of calls that started while another was still running
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    pub fn video_enabled(&self) -> bool {
        self.shared.video_on.load(Ordering::SeqCst)
    }

    pub fn frames_served(&self) -> u64 {
        self.shared.frames_served.load(Ordering::SeqCst)
    }
}

/// Simple flight model
#[derive(Debug)]
struct Vehicle {
    connected: bool,
    flying: bool,
    height_cm: i32,
    yaw_deg: i32,
    battery: u8,
    /// Position relative to the takeoff point (cm)
    north_cm: f64,
    east_cm: f64,
}

impl Vehicle {
    fn require_connected(&self) -> LinkResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }

    fn require_flying(&self) -> LinkResult<()> {
        self.require_connected()?;
        if self.flying {
            Ok(())
        } else {
            Err(LinkError::Rejected("vehicle is not flying".into()))
        }
    }

    fn drain(&mut self) {
        self.battery = self.battery.saturating_sub(1);
    }

    fn translate(&mut self, direction: MoveDirection, distance_cm: u32) {
        let offset = match direction {
            MoveDirection::Forward => 0.0,
            MoveDirection::Right => 90.0,
            MoveDirection::Back => 180.0,
            MoveDirection::Left => 270.0,
        };
        let bearing = (self.yaw_deg as f64 + offset).to_radians();
        self.north_cm += bearing.cos() * distance_cm as f64;
        self.east_cm += bearing.sin() * distance_cm as f64;
    }

    fn turn(&mut self, direction: RotateDirection, degrees: u32) {
        let delta = match direction {
            RotateDirection::Clockwise => degrees as i32,
            RotateDirection::CounterClockwise => -(degrees as i32),
        };
        // Keep yaw in -180..180 like the vehicle reports it
        self.yaw_deg = (self.yaw_deg + delta + 180).rem_euclid(360) - 180;
    }
}

/// In-process vehicle implementing [`VehicleLink`]
pub struct SimulatedLink {
    config: SimConfig,
    vehicle: Vehicle,
    shared: Arc<SimShared>,
}

impl SimulatedLink {
    pub fn new(config: SimConfig) -> Self {
        let vehicle = Vehicle {
            connected: false,
            flying: false,
            height_cm: 0,
            yaw_deg: 0,
            battery: config.initial_battery.min(100),
            north_cm: 0.0,
            east_cm: 0.0,
        };

        Self {
            config,
            vehicle,
            shared: Arc::new(SimShared::default()),
        }
    }

    /// Get a handle for observing the link after it has been moved
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run one call through latency, fault injection and the journal
    async fn call<T>(
        &mut self,
        op: LinkOp,
        apply: impl FnOnce(&mut Vehicle) -> LinkResult<T>,
    ) -> LinkResult<T> {
        let started = Instant::now();
        if self.shared.in_flight.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let latency = match op {
            LinkOp::Status(_) => self.config.status_latency,
            _ => self.config.command_latency,
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = match self.shared.take_fault(op.fault_point()) {
            Some(error) => Err(error),
            None => apply(&mut self.vehicle),
        };

        self.shared.in_flight.store(false, Ordering::SeqCst);
        lock(&self.shared.journal).push(LinkCall {
            op,
            started,
            finished: Instant::now(),
            succeeded: result.is_ok(),
        });

        if let Err(ref e) = result {
            debug!("[SIM] {:?} failed: {}", op, e);
        }
        result
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

#[async_trait]
impl VehicleLink for SimulatedLink {
    async fn connect(&mut self) -> LinkResult<()> {
        self.call(LinkOp::Connect, |v| {
            v.connected = true;
            Ok(())
        })
        .await
    }

    async fn disconnect(&mut self) -> LinkResult<()> {
        self.call(LinkOp::Disconnect, |v| {
            v.require_connected()?;
            v.connected = false;
            Ok(())
        })
        .await
    }

    async fn enable_video(&mut self) -> LinkResult<()> {
        let shared = self.shared.clone();
        self.call(LinkOp::EnableVideo, move |v| {
            v.require_connected()?;
            shared.video_on.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
    }

    async fn disable_video(&mut self) -> LinkResult<()> {
        let shared = self.shared.clone();
        self.call(LinkOp::DisableVideo, move |v| {
            v.require_connected()?;
            shared.video_on.store(false, Ordering::SeqCst);
            Ok(())
        })
        .await
    }

    async fn takeoff(&mut self) -> LinkResult<()> {
        self.call(LinkOp::Takeoff, |v| {
            v.require_connected()?;
            if v.flying {
                return Err(LinkError::Rejected("already flying".into()));
            }
            v.flying = true;
            v.height_cm = TAKEOFF_HEIGHT_CM;
            v.drain();
            Ok(())
        })
        .await
    }

    async fn land(&mut self) -> LinkResult<()> {
        self.call(LinkOp::Land, |v| {
            v.require_flying()?;
            v.flying = false;
            v.height_cm = 0;
            Ok(())
        })
        .await
    }

    async fn move_by(&mut self, direction: MoveDirection, distance_cm: u32) -> LinkResult<()> {
        self.call(LinkOp::Move(direction, distance_cm), |v| {
            v.require_flying()?;
            v.translate(direction, distance_cm);
            v.drain();
            Ok(())
        })
        .await
    }

    async fn rotate(&mut self, direction: RotateDirection, degrees: u32) -> LinkResult<()> {
        self.call(LinkOp::Rotate(direction, degrees), |v| {
            v.require_flying()?;
            v.turn(direction, degrees);
            v.drain();
            Ok(())
        })
        .await
    }

    async fn get_battery(&mut self) -> LinkResult<u8> {
        self.call(LinkOp::Status("battery"), |v| {
            v.require_connected()?;
            Ok(v.battery)
        })
        .await
    }

    async fn get_height(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("height"), |v| {
            v.require_connected()?;
            Ok(v.height_cm)
        })
        .await
    }

    async fn get_tof_altitude(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("altitude"), |v| {
            v.require_connected()?;
            Ok(if v.flying { v.height_cm } else { GROUND_TOF_CM })
        })
        .await
    }

    async fn get_barometer(&mut self) -> LinkResult<f32> {
        self.call(LinkOp::Status("barometer"), |v| {
            v.require_connected()?;
            // Roughly 0.12 hPa per metre near sea level
            Ok(SEA_LEVEL_HPA - v.height_cm as f32 * 0.0012)
        })
        .await
    }

    async fn get_temperature(&mut self) -> LinkResult<f32> {
        self.call(LinkOp::Status("temperature"), |v| {
            v.require_connected()?;
            Ok(if v.flying { 27.5 } else { 24.0 })
        })
        .await
    }

    async fn get_pitch(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("pitch"), |v| {
            v.require_connected()?;
            Ok(0)
        })
        .await
    }

    async fn get_roll(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("roll"), |v| {
            v.require_connected()?;
            Ok(0)
        })
        .await
    }

    async fn get_yaw(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("yaw"), |v| {
            v.require_connected()?;
            Ok(v.yaw_deg)
        })
        .await
    }

    // The model moves instantly, so the vehicle is always at rest between calls
    async fn get_speed_x(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("speed_x"), |v| {
            v.require_connected()?;
            Ok(0)
        })
        .await
    }

    async fn get_speed_y(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("speed_y"), |v| {
            v.require_connected()?;
            Ok(0)
        })
        .await
    }

    async fn get_speed_z(&mut self) -> LinkResult<i32> {
        self.call(LinkOp::Status("speed_z"), |v| {
            v.require_connected()?;
            Ok(0)
        })
        .await
    }

    fn frame_source(&self) -> Arc<dyn FrameSource> {
        Arc::new(SimFrames {
            shared: self.shared.clone(),
            interval: self.config.frame_interval,
            width: self.config.frame_width,
            height: self.config.frame_height,
        })
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Synthetic video stream, active while video is enabled
struct SimFrames {
    shared: Arc<SimShared>,
    interval: Duration,
    width: u32,
    height: u32,
}

#[async_trait]
impl FrameSource for SimFrames {
    async fn read_frame(&self) -> Option<VideoFrame> {
        tokio::time::sleep(self.interval).await;

        if !self.shared.video_on.load(Ordering::SeqCst) {
            return None;
        }

        let sequence = self.shared.frames_served.fetch_add(1, Ordering::SeqCst) + 1;
        Some(VideoFrame {
            sequence,
            width: self.width,
            height: self.height,
            data: Bytes::copy_from_slice(&sequence.to_le_bytes()),
        })
    }
}
