//! Vehicle link abstraction for pluggable vehicle drivers
//!
//! This module handles:
//! - The request/response interface to the vehicle (`VehicleLink`)
//! - The video path (`FrameSource` in, `FrameSink` out)
//! - Classifying link failures as per-command or link-fatal
//!
//! Drivers: `SimulatedLink` (in-process vehicle) and `MavlinkLink`
//! (ArduPilot flight controller over MAVLink).

pub mod mavlink;
pub mod sim;

use async_trait::async_trait;
use bytes::Bytes;
use groundctl_shared::{MoveDirection, RotateDirection};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub use self::mavlink::{FcConnectionType, MavlinkConfig, MavlinkLink};
pub use sim::{FaultPoint, LinkCall, LinkOp, SimConfig, SimHandle, SimulatedLink};

/// Errors reported by a vehicle driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Vehicle link not connected")]
    NotConnected,

    #[error("Vehicle link lost: {0}")]
    Lost(String),

    #[error("Vehicle rejected command: {0}")]
    Rejected(String),

    #[error("Link I/O error: {0}")]
    Io(String),
}

impl LinkError {
    /// Whether the failure means the link itself is gone
    ///
    /// Fatal failures end the session; the others only fail the one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::NotConnected | LinkError::Lost(_))
    }
}

/// Result type for link calls
pub type LinkResult<T> = Result<T, LinkError>;

/// Request/response interface to the vehicle
///
/// Every method takes `&mut self`: the underlying channel carries one
/// exchange at a time. Share a link between activities through
/// [`SharedLink`] only.
#[async_trait]
pub trait VehicleLink: Send {
    async fn connect(&mut self) -> LinkResult<()>;

    async fn disconnect(&mut self) -> LinkResult<()>;

    async fn enable_video(&mut self) -> LinkResult<()>;

    async fn disable_video(&mut self) -> LinkResult<()>;

    async fn takeoff(&mut self) -> LinkResult<()>;

    async fn land(&mut self) -> LinkResult<()>;

    /// Translate relative to the vehicle body
    async fn move_by(&mut self, direction: MoveDirection, distance_cm: u32) -> LinkResult<()>;

    async fn rotate(&mut self, direction: RotateDirection, degrees: u32) -> LinkResult<()>;

    /// Battery charge in percent
    async fn get_battery(&mut self) -> LinkResult<u8>;

    /// Height above the takeoff point (cm)
    async fn get_height(&mut self) -> LinkResult<i32>;

    /// Downward time-of-flight distance (cm)
    async fn get_tof_altitude(&mut self) -> LinkResult<i32>;

    async fn get_barometer(&mut self) -> LinkResult<f32>;

    /// Temperature in degrees Celsius
    async fn get_temperature(&mut self) -> LinkResult<f32>;

    /// Attitude in degrees
    async fn get_pitch(&mut self) -> LinkResult<i32>;
    async fn get_roll(&mut self) -> LinkResult<i32>;
    async fn get_yaw(&mut self) -> LinkResult<i32>;

    /// Velocity components (cm/s)
    async fn get_speed_x(&mut self) -> LinkResult<i32>;
    async fn get_speed_y(&mut self) -> LinkResult<i32>;
    async fn get_speed_z(&mut self) -> LinkResult<i32>;

    /// Handle to the video stream
    ///
    /// Frames travel outside the request/response channel, so reading them
    /// never waits on the link lock.
    fn frame_source(&self) -> Arc<dyn FrameSource>;

    /// Human-readable name for this driver
    fn name(&self) -> &'static str;
}

/// A link shared between the dispatcher and the sampler
pub type SharedLink = Arc<Mutex<Box<dyn VehicleLink>>>;

/// Wrap a driver for sharing
pub fn shared(link: impl VehicleLink + 'static) -> SharedLink {
    Arc::new(Mutex::new(Box::new(link)))
}

/// One decoded video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Raw pixel data, format defined by the driver
    pub data: Bytes,
}

/// Source of video frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Wait for the next frame
    ///
    /// `None` means no frame is available right now (stream off or between
    /// frames); callers try again later.
    async fn read_frame(&self) -> Option<VideoFrame>;
}

/// What the video consumer should do after rendering a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    /// Operator closed the video view; end the session
    Stop,
}

/// Destination for video frames (display, recorder, ...)
pub trait FrameSink: Send {
    fn render(&mut self, frame: &VideoFrame) -> SinkControl;

    /// Release display resources; called once when the consumer stops
    fn close(&mut self) {}
}

/// A frame source that never produces frames
///
/// Used by drivers without a video channel.
#[derive(Debug, Default)]
pub struct NoVideo;

#[async_trait]
impl FrameSource for NoVideo {
    async fn read_frame(&self) -> Option<VideoFrame> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(LinkError::NotConnected.is_fatal());
        assert!(LinkError::Lost("timeout".into()).is_fatal());
        assert!(!LinkError::Rejected("out of range".into()).is_fatal());
        assert!(!LinkError::Io("busy".into()).is_fatal());
    }

    #[tokio::test]
    async fn test_no_video_never_yields() {
        let source = NoVideo;
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), source.read_frame()).await;
        assert!(result.is_err());
    }
}
