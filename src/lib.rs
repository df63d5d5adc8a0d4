//! groundctl - ground-control session manager for a single drone
//!
//! Keeps a command/telemetry link to one vehicle, validates and dispatches
//! operator commands, samples telemetry into a log, consumes the video
//! stream, and writes the telemetry log out when the session ends.

pub mod config;
pub mod link;
pub mod persistence;
pub mod session;

pub use config::{LinkConfig, SessionConfig};
pub use session::{Session, SessionReport, ShutdownReason, ShutdownSignal};
