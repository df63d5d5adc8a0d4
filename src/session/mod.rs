//! Session core
//!
//! Three activities share one vehicle link:
//! - command dispatch, on the supervisor's own task
//! - telemetry sampling, on a spawned task
//! - video consumption, on a spawned task
//!
//! They coordinate only through the [`ShutdownSignal`] and the append-only
//! [`TelemetryLog`].

pub mod dispatcher;
pub mod intake;
pub mod sampler;
pub mod shutdown;
pub mod supervisor;
pub mod video;

pub use dispatcher::{CommandDispatcher, DispatchError};
pub use intake::{spawn_stdin_reader, CommandSource};
pub use sampler::{SamplerConfig, TelemetryLog, TelemetrySampler};
pub use shutdown::{ShutdownReason, ShutdownSignal};
pub use supervisor::{Session, SessionError, SessionReport, SessionSettings};
pub use video::{FrameCounter, VideoConsumer};
