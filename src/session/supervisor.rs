//! Session supervisor
//!
//! Owns one flight session from connect to teardown:
//! - brings the link up and starts the sampler and video tasks
//! - runs the operator command loop until shutdown is requested
//! - tears everything down in order and persists the telemetry log

use super::dispatcher::CommandDispatcher;
use super::intake::CommandSource;
use super::sampler::{SamplerConfig, TelemetryLog, TelemetrySampler};
use super::shutdown::{ShutdownReason, ShutdownSignal};
use super::video::VideoConsumer;
use crate::link::{self, FrameSink, FrameSource, LinkError, SharedLink, VehicleLink};
use crate::persistence;
use groundctl_shared::instruction::HELP;
use groundctl_shared::{parse_input, Input, TelemetrySnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Where the telemetry log is written at teardown
    pub telemetry_file: PathBuf,
    pub sampler: SamplerConfig,
}

/// Errors that stop a session from starting
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect to vehicle: {0}")]
    Connect(#[source] LinkError),
}

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub reason: ShutdownReason,
    /// Snapshots in the telemetry log
    pub snapshots: usize,
    /// Frames handed to the sink
    pub frames: u64,
    /// Telemetry file, if one was written
    pub persisted: Option<PathBuf>,
    /// Instructions the link completed
    pub dispatched: u64,
    /// Instructions the link failed
    pub failed: u64,
}

/// One ground-control session
pub struct Session {
    link: SharedLink,
    frames: Arc<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    shutdown: ShutdownSignal,
    settings: SessionSettings,
}

impl Session {
    pub fn new(
        link: impl VehicleLink + 'static,
        sink: Box<dyn FrameSink>,
        settings: SessionSettings,
    ) -> Self {
        let frames = link.frame_source();
        Self {
            link: link::shared(link),
            frames,
            sink,
            shutdown: ShutdownSignal::new(),
            settings,
        }
    }

    /// Handle for requesting shutdown from outside (e.g. Ctrl-C)
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run the session to completion
    ///
    /// Teardown always runs once the link is up, whatever ended the session.
    /// Only a failed initial connect is returned as an error.
    pub async fn run(self, mut commands: CommandSource) -> Result<SessionReport, SessionError> {
        let Session {
            link,
            frames,
            sink,
            shutdown,
            settings,
        } = self;

        let log = TelemetryLog::new();
        let mut dispatcher = CommandDispatcher::new(link.clone(), shutdown.clone());

        if let Err(e) = dispatcher.connect().await {
            error!("[SESSION] Connect failed: {}", e);
            shutdown.trigger(ShutdownReason::LinkFatal);
            dispatcher.close();
            persist(&settings.telemetry_file, &[]);
            return Err(SessionError::Connect(e));
        }

        if let Err(e) = link.lock().await.enable_video().await {
            warn!("[SESSION] Video stream unavailable: {}", e);
        }

        let sampler = TelemetrySampler::new(
            link.clone(),
            log.clone(),
            shutdown.clone(),
            settings.sampler.clone(),
        )
        .spawn();
        let video = VideoConsumer::new(frames, sink, shutdown.clone()).spawn();

        info!("[SESSION] Session running");
        println!("Type 'help' for available commands.");

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                line = commands.next_line() => line,
            };

            let Some(line) = line else {
                shutdown.trigger(ShutdownReason::InputClosed);
                break;
            };

            match parse_input(&line) {
                Ok(Input::Empty) => {}
                Ok(Input::Help) => println!("{}", HELP),
                Ok(Input::Exit) => {
                    shutdown.trigger(ShutdownReason::UserExit);
                    break;
                }
                Ok(Input::Instruction(instruction)) => {
                    if let Err(e) = dispatcher.dispatch(instruction).await {
                        println!("Command error: {}", e);
                    }
                }
                Err(rejection) => println!("{}", rejection),
            }
        }

        // Teardown: every step is best-effort, persistence always runs
        let reason = shutdown.wait().await;
        info!("[SESSION] Tearing down ({})", reason);

        match dispatcher.land_if_flying().await {
            Ok(true) => info!("[SESSION] Vehicle landed"),
            Ok(false) => {}
            Err(e) => warn!("[SESSION] Landing failed: {}", e),
        }

        let (samples, frames) = futures::join!(sampler, video);
        let frames = frames.unwrap_or_else(|e| {
            error!("[SESSION] Video task failed: {}", e);
            0
        });
        if let Err(e) = samples {
            error!("[SESSION] Sampler task failed: {}", e);
        }

        {
            let mut link = link.lock().await;
            if let Err(e) = link.disable_video().await {
                warn!("[SESSION] Failed to stop video: {}", e);
            }
            if let Err(e) = link.disconnect().await {
                warn!("[SESSION] Failed to disconnect: {}", e);
            }
        }
        dispatcher.close();

        let snapshots = log.snapshots().await;
        let persisted = persist(&settings.telemetry_file, &snapshots);

        Ok(SessionReport {
            reason,
            snapshots: snapshots.len(),
            frames,
            persisted,
            dispatched: dispatcher.dispatched(),
            failed: dispatcher.failed(),
        })
    }
}

fn persist(path: &Path, snapshots: &[TelemetrySnapshot]) -> Option<PathBuf> {
    match persistence::write_telemetry(path, snapshots) {
        Ok(written) => written,
        Err(e) => {
            error!("[SESSION] Failed to save telemetry: {}", e);
            None
        }
    }
}
