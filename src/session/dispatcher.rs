//! Command dispatcher - checks session state and issues instructions to the link

use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::link::{LinkError, SharedLink};
use groundctl_shared::{
    Instruction, SessionEvent, SessionState, SessionStateMachine, TransitionResult,
};
use thiserror::Error;
use tracing::{error, info, warn};

/// Why a dispatch did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("`{instruction}` is not allowed while {state}")]
    InvalidState {
        instruction: Instruction,
        state: SessionState,
    },

    #[error("`{instruction}` failed: {source}")]
    Link {
        instruction: Instruction,
        #[source]
        source: LinkError,
    },
}

impl DispatchError {
    /// Whether the failure took the link down with it
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::Link { source, .. } if source.is_fatal())
    }
}

/// Issues validated instructions to the vehicle, one at a time
///
/// `dispatch` takes `&mut self`, so a second instruction cannot start while
/// one is in flight.
pub struct CommandDispatcher {
    link: SharedLink,
    fsm: SessionStateMachine,
    shutdown: ShutdownSignal,
    dispatched: u64,
    failed: u64,
}

impl CommandDispatcher {
    pub fn new(link: SharedLink, shutdown: ShutdownSignal) -> Self {
        Self {
            link,
            fsm: SessionStateMachine::new(),
            shutdown,
            dispatched: 0,
            failed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.fsm.state()
    }

    /// Instructions the link completed
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Instructions the link failed
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Bring the link up and move to Connected
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        let name = {
            let mut link = self.link.lock().await;
            link.connect().await?;
            link.name()
        };
        info!("[DISPATCH] Connected via {} link", name);
        self.transition(SessionEvent::LinkUp);
        Ok(())
    }

    /// Issue one instruction to the vehicle
    ///
    /// Instructions that make no sense in the current state are refused
    /// without touching the link. A link-fatal failure sets the shutdown
    /// signal before returning.
    pub async fn dispatch(&mut self, instruction: Instruction) -> Result<(), DispatchError> {
        if !self.fsm.permits(&instruction) {
            let state = self.fsm.state();
            warn!("[DISPATCH] Ignoring `{}` while {}", instruction, state);
            return Err(DispatchError::InvalidState { instruction, state });
        }

        info!("[DISPATCH] Executing `{}`", instruction);
        let result = {
            let mut link = self.link.lock().await;
            match instruction {
                Instruction::Takeoff => link.takeoff().await,
                Instruction::Land => link.land().await,
                Instruction::Move {
                    direction,
                    distance_cm,
                } => link.move_by(direction, distance_cm).await,
                Instruction::Rotate { direction, degrees } => {
                    link.rotate(direction, degrees).await
                }
            }
        };

        match result {
            Ok(()) => {
                self.dispatched += 1;
                match instruction {
                    Instruction::Takeoff => self.transition(SessionEvent::TookOff),
                    Instruction::Land => self.transition(SessionEvent::Landed),
                    _ => {}
                }
                Ok(())
            }
            Err(source) => {
                self.failed += 1;
                if source.is_fatal() {
                    error!("[DISPATCH] `{}` lost the link: {}", instruction, source);
                    self.shutdown.trigger(ShutdownReason::LinkFatal);
                } else {
                    warn!("[DISPATCH] `{}` failed: {}", instruction, source);
                }
                Err(DispatchError::Link {
                    instruction,
                    source,
                })
            }
        }
    }

    /// Land if the vehicle is airborne
    ///
    /// Returns `Ok(false)` when there was nothing to do.
    pub async fn land_if_flying(&mut self) -> Result<bool, DispatchError> {
        if !self.fsm.is_flying() {
            return Ok(false);
        }
        self.dispatch(Instruction::Land).await?;
        Ok(true)
    }

    /// Mark the session as ended
    pub fn close(&mut self) {
        self.transition(SessionEvent::Closed);
    }

    fn transition(&mut self, event: SessionEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) if from != to => {
                info!("[DISPATCH] State: {} -> {}", from, to);
            }
            TransitionResult::Success(_) => {}
            TransitionResult::Invalid { from, event } => {
                warn!("[DISPATCH] Invalid transition: {:?} in {}", event, from);
            }
        }
    }
}
