//! Session State Machine
//!
//! Tracks where the session is in its lifecycle and decides which
//! instructions make sense from there.

use std::fmt;

use crate::Instruction;

/// Lifecycle of a ground-control session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created, link not yet up
    Idle,
    /// Link up, vehicle on the ground
    Connected,
    /// Vehicle airborne
    Flying,
    /// Session torn down
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Flying => write!(f, "flying"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Vehicle link connected
    LinkUp,
    /// Takeoff call succeeded
    TookOff,
    /// Land call succeeded
    Landed,
    /// Session teardown finished
    Closed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed put)
    Success(SessionState),
    /// Transition was invalid from current state
    Invalid {
        from: SessionState,
        event: SessionEvent,
    },
}

/// The session state machine
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    pub fn is_flying(&self) -> bool {
        self.current_state == SessionState::Flying
    }

    /// Whether `instruction` is meaningful in the current state
    ///
    /// Takeoff needs a grounded, connected vehicle; everything else needs it
    /// airborne. A `false` here means the link call would be redundant or
    /// unsafe and must not be made.
    pub fn permits(&self, instruction: &Instruction) -> bool {
        match instruction {
            Instruction::Takeoff => self.current_state == SessionState::Connected,
            Instruction::Land | Instruction::Move { .. } | Instruction::Rotate { .. } => {
                self.current_state == SessionState::Flying
            }
        }
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn next_state(&self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            (Idle, LinkUp) => Some(Connected),
            (Connected, TookOff) => Some(Flying),
            (Flying, Landed) => Some(Connected),

            // Teardown may happen from anywhere and is final
            (_, Closed) => Some(Ended),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MoveDirection, RotateDirection};

    #[test]
    fn test_initial_state() {
        let fsm = SessionStateMachine::new();
        assert_eq!(fsm.state(), SessionState::Idle);
        assert!(!fsm.is_flying());
    }

    #[test]
    fn test_normal_flight_flow() {
        let mut fsm = SessionStateMachine::new();

        let result = fsm.process_event(SessionEvent::LinkUp);
        assert_eq!(result, TransitionResult::Success(SessionState::Connected));

        let result = fsm.process_event(SessionEvent::TookOff);
        assert_eq!(result, TransitionResult::Success(SessionState::Flying));

        let result = fsm.process_event(SessionEvent::Landed);
        assert_eq!(result, TransitionResult::Success(SessionState::Connected));

        let result = fsm.process_event(SessionEvent::Closed);
        assert_eq!(result, TransitionResult::Success(SessionState::Ended));
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = SessionStateMachine::new();

        // Can't take off before the link is up
        let result = fsm.process_event(SessionEvent::TookOff);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SessionState::Idle);
    }

    #[test]
    fn test_ended_is_final() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::LinkUp);
        fsm.process_event(SessionEvent::Closed);

        let result = fsm.process_event(SessionEvent::LinkUp);
        assert!(matches!(result, TransitionResult::Invalid { from: SessionState::Ended, .. }));
    }

    #[test]
    fn test_permits_by_state() {
        let mut fsm = SessionStateMachine::new();
        let forward = Instruction::Move {
            direction: MoveDirection::Forward,
            distance_cm: 100,
        };
        let turn = Instruction::Rotate {
            direction: RotateDirection::Clockwise,
            degrees: 90,
        };

        assert!(!fsm.permits(&Instruction::Takeoff));

        fsm.process_event(SessionEvent::LinkUp);
        assert!(fsm.permits(&Instruction::Takeoff));
        assert!(!fsm.permits(&Instruction::Land));
        assert!(!fsm.permits(&forward));

        fsm.process_event(SessionEvent::TookOff);
        assert!(!fsm.permits(&Instruction::Takeoff));
        assert!(fsm.permits(&Instruction::Land));
        assert!(fsm.permits(&forward));
        assert!(fsm.permits(&turn));
    }
}
