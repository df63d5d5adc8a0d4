//! Session-wide shutdown signal
//!
//! One flag per session, handed to every activity at construction. It starts
//! clear, is set once by whoever first needs the session to end, and is never
//! reset.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Why the session is ending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operator typed `exit`
    UserExit,
    /// Ctrl-C
    Interrupt,
    /// Operator input reached end of file
    InputClosed,
    /// Operator closed the video view
    VideoClosed,
    /// Telemetry poll failed
    SamplerFault,
    /// Vehicle link is gone
    LinkFatal,
}

impl ShutdownReason {
    /// Whether the session ended because something broke
    pub fn is_fault(&self) -> bool {
        matches!(self, ShutdownReason::SamplerFault | ShutdownReason::LinkFatal)
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::UserExit => write!(f, "operator exit"),
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::InputClosed => write!(f, "operator input closed"),
            ShutdownReason::VideoClosed => write!(f, "video view closed"),
            ShutdownReason::SamplerFault => write!(f, "telemetry sampler fault"),
            ShutdownReason::LinkFatal => write!(f, "vehicle link lost"),
        }
    }
}

/// Shared, set-once shutdown flag
///
/// Cloning gives another handle to the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown
    ///
    /// Returns `true` if this call set the flag. Later calls keep the first
    /// reason and return `false`.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });

        if first {
            info!("[SESSION] Shutdown requested: {}", reason);
        }
        first
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The reason recorded by the first trigger
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Route operator interrupts into the session
    ///
    /// The first interrupt requests shutdown with [`ShutdownReason::Interrupt`]
    /// so the vehicle lands and telemetry is saved. Returns `true` when a
    /// second interrupt arrives and the caller should exit without waiting
    /// for teardown, or `false` if interrupts cannot be received.
    pub async fn forward_interrupts<F, Fut>(&self, mut interrupt: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        if let Err(e) = interrupt().await {
            warn!("[SESSION] Cannot listen for interrupts: {}", e);
            return false;
        }
        if self.trigger(ShutdownReason::Interrupt) {
            println!("\nInterrupted - landing...");
        }

        match interrupt().await {
            Ok(()) => {
                warn!("[SESSION] Second interrupt, abandoning teardown");
                true
            }
            Err(e) => {
                warn!("[SESSION] Cannot listen for interrupts: {}", e);
                false
            }
        }
    }

    /// Wait until shutdown is requested
    ///
    /// Returns immediately if it already has been.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender
                std::future::pending::<()>().await;
            }
        }
    }
}
