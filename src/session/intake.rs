//! Operator command intake
//!
//! Lines of operator text arrive over a channel. The terminal reader runs on
//! its own OS thread, since a blocking stdin read cannot be cancelled; the
//! session simply stops listening when it shuts down.

use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines buffered between the reader and the session
const LINE_BUFFER: usize = 16;

/// Stream of operator input lines
///
/// `next_line` returns `None` once the input side is closed.
#[derive(Debug)]
pub struct CommandSource {
    rx: mpsc::Receiver<String>,
}

impl CommandSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Create a source fed by the returned sender
    pub fn channel() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        (tx, Self::new(rx))
    }

    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Read operator commands from the terminal
pub fn spawn_stdin_reader() -> io::Result<CommandSource> {
    let (tx, source) = CommandSource::channel();

    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = io::stdin();
            let mut lines = stdin.lock();
            loop {
                print!("\n> ");
                let _ = io::stdout().flush();

                let mut line = String::new();
                match lines.read_line(&mut line) {
                    Ok(0) => {
                        debug!("[SESSION] Operator input closed");
                        break;
                    }
                    Ok(_) => {
                        if tx.blocking_send(line).is_err() {
                            // Session no longer listening
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("[SESSION] Failed to read operator input: {}", e);
                        break;
                    }
                }
            }
        })?;

    Ok(source)
}
