//! Video consumer - pulls frames from the link and hands them to a sink

use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::link::{FrameSink, FrameSource, SinkControl, VideoFrame};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info};

/// Pause before asking again when no frame is ready
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// How often the frame counter reports throughput
const REPORT_WINDOW: Duration = Duration::from_secs(5);

pub struct VideoConsumer {
    source: Arc<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    shutdown: ShutdownSignal,
}

impl VideoConsumer {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            sink,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Render frames until shutdown or until the sink asks to stop
    ///
    /// Returns the number of frames rendered. The sink is closed on the way
    /// out either way.
    pub async fn run(mut self) -> u64 {
        let mut rendered = 0;

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                frame = self.source.read_frame() => frame,
            };

            match frame {
                Some(frame) => {
                    rendered += 1;
                    if self.sink.render(&frame) == SinkControl::Stop {
                        info!("[VIDEO] Video view closed by operator");
                        self.shutdown.trigger(ShutdownReason::VideoClosed);
                        break;
                    }
                }
                None => tokio::time::sleep(IDLE_BACKOFF).await,
            }
        }

        self.sink.close();
        info!("[VIDEO] Stopped after {} frames", rendered);
        rendered
    }
}

/// Sink that counts frames and logs the frame rate
///
/// Stands in for a display when running headless.
#[derive(Debug)]
pub struct FrameCounter {
    total: u64,
    window_frames: u64,
    window_start: Instant,
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCounter {
    pub fn new() -> Self {
        Self {
            total: 0,
            window_frames: 0,
            window_start: Instant::now(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl FrameSink for FrameCounter {
    fn render(&mut self, frame: &VideoFrame) -> SinkControl {
        self.total += 1;
        self.window_frames += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed >= REPORT_WINDOW {
            debug!(
                "[VIDEO] {:.1} fps ({}x{}, frame {})",
                self.window_frames as f64 / elapsed.as_secs_f64(),
                frame.width,
                frame.height,
                frame.sequence
            );
            self.window_frames = 0;
            self.window_start = Instant::now();
        }

        SinkControl::Continue
    }

    fn close(&mut self) {
        debug!("[VIDEO] Frame counter closed at {} frames", self.total);
    }
}
