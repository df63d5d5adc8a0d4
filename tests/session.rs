//! End-to-end session tests against the simulated vehicle

use groundctl::link::{
    FaultPoint, FrameSink, LinkError, LinkOp, SimConfig, SimHandle, SimulatedLink, SinkControl,
    VideoFrame,
};
use groundctl::persistence::read_telemetry;
use groundctl::session::{
    CommandSource, FrameCounter, SamplerConfig, Session, SessionReport, SessionSettings,
    ShutdownReason, ShutdownSignal,
};
use groundctl_shared::{MoveDirection, RotateDirection};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    handle: SimHandle,
    signal: ShutdownSignal,
    tx: mpsc::Sender<String>,
    run: JoinHandle<SessionReport>,
    telemetry_file: PathBuf,
    _dir: TempDir,
}

impl Harness {
    fn start(sim: SimConfig, sink: Box<dyn FrameSink>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let telemetry_file = dir.path().join("telemetry_log.csv");

        let link = SimulatedLink::new(sim);
        let handle = link.handle();
        let session = Session::new(
            link,
            sink,
            SessionSettings {
                telemetry_file: telemetry_file.clone(),
                sampler: SamplerConfig {
                    interval: Duration::from_millis(10),
                    retry_limit: 0,
                },
            },
        );
        let signal = session.shutdown_signal();
        let (tx, commands) = CommandSource::channel();
        let run = tokio::spawn(async move { session.run(commands).await.unwrap() });

        Self {
            handle,
            signal,
            tx,
            run,
            telemetry_file,
            _dir: dir,
        }
    }

    fn with_defaults() -> Self {
        Self::start(sim_config(), Box::new(FrameCounter::new()))
    }

    async fn send(&self, line: &str) {
        self.tx.send(line.to_string()).await.unwrap();
    }

    async fn finish(self) -> (SessionReport, SimHandle, PathBuf, TempDir) {
        let report = tokio::time::timeout(Duration::from_secs(5), self.run)
            .await
            .expect("session did not end")
            .unwrap();
        (report, self.handle, self.telemetry_file, self._dir)
    }
}

fn sim_config() -> SimConfig {
    SimConfig {
        command_latency: Duration::from_millis(20),
        status_latency: Duration::from_millis(1),
        frame_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

/// Wait until `done` holds, polling the simulated vehicle's journal
async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Completed telemetry polls: `speed_z` is the last getter of each poll
fn polls(handle: &SimHandle) -> usize {
    handle.count(LinkOp::Status("speed_z"))
}

async fn wait_for_poll(handle: &SimHandle) {
    wait_until("a telemetry poll", || polls(handle) >= 1).await;
}

async fn wait_for_takeoff(handle: &SimHandle) {
    wait_until("takeoff", || handle.count(LinkOp::Takeoff) >= 1).await;
}

#[tokio::test]
async fn test_takeoff_move_exit() {
    let h = Harness::with_defaults();
    h.send("takeoff").await;
    h.send("Forward 100").await;
    wait_until("the move", || {
        h.handle.count(LinkOp::Move(MoveDirection::Forward, 100)) >= 1
    })
    .await;
    wait_for_poll(&h.handle).await;
    h.send("exit").await;

    let signal = h.signal.clone();
    let (report, handle, path, _dir) = h.finish().await;

    assert_eq!(report.reason, ShutdownReason::UserExit);
    assert_eq!(signal.reason(), Some(ShutdownReason::UserExit));
    assert_eq!(handle.count(LinkOp::Takeoff), 1);
    assert_eq!(handle.count(LinkOp::Move(MoveDirection::Forward, 100)), 1);
    assert_eq!(handle.count(LinkOp::Land), 1);
    assert_eq!(handle.count(LinkOp::Disconnect), 1);
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.failed, 0);

    // Both activities stopped and video was switched off
    assert!(!handle.video_enabled());
    assert!(report.frames > 0);
    assert_eq!(report.frames, handle.frames_served());

    assert!(report.snapshots >= 1);
    assert_eq!(report.persisted.as_deref(), Some(path.as_path()));
    let saved = read_telemetry(&path).unwrap();
    assert_eq!(saved.len(), report.snapshots);
    assert!(saved.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_link_calls_never_overlap() {
    let sim = SimConfig {
        command_latency: Duration::from_millis(15),
        status_latency: Duration::from_millis(3),
        ..sim_config()
    };
    let h = Harness::start(sim, Box::new(FrameCounter::new()));
    for line in [
        "takeoff",
        "forward 100",
        "rotateclock 90",
        "left 50",
        "rotatecounter 45",
        "back 20",
        "right 500",
    ] {
        h.send(line).await;
    }
    wait_for_poll(&h.handle).await;
    h.send("exit").await;

    let (report, handle, _, _dir) = h.finish().await;
    assert_eq!(report.dispatched, 8);
    assert_eq!(handle.overlaps(), 0);
    assert_eq!(
        handle.count(LinkOp::Rotate(RotateDirection::CounterClockwise, 45)),
        1
    );

    let journal = handle.journal();
    assert!(journal
        .windows(2)
        .all(|w| w[1].started >= w[0].finished));
    assert!(journal.iter().any(|c| matches!(c.op, LinkOp::Status(_))));
}

#[tokio::test]
async fn test_land_when_landed_not_sent() {
    let h = Harness::with_defaults();
    h.send("land").await;
    h.send("takeoff").await;
    h.send("land").await;
    h.send("land").await;
    h.send("exit").await;

    let (report, handle, _, _dir) = h.finish().await;
    assert_eq!(handle.count(LinkOp::Land), 1);
    assert_eq!(report.dispatched, 2);
}

#[tokio::test]
async fn test_interrupt_lands_and_persists() {
    let h = Harness::with_defaults();
    h.send("takeoff").await;
    wait_for_takeoff(&h.handle).await;
    wait_for_poll(&h.handle).await;
    h.signal.trigger(ShutdownReason::Interrupt);

    let (report, handle, path, _dir) = h.finish().await;
    assert_eq!(report.reason, ShutdownReason::Interrupt);
    assert_eq!(handle.count(LinkOp::Land), 1);
    assert!(path.exists());
    assert!(report.snapshots >= 1);
}

#[tokio::test]
async fn test_sampler_fault_ends_session() {
    let h = Harness::with_defaults();
    h.send("takeoff").await;
    wait_for_takeoff(&h.handle).await;
    wait_for_poll(&h.handle).await;
    h.handle
        .inject_fault(FaultPoint::Status, LinkError::Io("checksum".into()), 1);

    let (report, handle, path, _dir) = h.finish().await;
    assert_eq!(report.reason, ShutdownReason::SamplerFault);
    assert_eq!(handle.count(LinkOp::Land), 1);
    // Polls before the fault are kept
    assert!(report.snapshots >= 1);
    assert_eq!(read_telemetry(&path).unwrap().len(), report.snapshots);
}

#[tokio::test]
async fn test_link_fatal_dispatch_ends_session() {
    let h = Harness::with_defaults();
    h.send("takeoff").await;
    wait_for_takeoff(&h.handle).await;
    h.handle
        .inject_fault(FaultPoint::Move, LinkError::Lost("radio silence".into()), 1);
    h.send("forward 100").await;

    let (report, handle, _, _dir) = h.finish().await;
    assert_eq!(report.reason, ShutdownReason::LinkFatal);
    assert_eq!(report.failed, 1);
    // Best-effort landing still attempted
    assert_eq!(handle.count(LinkOp::Land), 1);
}

#[tokio::test]
async fn test_rejected_command_keeps_session() {
    let h = Harness::with_defaults();
    h.send("takeoff").await;
    wait_for_takeoff(&h.handle).await;
    h.handle
        .inject_fault(FaultPoint::Rotate, LinkError::Rejected("busy".into()), 1);
    h.send("rotateclock 90").await;
    h.send("rotateclock 90").await;
    h.send("exit").await;

    let (report, handle, _, _dir) = h.finish().await;
    assert_eq!(report.reason, ShutdownReason::UserExit);
    assert_eq!(report.failed, 1);
    assert_eq!(
        handle.count(LinkOp::Rotate(RotateDirection::Clockwise, 90)),
        2
    );
}

#[tokio::test]
async fn test_teardown_failures_still_persist() {
    let h = Harness::with_defaults();
    h.handle
        .inject_fault(FaultPoint::DisableVideo, LinkError::Io("busy".into()), 1);
    h.handle
        .inject_fault(FaultPoint::Disconnect, LinkError::Io("busy".into()), 1);
    wait_for_poll(&h.handle).await;
    h.send("exit").await;

    let (report, _, path, _dir) = h.finish().await;
    assert_eq!(report.persisted.as_deref(), Some(path.as_path()));
    assert!(!read_telemetry(&path).unwrap().is_empty());
}

#[tokio::test]
async fn test_operator_input_closed_is_exit() {
    let h = Harness::with_defaults();
    h.send("takeoff").await;
    wait_for_takeoff(&h.handle).await;

    let Harness {
        handle,
        tx,
        run,
        _dir,
        ..
    } = h;
    drop(tx);

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.reason, ShutdownReason::InputClosed);
    assert_eq!(handle.count(LinkOp::Land), 1);
}

/// Closes the view after a few frames, like pressing `q` on a display
struct CloseAfter(u32);

impl FrameSink for CloseAfter {
    fn render(&mut self, _frame: &VideoFrame) -> SinkControl {
        self.0 = self.0.saturating_sub(1);
        if self.0 == 0 {
            SinkControl::Stop
        } else {
            SinkControl::Continue
        }
    }
}

#[tokio::test]
async fn test_video_close_ends_session() {
    let h = Harness::start(sim_config(), Box::new(CloseAfter(5)));
    h.send("takeoff").await;

    let (report, handle, _, _dir) = h.finish().await;
    assert_eq!(report.reason, ShutdownReason::VideoClosed);
    assert_eq!(report.frames, 5);
    assert!(!handle.video_enabled());
}
