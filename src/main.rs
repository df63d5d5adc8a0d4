use groundctl::config::{Command, SessionConfig};
use groundctl::link::{MavlinkLink, SimulatedLink};
use groundctl::session::{self, FrameCounter, Session, ShutdownReason};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match Command::parse(&args)? {
        Command::Run(config) => config,
        Command::ShowHelp => {
            println!("{}", Command::help());
            return Ok(());
        }
        Command::ShowVersion => {
            println!("groundctl {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
    };

    let session = build_session(&config);
    info!("Ground control starting");
    info!("  Link: {:?}", config.link);
    info!("  Telemetry file: {}", config.telemetry_file.display());

    // Ctrl-C lands and tears down like `exit`; a second one quits at once
    let signal = session.shutdown_signal();
    tokio::spawn(async move {
        if signal.forward_interrupts(tokio::signal::ctrl_c).await {
            std::process::exit(130);
        }
    });

    let commands = session::spawn_stdin_reader().context("failed to read operator input")?;
    let result = session.run(commands).await;
    println!("Drone session ended.");

    let report = result?;
    info!(
        "Session ended ({}): {} commands, {} failed, {} snapshots, {} frames",
        report.reason, report.dispatched, report.failed, report.snapshots, report.frames
    );
    if report.reason.is_fault() {
        warn!("Session ended abnormally: {}", report.reason);
        std::process::exit(1);
    }
    Ok(())
}

fn build_session(config: &SessionConfig) -> Session {
    let sink = Box::new(FrameCounter::new());
    match config.mavlink() {
        Some(mavlink) => Session::new(MavlinkLink::new(mavlink), sink, config.settings()),
        None => Session::new(SimulatedLink::new(config.sim.clone()), sink, config.settings()),
    }
}
