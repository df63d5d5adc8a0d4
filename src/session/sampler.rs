//! Telemetry Sampler
//!
//! Runs a background task that polls every vehicle status field at a fixed
//! interval and appends one snapshot per poll to the session's telemetry log.

use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::link::{LinkResult, SharedLink};
use groundctl_shared::{limits, now_utc, TelemetrySnapshot};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Append-only, time-ordered record of snapshots
///
/// Cloning gives another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct TelemetryLog {
    entries: Arc<RwLock<Vec<TelemetrySnapshot>>>,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, snapshot: TelemetrySnapshot) {
        self.entries.write().await.push(snapshot);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of every snapshot so far, oldest first
    pub async fn snapshots(&self) -> Vec<TelemetrySnapshot> {
        self.entries.read().await.clone()
    }
}

/// Sampler settings
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Pause between polls
    pub interval: Duration,
    /// Consecutive poll failures tolerated before the sampler gives up
    ///
    /// 0 means the first failure ends the session.
    pub retry_limit: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(limits::SAMPLE_INTERVAL_MS),
            retry_limit: 0,
        }
    }
}

/// Periodic telemetry poller
pub struct TelemetrySampler {
    link: SharedLink,
    log: TelemetryLog,
    shutdown: ShutdownSignal,
    config: SamplerConfig,
}

impl TelemetrySampler {
    pub fn new(
        link: SharedLink,
        log: TelemetryLog,
        shutdown: ShutdownSignal,
        config: SamplerConfig,
    ) -> Self {
        Self {
            link,
            log,
            shutdown,
            config,
        }
    }

    /// Start sampling on its own task
    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }

    /// Sample until shutdown, returning the number of snapshots taken
    ///
    /// When polls keep failing past the retry limit the sampler sets the
    /// shutdown signal itself and stops.
    pub async fn run(self) -> usize {
        info!(
            "[SAMPLER] Started, polling every {:?}",
            self.config.interval
        );
        let mut samples = 0;
        let mut failures = 0u32;

        while !self.shutdown.is_set() {
            match poll(&self.link).await {
                Ok(snapshot) => {
                    failures = 0;
                    debug!(
                        "[SAMPLER] battery={}% height={}cm yaw={}",
                        snapshot.battery, snapshot.height, snapshot.yaw
                    );
                    self.log.append(snapshot).await;
                    samples += 1;
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.config.retry_limit {
                        error!("[SAMPLER] Telemetry error: {}", e);
                        self.shutdown.trigger(ShutdownReason::SamplerFault);
                        break;
                    }
                    warn!(
                        "[SAMPLER] Telemetry error ({}/{}), retrying: {}",
                        failures, self.config.retry_limit, e
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("[SAMPLER] Stopped after {} snapshots", samples);
        samples
    }
}

/// Read every status field in one exclusive session with the link
async fn poll(link: &SharedLink) -> LinkResult<TelemetrySnapshot> {
    let mut link = link.lock().await;
    let timestamp = now_utc();

    Ok(TelemetrySnapshot {
        timestamp,
        battery: link.get_battery().await?,
        height: link.get_height().await?,
        tof_altitude: link.get_tof_altitude().await?,
        barometer: link.get_barometer().await?,
        temperature: link.get_temperature().await?,
        pitch: link.get_pitch().await?,
        roll: link.get_roll().await?,
        yaw: link.get_yaw().await?,
        speed_x: link.get_speed_x().await?,
        speed_y: link.get_speed_y().await?,
        speed_z: link.get_speed_z().await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{self, FaultPoint, LinkError, SimConfig, SimHandle, SimulatedLink};

    async fn connected_link() -> (SharedLink, SimHandle) {
        let sim = SimulatedLink::new(SimConfig {
            command_latency: Duration::ZERO,
            status_latency: Duration::ZERO,
            ..Default::default()
        });
        let handle = sim.handle();
        let link = link::shared(sim);
        link.lock().await.connect().await.unwrap();
        (link, handle)
    }

    fn fast(retry_limit: u32) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(5),
            retry_limit,
        }
    }

    #[tokio::test]
    async fn test_samples_until_shutdown() {
        let (link, _) = connected_link().await;
        let log = TelemetryLog::new();
        let shutdown = ShutdownSignal::new();

        let task = TelemetrySampler::new(link, log.clone(), shutdown.clone(), fast(0)).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger(ShutdownReason::UserExit);

        let samples = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(samples >= 2);
        assert_eq!(log.len().await, samples);

        let snapshots = log.snapshots().await;
        assert_eq!(snapshots[0].battery, 100);
        assert_eq!(snapshots[0].tof_altitude, 10);
        assert!(snapshots.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_stops_promptly_during_sleep() {
        let (link, _) = connected_link().await;
        let shutdown = ShutdownSignal::new();
        let config = SamplerConfig {
            interval: Duration::from_secs(60),
            retry_limit: 0,
        };

        let task = TelemetrySampler::new(link, TelemetryLog::new(), shutdown.clone(), config)
            .spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger(ShutdownReason::Interrupt);

        let samples = tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(samples, 1);
    }

    #[tokio::test]
    async fn test_poll_failure_is_fatal_by_default() {
        let (link, handle) = connected_link().await;
        handle.inject_fault(FaultPoint::Status, LinkError::Io("garbled".into()), 1);
        let log = TelemetryLog::new();
        let shutdown = ShutdownSignal::new();

        let samples = TelemetrySampler::new(link, log.clone(), shutdown.clone(), fast(0))
            .run()
            .await;

        assert_eq!(samples, 0);
        assert!(log.is_empty().await);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::SamplerFault));
    }

    #[tokio::test]
    async fn test_retry_limit_absorbs_transient_failures() {
        let (link, handle) = connected_link().await;
        handle.inject_fault(FaultPoint::Status, LinkError::Io("garbled".into()), 2);
        let log = TelemetryLog::new();
        let shutdown = ShutdownSignal::new();

        let task = TelemetrySampler::new(link, log.clone(), shutdown.clone(), fast(2)).spawn();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!shutdown.is_set());
        assert!(!log.is_empty().await);

        shutdown.trigger(ShutdownReason::UserExit);
        task.await.unwrap();
        assert_eq!(shutdown.reason(), Some(ShutdownReason::UserExit));
    }
}
