//! Periodic keep-alive probe.
//!
//! The device's control plane goes quiet between streams. A cheap read-only
//! query on a fixed period keeps it responsive; no tuner is involved and no
//! exclusion token is taken.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use hdhr_protocol::SYS_VERSION_PATH;

use crate::device::DeviceHandle;

/// Heartbeat configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between probes.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Keep-alive task for one device.
pub struct Heartbeat {
    device: DeviceHandle,
    config: HeartbeatConfig,
}

impl Heartbeat {
    /// Create a new heartbeat.
    pub fn new(device: DeviceHandle, config: HeartbeatConfig) -> Self {
        Self { device, config }
    }

    /// Start the heartbeat background task.
    ///
    /// The task never exits on its own; abort the handle or shut down the
    /// runtime to stop it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let period = self.config.interval;
        info!(
            "Heartbeat: Probing {} every {} seconds",
            self.device.address(),
            period.as_secs()
        );

        // First probe one full period after start.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.probe().await;
        }
    }

    async fn probe(&self) {
        match self.device.get(SYS_VERSION_PATH).await {
            Ok(version) => debug!("Heartbeat: device firmware {}", version),
            Err(e) => warn!("Heartbeat: probe of {} failed: {}", self.device.address(), e),
        }
    }
}
