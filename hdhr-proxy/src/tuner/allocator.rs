//! Tuner allocation: channel lookup, free-tuner scan and tuning.
//!
//! The allocator:
//! - Validates the channel before touching any tuner
//! - Scans tuner indices in ascending order, so reuse concentrates on the
//!   low-numbered tuners
//! - Holds the slot's exclusion token from the free-check onward
//! - Tunes with two sequential commands and never retries

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use hdhr_protocol::{Channel, TunerPath};

use crate::device::DeviceError;
use crate::tuner::directory::ChannelDirectory;
use crate::tuner::lock::TunerLease;
use crate::tuner::pool::TunerPool;
use crate::tuner::session::TuningSession;

/// Tune command stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneStage {
    /// `set /tunerN/channel <modulation>:<frequency>`
    Channel,
    /// `set /tunerN/program <program>`
    Program,
}

impl fmt::Display for TuneStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuneStage::Channel => write!(f, "channel"),
            TuneStage::Program => write!(f, "program"),
        }
    }
}

/// Allocation errors.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Channel not in the directory.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Every tuner is busy or in an unknown state.
    #[error("No free tuner available")]
    NoFreeTuner,

    /// A tune command failed.
    #[error("Tune failed at {stage} stage: {detail}")]
    TuneCommandFailed { stage: TuneStage, detail: String },
}

/// Hands out tuned sessions.
pub struct TunerAllocator {
    directory: Arc<ChannelDirectory>,
    pool: Arc<TunerPool>,
    modulation: String,
    next_session_id: AtomicU64,
}

impl TunerAllocator {
    /// Create a new allocator.
    pub fn new(directory: Arc<ChannelDirectory>, pool: Arc<TunerPool>, modulation: impl Into<String>) -> Self {
        Self {
            directory,
            pool,
            modulation: modulation.into(),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Get a reference to the tuner pool.
    pub fn pool(&self) -> &Arc<TunerPool> {
        &self.pool
    }

    /// Get a reference to the channel directory.
    pub fn directory(&self) -> &Arc<ChannelDirectory> {
        &self.directory
    }

    /// Find a free tuner and tune it to `channel_id`.
    pub async fn allocate(&self, channel_id: &str) -> Result<TuningSession, AllocationError> {
        let channel = self
            .directory
            .resolve(channel_id)
            .cloned()
            .ok_or_else(|| AllocationError::UnknownChannel(channel_id.to_string()))?;

        let lease = self.find_free_tuner().await.ok_or_else(|| {
            warn!("No free tuner for channel {}", channel_id);
            AllocationError::NoFreeTuner
        })?;

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let index = lease.index();
        info!(
            "[Session {}] Tuning tuner {} to channel {} (freq={}, program={})",
            id, index, channel.id, channel.frequency, channel.program_index
        );

        let session = TuningSession::new(id, channel, Arc::clone(&self.pool), lease);
        match self.tune(index, session.channel()).await {
            Ok(()) => {
                info!("[Session {}] Tuner {} tuned to channel {}", id, index, session.channel_id());
                Ok(session)
            }
            Err((stage, e)) => {
                warn!("[Session {}] Tune failed at {} stage: {}", id, stage, e);
                if stage == TuneStage::Channel && e.is_refusal() {
                    // Channel command never took effect.
                    session.abandon();
                } else {
                    session.release().await;
                }
                Err(AllocationError::TuneCommandFailed {
                    stage,
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Scan the pool in ascending index order for a free tuner.
    ///
    /// Slots held by this process are skipped without a device query. A
    /// failed status query counts as busy.
    async fn find_free_tuner(&self) -> Option<TunerLease> {
        for index in 0..self.pool.count() {
            let lease = match self.pool.try_lease(index) {
                Ok(lease) => lease,
                Err(e) => {
                    debug!("Tuner {} skipped: {}", index, e);
                    continue;
                }
            };

            match self.pool.is_free(index).await {
                Ok(true) => {
                    debug!("Found free tuner: {}", index);
                    return Some(lease);
                }
                Ok(false) => {
                    debug!("Tuner {} is busy on the device", index);
                }
                Err(e) => {
                    warn!("Tuner {} status query failed, treating as busy: {}", index, e);
                }
            }
        }
        None
    }

    /// Send the channel then program commands, stopping at the first failure.
    async fn tune(&self, index: usize, channel: &Channel) -> Result<(), (TuneStage, DeviceError)> {
        let path = TunerPath(index);
        let device = self.pool.device();

        device
            .set(&path.channel(), &channel.channel_value(&self.modulation))
            .await
            .map_err(|e| (TuneStage::Channel, e))?;

        device
            .set(&path.program(), &channel.program_value())
            .await
            .map_err(|e| (TuneStage::Program, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDevice;
    use hdhr_protocol::DEFAULT_MODULATION;

    fn setup(tuners: usize) -> (Arc<FakeDevice>, TunerAllocator) {
        let device = FakeDevice::new(tuners);
        let directory = Arc::new(
            ChannelDirectory::new(vec![
                Channel::new("7.1", "KATU", 569_000_000, 3),
                Channel::new("8.1", "KGW", 551_000_000, 1),
            ])
            .unwrap(),
        );
        let pool = Arc::new(TunerPool::new(device.clone(), tuners));
        (device, TunerAllocator::new(directory, pool, DEFAULT_MODULATION))
    }

    #[tokio::test]
    async fn test_allocate_tunes_lowest_free_tuner() {
        let (device, allocator) = setup(2);

        let session = allocator.allocate("7.1").await.unwrap();
        assert_eq!(session.tuner_index(), 0);
        assert_eq!(session.channel_id(), "7.1");
        assert_eq!(
            device.set_commands(),
            vec![
                "set /tuner0/channel 8vsb:569000000".to_string(),
                "set /tuner0/program 3".to_string(),
            ]
        );
        // Nothing else after tuning: no stream opened yet.
        assert_eq!(device.commands().last().unwrap(), "set /tuner0/program 3");
        assert_eq!(device.tuner_channel(0).as_deref(), Some("8vsb:569000000"));
        session.release().await;
    }

    #[tokio::test]
    async fn test_unknown_channel_touches_nothing() {
        let (device, allocator) = setup(2);

        let err = allocator.allocate("99.9").await.unwrap_err();
        assert!(matches!(err, AllocationError::UnknownChannel(ref id) if id == "99.9"));
        assert!(device.commands().is_empty());
        assert_eq!(allocator.pool().held_count(), 0);
    }

    #[tokio::test]
    async fn test_all_busy_yields_no_free_tuner() {
        let (device, allocator) = setup(2);
        device.occupy(0, "8vsb:473000000");
        device.occupy(1, "8vsb:479000000");

        let err = allocator.allocate("7.1").await.unwrap_err();
        assert!(matches!(err, AllocationError::NoFreeTuner));
        assert!(device.set_commands().is_empty());
        assert_eq!(allocator.pool().held_count(), 0);
    }

    #[tokio::test]
    async fn test_skips_busy_and_unknown_tuners() {
        let (device, allocator) = setup(3);
        device.occupy(0, "8vsb:473000000");
        device.fail_status(1);

        let session = allocator.allocate("8.1").await.unwrap();
        assert_eq!(session.tuner_index(), 2);
        assert_eq!(
            device.commands()[..3],
            [
                "get /tuner0/status".to_string(),
                "get /tuner1/status".to_string(),
                "get /tuner2/status".to_string(),
            ]
        );
        session.release().await;
    }

    #[tokio::test]
    async fn test_sessions_never_exceed_tuner_count() {
        let (device, allocator) = setup(2);

        let first = allocator.allocate("7.1").await.unwrap();
        let second = allocator.allocate("8.1").await.unwrap();
        assert_eq!((first.tuner_index(), second.tuner_index()), (0, 1));
        assert!(matches!(
            allocator.allocate("7.1").await,
            Err(AllocationError::NoFreeTuner)
        ));
        assert_eq!(allocator.pool().held_count(), 2);

        first.release().await;
        assert!(device.is_idle(0));
        let third = allocator.allocate("7.1").await.unwrap();
        assert_eq!(third.tuner_index(), 0);
        assert_eq!(allocator.pool().held_count(), 2);

        second.release().await;
        third.release().await;
        assert_eq!(allocator.pool().held_count(), 0);
    }

    #[tokio::test]
    async fn test_held_slot_is_not_handed_out_twice() {
        let (device, allocator) = setup(1);

        // Another request in this process has claimed tuner 0 but not yet
        // tuned it, so the device still reports it idle.
        let lease = allocator.pool().try_lease(0).unwrap();
        assert!(device.is_idle(0));

        assert!(matches!(
            allocator.allocate("7.1").await,
            Err(AllocationError::NoFreeTuner)
        ));
        assert!(device.commands().is_empty());
        drop(lease);
    }

    #[tokio::test]
    async fn test_concurrent_allocations_on_one_tuner() {
        let (_device, allocator) = setup(1);
        let allocator = Arc::new(allocator);

        let a = tokio::spawn({
            let allocator = Arc::clone(&allocator);
            async move { allocator.allocate("7.1").await }
        });
        let b = tokio::spawn({
            let allocator = Arc::clone(&allocator);
            async move { allocator.allocate("8.1").await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        for result in [a, b] {
            if let Ok(session) = result {
                session.release().await;
            }
        }
    }

    #[tokio::test]
    async fn test_channel_stage_failure_stops_immediately() {
        let (device, allocator) = setup(2);
        device.fail_set("/tuner0/channel");

        let err = allocator.allocate("7.1").await.unwrap_err();
        assert!(matches!(
            err,
            AllocationError::TuneCommandFailed { stage: TuneStage::Channel, .. }
        ));
        tokio::task::yield_now().await;
        assert_eq!(
            device.set_commands(),
            vec!["set /tuner0/channel 8vsb:569000000".to_string()]
        );
        assert_eq!(allocator.pool().held_count(), 0);
    }

    #[tokio::test]
    async fn test_program_stage_failure_releases_tuner() {
        let (device, allocator) = setup(2);
        device.fail_set("/tuner0/program");

        let err = allocator.allocate("7.1").await.unwrap_err();
        assert!(matches!(
            err,
            AllocationError::TuneCommandFailed { stage: TuneStage::Program, .. }
        ));
        assert_eq!(
            device.set_commands(),
            vec![
                "set /tuner0/channel 8vsb:569000000".to_string(),
                "set /tuner0/program 3".to_string(),
                "set /tuner0/channel none".to_string(),
            ]
        );
        assert!(device.is_idle(0));
        assert_eq!(allocator.pool().held_count(), 0);
    }

    #[tokio::test]
    async fn test_lost_channel_reply_still_releases_tuner() {
        let (device, allocator) = setup(1);
        // The device tunes, but the reply never arrives.
        device.lose_set_reply("/tuner0/channel");

        let err = allocator.allocate("7.1").await.unwrap_err();
        assert!(matches!(
            err,
            AllocationError::TuneCommandFailed { stage: TuneStage::Channel, .. }
        ));
        assert_eq!(
            device.set_commands(),
            vec![
                "set /tuner0/channel 8vsb:569000000".to_string(),
                "set /tuner0/channel none".to_string(),
            ]
        );
        assert!(device.is_idle(0));
        assert_eq!(allocator.pool().held_count(), 0);

        let session = allocator.allocate("8.1").await.unwrap();
        assert_eq!(session.tuner_index(), 0);
        session.release().await;
    }
}
