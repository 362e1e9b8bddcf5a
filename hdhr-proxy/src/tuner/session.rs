//! Tuning session: one allocated tuner bound to one viewer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{debug, warn};

use hdhr_protocol::Channel;

use crate::tuner::lock::TunerLease;
use crate::tuner::pool::TunerPool;

/// A tuner tuned to a channel on behalf of one request.
///
/// The session holds the tuner's exclusion token. [`release`] commands the
/// tuner back to idle and only then returns the token. A session dropped
/// without being released spawns the same release in the background, so
/// the tuner is returned exactly once on every path.
///
/// [`release`]: TuningSession::release
pub struct TuningSession {
    id: u64,
    channel: Channel,
    started_at: DateTime<Local>,
    started: Instant,
    pool: Arc<TunerPool>,
    lease: Option<TunerLease>,
    tuner_index: usize,
}

impl TuningSession {
    pub(crate) fn new(id: u64, channel: Channel, pool: Arc<TunerPool>, lease: TunerLease) -> Self {
        Self {
            id,
            channel,
            started_at: Local::now(),
            started: Instant::now(),
            pool,
            tuner_index: lease.index(),
            lease: Some(lease),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tuner_index(&self) -> usize {
        self.tuner_index
    }

    pub fn channel_id(&self) -> &str {
        &self.channel.id
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn pool(&self) -> &Arc<TunerPool> {
        &self.pool
    }

    /// Return the tuner to idle on the device, then give up the slot.
    ///
    /// Best-effort: a failed release command is logged, not returned.
    pub async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            release_tuner(self.id, &self.pool, lease).await;
        }
    }

    /// Give up the slot without touching the device.
    pub(crate) fn abandon(mut self) {
        if let Some(lease) = self.lease.take() {
            debug!(
                "[Session {}] Abandoning tuner {} without release",
                self.id,
                lease.index()
            );
        }
    }
}

async fn release_tuner(session_id: u64, pool: &TunerPool, lease: TunerLease) {
    let index = lease.index();
    if let Err(e) = pool.release(index).await {
        warn!("[Session {}] Failed to release tuner {}: {}", session_id, index, e);
    }
    drop(lease);
}

impl Drop for TuningSession {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let id = self.id;
        let index = lease.index();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("[Session {}] Dropped while holding tuner {}, releasing in background", id, index);
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move {
                    release_tuner(id, &pool, lease).await;
                });
            }
            Err(_) => {
                warn!("[Session {}] Dropped outside the runtime, tuner {} left tuned", id, index);
            }
        }
    }
}

impl std::fmt::Debug for TuningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuningSession")
            .field("id", &self.id)
            .field("tuner_index", &self.tuner_index)
            .field("channel_id", &self.channel.id)
            .field("started_at", &self.started_at)
            .finish()
    }
}
