//! Tuner pool backed by device status queries.

use log::{debug, info};

use hdhr_protocol::{parse_tuner_status, ProtocolError, TunerPath, TunerStatus, CHANNEL_NONE};

use crate::device::{DeviceError, DeviceHandle};
use crate::tuner::lock::{LockError, TunerLease, TunerLocks};

/// Fixed-size set of tuner slots on one device.
///
/// Slot state is never cached: the device is the source of truth and may be
/// retuned by other clients at any time, so every query goes to the device.
/// The pool also owns the in-process exclusion tokens for its slots.
pub struct TunerPool {
    device: DeviceHandle,
    count: usize,
    locks: TunerLocks,
}

impl TunerPool {
    /// Create a pool of `count` tuners on `device`.
    pub fn new(device: DeviceHandle, count: usize) -> Self {
        Self {
            device,
            count,
            locks: TunerLocks::new(count),
        }
    }

    /// Number of tuners.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The device this pool lives on.
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    fn check_index(&self, index: usize) -> Result<TunerPath, DeviceError> {
        if index >= self.count {
            return Err(ProtocolError::TunerOutOfRange {
                index,
                count: self.count,
            }
            .into());
        }
        Ok(TunerPath(index))
    }

    /// Query the device-reported status of a tuner.
    pub async fn status(&self, index: usize) -> Result<TunerStatus, DeviceError> {
        let path = self.check_index(index)?;
        let reply = self.device.get(&path.status()).await?;
        Ok(parse_tuner_status(&reply)?)
    }

    /// Whether the device reports the tuner as idle (`ch=none`).
    ///
    /// Callers must treat an error as "not free".
    pub async fn is_free(&self, index: usize) -> Result<bool, DeviceError> {
        let status = self.status(index).await?;
        debug!("Tuner {} status: channel={:?}", index, status.channel);
        Ok(status.is_idle())
    }

    /// Command the tuner back to idle. Safe to repeat.
    pub async fn release(&self, index: usize) -> Result<(), DeviceError> {
        let path = self.check_index(index)?;
        self.device.set(&path.channel(), CHANNEL_NONE).await?;
        info!("Tuner {} released", index);
        Ok(())
    }

    /// Take the exclusion token for a slot without waiting.
    pub fn try_lease(&self, index: usize) -> Result<TunerLease, LockError> {
        self.locks.try_acquire(index)
    }

    /// Whether a session in this process holds the slot.
    pub fn is_held(&self, index: usize) -> bool {
        self.locks.is_held(index)
    }

    /// Number of slots held by sessions in this process.
    pub fn held_count(&self) -> usize {
        self.locks.held_count()
    }
}
