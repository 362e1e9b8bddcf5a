//! In-process exclusion over tuner indices.
//!
//! Each tuner slot has a single-permit semaphore. Whoever holds the permit
//! (a [`TunerLease`]) owns the slot from the free-check until the tuner has
//! been released on the device, so two requests in this process can never
//! tune the same slot.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Lock-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// Another session in this process holds the tuner.
    #[error("Tuner {0} is held by another session")]
    Held(usize),

    /// No such tuner.
    #[error("Tuner index {index} out of range (tuner count: {count})")]
    OutOfRange { index: usize, count: usize },

    /// Lock system is closed.
    #[error("Lock system closed")]
    Closed,
}

/// One exclusion token per tuner slot.
#[derive(Debug)]
pub struct TunerLocks {
    slots: Vec<Arc<Semaphore>>,
}

impl TunerLocks {
    /// Create tokens for `count` tuners.
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| Arc::new(Semaphore::new(1))).collect(),
        }
    }

    /// Take the token for `index` without waiting.
    pub fn try_acquire(&self, index: usize) -> Result<TunerLease, LockError> {
        let slot = self.slots.get(index).ok_or(LockError::OutOfRange {
            index,
            count: self.slots.len(),
        })?;
        let permit = Arc::clone(slot)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => LockError::Held(index),
                TryAcquireError::Closed => LockError::Closed,
            })?;
        Ok(TunerLease {
            index,
            _permit: permit,
        })
    }

    /// Whether a session in this process holds `index`.
    pub fn is_held(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|s| s.available_permits() == 0)
            .unwrap_or(false)
    }

    /// Number of slots currently held.
    pub fn held_count(&self) -> usize {
        self.slots.iter().filter(|s| s.available_permits() == 0).count()
    }
}

/// Exclusive claim on one tuner slot; released on drop.
#[derive(Debug)]
pub struct TunerLease {
    index: usize,
    _permit: OwnedSemaphorePermit,
}

impl TunerLease {
    pub fn index(&self) -> usize {
        self.index
    }
}
