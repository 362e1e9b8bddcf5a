//! Tuner session management.
//!
//! This module provides:
//! - [`ChannelDirectory`]: Virtual channel number to tuning parameters
//! - [`TunerPool`]: Device-backed tuner slots with in-process exclusion
//! - [`TunerAllocator`]: Free-tuner scan and tuning
//! - [`TuningSession`]: One tuned tuner, released exactly once
//! - [`StreamBridge`]: Relay of a tuner's stream into an HTTP body

pub mod allocator;
pub mod bridge;
pub mod directory;
pub mod lock;
pub mod pool;
pub mod session;

pub use allocator::{AllocationError, TunerAllocator};
pub use bridge::{BridgeError, StreamBridge};
pub use directory::ChannelDirectory;
pub use pool::TunerPool;
pub use session::TuningSession;
