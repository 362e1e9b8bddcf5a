//! Scheduled task management for hdhr-proxy.
//!
//! This module provides:
//! - [`Heartbeat`]: Periodic keep-alive probe of the device control plane

pub mod heartbeat;

pub use heartbeat::{Heartbeat, HeartbeatConfig};
