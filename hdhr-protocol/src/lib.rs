//! Control-plane vocabulary for legacy HDHomeRun tuners.
//!
//! This crate defines the text and JSON formats spoken by the device:
//! tuner status replies, lineup documents and the command paths used by
//! `hdhomerun_config`.
//!
//! # Example
//!
//! ```rust
//! use hdhr_protocol::{parse_tuner_status, parse_lineup_url, TunerPath};
//!
//! let status = parse_tuner_status("ch=none lock=none ss=0 snq=0 seq=0 bps=0 pps=0").unwrap();
//! assert!(status.is_idle());
//!
//! let (frequency, program) = parse_lineup_url("http://192.168.1.10/ch569000000-3").unwrap();
//! assert_eq!((frequency, program), (569_000_000, 3));
//!
//! assert_eq!(TunerPath(0).channel(), "/tuner0/channel");
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{
    channel_from_lineup, check_reply, parse_discover_output, parse_lineup_url, parse_tuner_status,
};
pub use error::ProtocolError;
pub use types::{
    Channel, DiscoverResponse, DiscoveredDevice, LineupEntry, TunerPath, TunerStatus,
    CHANNEL_NONE, DEFAULT_MODULATION, ERROR_REPLY_PREFIX, STREAM_CHUNK_SIZE, SYS_VERSION_PATH,
};
