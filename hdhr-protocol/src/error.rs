//! Error types for the HDHomeRun control-plane vocabulary.

use thiserror::Error;

/// Errors raised while interpreting device replies and lineup data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Tuner status reply has no `ch=` field.
    #[error("Malformed tuner status: {0:?}")]
    MalformedStatus(String),

    /// Numeric status field could not be parsed.
    #[error("Invalid value for status field '{field}': {value:?}")]
    InvalidStatusField { field: String, value: String },

    /// Lineup URL does not carry a `ch<frequency>-<program>` component.
    #[error("Cannot extract frequency/program from lineup URL: {0}")]
    InvalidLineupUrl(String),

    /// The device replied with an `ERROR:` line.
    #[error("Device reported error: {0}")]
    DeviceReply(String),

    /// Tuner index is outside the pool.
    #[error("Tuner index {index} out of range (tuner count: {count})")]
    TunerOutOfRange { index: usize, count: usize },
}
