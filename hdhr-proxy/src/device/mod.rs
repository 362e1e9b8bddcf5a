//! Control-plane access to the tuner device.
//!
//! Everything the proxy asks of the hardware goes through [`DeviceLink`]:
//! status queries, tune commands, and the raw `save` stream of a tuner.

mod hdhomerun_config;

#[cfg(test)]
pub(crate) mod fake;

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;

use hdhr_protocol::ProtocolError;

pub use hdhomerun_config::HdhrConfigLink;

/// Time allowed for a terminated `save` process to exit.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from the device control plane.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The control-plane tool could not be started.
    #[error("Failed to run control-plane command: {0}")]
    Spawn(#[source] io::Error),

    /// The command did not complete in time.
    #[error("{verb} {path} timed out after {secs}s")]
    Timeout {
        verb: &'static str,
        path: String,
        secs: u64,
    },

    /// The command exited unsuccessfully.
    #[error("{verb} {path} failed ({status}): {detail}")]
    CommandFailed {
        verb: &'static str,
        path: String,
        status: String,
        detail: String,
    },

    /// The reply could not be interpreted.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl DeviceError {
    /// True when the device cannot have acted on the command: the tool never
    /// ran, or the device answered with a refusal.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            DeviceError::Spawn(_)
                | DeviceError::CommandFailed { .. }
                | DeviceError::Protocol(ProtocolError::DeviceReply(_))
        )
    }
}

/// Handle on the device control plane.
///
/// Implementations must be cheap to share; the proxy holds one instance
/// behind an `Arc` for the lifetime of the process.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Network address of the device.
    fn address(&self) -> &str;

    /// `get <path>`: read a value.
    async fn get(&self, path: &str) -> Result<String, DeviceError>;

    /// `set <path> <value>`: write a value.
    async fn set(&self, path: &str, value: &str) -> Result<(), DeviceError>;

    /// `save <path> -`: open the raw output of a tuner.
    async fn save(&self, path: &str) -> Result<DeviceStream, DeviceError>;
}

/// Shared device handle.
pub type DeviceHandle = Arc<dyn DeviceLink>;

/// A raw byte stream coming off a tuner.
///
/// The stream runs until the device stops sending or [`terminate`] is
/// called. Dropping it also stops the producing process.
///
/// [`terminate`]: DeviceStream::terminate
pub struct DeviceStream {
    label: String,
    reader: Pin<Box<dyn AsyncRead + Send>>,
    process: Option<Child>,
}

impl DeviceStream {
    /// Wrap an arbitrary reader.
    #[cfg(test)]
    pub fn from_reader<R>(label: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            label: label.into(),
            reader: Box::pin(reader),
            process: None,
        }
    }

    /// Wrap a spawned process whose stdout carries the stream.
    pub fn from_process(label: impl Into<String>, mut child: Child) -> io::Result<Self> {
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "process has no stdout pipe")
        })?;
        Ok(Self {
            label: label.into(),
            reader: Box::pin(stdout),
            process: Some(child),
        })
    }

    /// Label used in log lines, e.g. `/tuner0`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read the next available bytes. `Ok(0)` means end of stream.
    ///
    /// Cancel-safe: no data is lost when the future is dropped before it
    /// completes.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).await
    }

    /// Stop the producer and wait briefly for it to exit.
    pub async fn terminate(self) {
        let DeviceStream {
            label,
            reader,
            process,
        } = self;
        drop(reader);

        let Some(mut child) = process else {
            debug!("[{}] Stream closed", label);
            return;
        };

        if let Err(e) = child.start_kill() {
            // Already exited on its own.
            debug!("[{}] Stream process kill: {}", label, e);
        }

        match tokio::time::timeout(TERMINATE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                info!("[{}] Stream process stopped ({})", label, status);
            }
            Ok(Err(e)) => {
                warn!("[{}] Failed to reap stream process: {}", label, e);
            }
            Err(_) => {
                error!(
                    "[{}] Stream process did not exit within {}s",
                    label,
                    TERMINATE_TIMEOUT.as_secs()
                );
            }
        }
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("label", &self.label)
            .field("process", &self.process.as_ref().and_then(|c| c.id()))
            .finish()
    }
}
