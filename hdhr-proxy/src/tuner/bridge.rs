//! Stream bridge: relays a tuner's raw stream into an HTTP response body.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hdhr_protocol::{TunerPath, STREAM_CHUNK_SIZE};

use crate::device::DeviceStream;
use crate::tuner::session::TuningSession;
use crate::web::state::{SessionRegistry, SessionTicket};

/// How long a device fault waits for room in the body channel.
const FAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The device stream could not be opened.
    #[error("Failed to open stream on tuner {tuner}: {detail}")]
    StreamOpenFailed { tuner: usize, detail: String },
}

/// How a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The device stopped sending.
    Completed,
    /// The HTTP client went away.
    ClientDisconnected,
    /// Reading from the device failed.
    DeviceFault,
}

/// A running relay.
///
/// `body` yields the stream chunks; `task` resolves once the relay has
/// finished and the tuner has been released.
#[derive(Debug)]
pub struct Relay {
    pub body: mpsc::Receiver<io::Result<Bytes>>,
    pub task: JoinHandle<RelayOutcome>,
}

impl Relay {
    /// Turn the body receiver into a byte stream for the response.
    ///
    /// The relay task keeps running detached. Dropping the returned stream
    /// is how a client disconnect reaches the relay.
    pub fn into_body_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let Relay { mut body, task } = self;
        drop(task);
        futures::stream::poll_fn(move |cx| body.poll_recv(cx))
    }
}

/// Connects tuning sessions to HTTP response bodies.
pub struct StreamBridge {
    registry: Arc<SessionRegistry>,
}

impl StreamBridge {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Open the tuner's stream and start relaying it.
    ///
    /// Takes ownership of the session. Whatever happens, the tuner is
    /// released exactly once: here when the stream cannot be opened,
    /// otherwise by the relay task when it ends.
    pub async fn serve(&self, session: TuningSession, client: Option<SocketAddr>) -> Result<Relay, BridgeError> {
        let tuner = session.tuner_index();
        let path = TunerPath(tuner).root();

        let stream = match session.pool().device().save(&path).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("[Session {}] Failed to open stream on {}: {}", session.id(), path, e);
                session.release().await;
                return Err(BridgeError::StreamOpenFailed {
                    tuner,
                    detail: e.to_string(),
                });
            }
        };

        let ticket = self.registry.register(&session, client).await;
        info!(
            "[Session {}] Streaming channel {} from {} to {}",
            session.id(),
            session.channel_id(),
            path,
            client.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string())
        );

        let (tx, rx) = mpsc::channel(1);
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            let mut stream = stream;
            let outcome = pump(&mut stream, &tx, &ticket).await;
            drop(tx);

            let id = session.id();
            let elapsed = session.elapsed();
            stream.terminate().await;
            session.release().await;
            registry.unregister(id).await;

            info!(
                "[Session {}] Relay ended: {:?} ({} bytes in {:.1}s)",
                id,
                outcome,
                ticket.bytes(),
                elapsed.as_secs_f64()
            );
            outcome
        });

        Ok(Relay { body: rx, task })
    }
}

/// Copy chunks from the device to the body channel until one side ends.
async fn pump(
    stream: &mut DeviceStream,
    tx: &mpsc::Sender<io::Result<Bytes>>,
    ticket: &SessionTicket,
) -> RelayOutcome {
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            _ = tx.closed() => {
                info!("[Session {}] Client disconnected", ticket.id());
                return RelayOutcome::ClientDisconnected;
            }
            read = stream.read_chunk(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("[Session {}] Device stream {} ended", ticket.id(), stream.label());
                return RelayOutcome::Completed;
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if tx.send(Ok(chunk)).await.is_err() {
                    info!("[Session {}] Client disconnected", ticket.id());
                    return RelayOutcome::ClientDisconnected;
                }
                ticket.add_bytes(n);
            }
            Err(e) => {
                error!("[Session {}] Device stream {} read error: {}", ticket.id(), stream.label(), e);
                // Abort the response; a stalled client must not block cleanup.
                if !matches!(tokio::time::timeout(FAULT_NOTIFY_TIMEOUT, tx.send(Err(e))).await, Ok(Ok(()))) {
                    debug!("[Session {}] Could not forward read error to client", ticket.id());
                }
                return RelayOutcome::DeviceFault;
            }
        }
    }
}
