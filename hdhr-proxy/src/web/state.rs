//! Web server shared state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use dns_lookup::lookup_addr;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::tuner::{StreamBridge, TunerAllocator, TuningSession};

/// Information about an active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session ID.
    pub id: u64,
    /// Tuner index.
    pub tuner: usize,
    /// Virtual channel number.
    pub channel: String,
    /// Channel display name.
    pub channel_name: String,
    /// Client address (if known).
    pub addr: Option<String>,
    /// Client hostname (reverse DNS).
    pub host: Option<String>,
    /// Session start time.
    pub started_at: DateTime<Local>,
    /// Seconds since the stream started.
    pub duration_secs: u64,
    /// Bytes relayed to the client so far.
    pub bytes_relayed: u64,
}

#[derive(Debug)]
struct SessionEntry {
    tuner: usize,
    channel: String,
    channel_name: String,
    addr: Option<SocketAddr>,
    host: Option<String>,
    started_at: DateTime<Local>,
    started: Instant,
    bytes: Arc<AtomicU64>,
}

/// Byte counter handed to the relay of a registered session.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    id: u64,
    bytes: Arc<AtomicU64>,
}

impl SessionTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Account for `n` more bytes sent to the client.
    pub fn add_bytes(&self, n: usize) {
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Registry for tracking active sessions.
///
/// Observability only: allocation never consults it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, SessionEntry>>,
}

impl SessionRegistry {
    /// Create a new session registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a streaming session.
    ///
    /// The reverse lookup of the client address runs in the background and
    /// fills in the host name when it completes.
    pub async fn register(self: &Arc<Self>, session: &TuningSession, addr: Option<SocketAddr>) -> SessionTicket {
        let id = session.id();
        let bytes = Arc::new(AtomicU64::new(0));
        let entry = SessionEntry {
            tuner: session.tuner_index(),
            channel: session.channel_id().to_string(),
            channel_name: session.channel().display_name.clone(),
            addr,
            host: None,
            started_at: session.started_at(),
            started: Instant::now(),
            bytes: Arc::clone(&bytes),
        };
        self.sessions.write().await.insert(id, entry);

        if let Some(addr) = addr {
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                let ip = addr.ip();
                let host = tokio::task::spawn_blocking(move || lookup_addr(&ip).ok())
                    .await
                    .ok()
                    .flatten();
                if let Some(entry) = registry.sessions.write().await.get_mut(&id) {
                    entry.host = host;
                }
            });
        }

        SessionTicket { id, bytes }
    }

    /// Unregister a session.
    pub async fn unregister(&self, id: u64) {
        self.sessions.write().await.remove(&id);
    }

    /// Get all active sessions, ordered by ID.
    pub async fn get_all(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionInfo> = sessions
            .iter()
            .map(|(&id, entry)| SessionInfo {
                id,
                tuner: entry.tuner,
                channel: entry.channel.clone(),
                channel_name: entry.channel_name.clone(),
                addr: entry.addr.map(|a| a.to_string()),
                host: entry.host.clone(),
                started_at: entry.started_at,
                duration_secs: entry.started.elapsed().as_secs(),
                bytes_relayed: entry.bytes.load(Ordering::Relaxed),
            })
            .collect();
        list.sort_by_key(|s| s.id);
        list
    }

    /// Get session count.
    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// HTTP route settings.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Playlist path, e.g. `/lineup.m3u`.
    pub playlist_path: String,
    /// Stream URL prefix, e.g. `/auto/v`.
    pub stream_prefix: String,
    /// Host used in playlist URLs when the request has no `Host` header.
    pub advertise_host: String,
}

/// Shared state for the web server.
pub struct WebState {
    /// Tuner allocator (owns the directory and pool).
    pub allocator: Arc<TunerAllocator>,
    /// Stream bridge.
    pub bridge: StreamBridge,
    /// Session registry.
    pub session_registry: Arc<SessionRegistry>,
    /// Route settings.
    pub routes: RouteConfig,
}

impl WebState {
    /// Create a new web state.
    pub fn new(allocator: Arc<TunerAllocator>, session_registry: Arc<SessionRegistry>, routes: RouteConfig) -> Self {
        Self {
            allocator,
            bridge: StreamBridge::new(Arc::clone(&session_registry)),
            session_registry,
            routes,
        }
    }
}
