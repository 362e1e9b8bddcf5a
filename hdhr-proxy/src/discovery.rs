//! Startup discovery over the device's HTTP interface.

use std::time::Duration;

use log::{debug, info};
use reqwest::Client;
use thiserror::Error;

use hdhr_protocol::{DiscoverResponse, LineupEntry};

/// Per-request timeout for discovery calls.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Network or HTTP status failure.
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The device answered with something that is not the expected JSON.
    #[error("Invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// `discover.json` carries no `LineupURL`.
    #[error("LineupURL not found in {0}")]
    MissingLineupUrl(String),
}

/// What the device reports about itself and its channels.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub discover: DiscoverResponse,
    pub lineup: Vec<LineupEntry>,
}

/// HTTP client for `discover.json` and the lineup document.
pub struct Discovery {
    client: Client,
}

impl Discovery {
    /// Create a client with the default timeout.
    pub fn new() -> Result<Self, DiscoveryError> {
        Self::with_timeout(DISCOVERY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DiscoveryError> {
        // The device is always on the local network.
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|source| DiscoveryError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    /// Fetch `discover.json` from the device at `address`.
    pub async fn discover(&self, address: &str) -> Result<DiscoverResponse, DiscoveryError> {
        let url = format!("http://{}/discover.json", address);
        self.get_json(&url).await
    }

    /// Fetch a lineup document.
    pub async fn lineup(&self, url: &str) -> Result<Vec<LineupEntry>, DiscoveryError> {
        self.get_json(url).await
    }

    /// Fetch `discover.json`, then the lineup it points to.
    pub async fn fetch(&self, address: &str) -> Result<DeviceInfo, DiscoveryError> {
        let discover = self.discover(address).await?;
        info!(
            "Device {} ({}), firmware {}, {} tuners",
            discover.device_id.as_deref().unwrap_or("unknown"),
            discover.model_number.as_deref().unwrap_or("unknown model"),
            discover.firmware_version.as_deref().unwrap_or("unknown"),
            discover
                .tuner_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );

        let lineup_url = discover
            .lineup_url
            .clone()
            .ok_or_else(|| DiscoveryError::MissingLineupUrl(format!("http://{}/discover.json", address)))?;

        let lineup = self.lineup(&lineup_url).await?;
        info!("Fetched {} lineup entries from {}", lineup.len(), lineup_url);
        Ok(DeviceInfo { discover, lineup })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, DiscoveryError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| DiscoveryError::Http {
                url: url.to_string(),
                source,
            })?;
        response.json().await.map_err(|source| DiscoveryError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
