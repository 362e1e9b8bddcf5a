//! Type definitions for the HDHomeRun control plane and lineup data.

use serde::{Deserialize, Serialize};

/// Channel value reported (and accepted) for an idle tuner.
pub const CHANNEL_NONE: &str = "none";

/// Modulation used by legacy ATSC units.
pub const DEFAULT_MODULATION: &str = "8vsb";

/// Maximum size of one relayed stream chunk (128 KiB).
pub const STREAM_CHUNK_SIZE: usize = 128 * 1024;

/// Read-only path used for keep-alive probes.
pub const SYS_VERSION_PATH: &str = "/sys/version";

/// Prefix of an error reply printed by `hdhomerun_config`.
pub const ERROR_REPLY_PREFIX: &str = "ERROR:";

/// A virtual channel and its physical tuning parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Virtual channel number, e.g. `"7.1"`.
    pub id: String,
    /// Display name from the lineup.
    pub display_name: String,
    /// RF frequency in Hz.
    pub frequency: u64,
    /// MPEG program number within the multiplex.
    pub program_index: u32,
}

impl Channel {
    /// Create a new channel.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        frequency: u64,
        program_index: u32,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            frequency,
            program_index,
        }
    }

    /// Value for `/tunerN/channel`, e.g. `8vsb:569000000`.
    pub fn channel_value(&self, modulation: &str) -> String {
        format!("{}:{}", modulation, self.frequency)
    }

    /// Value for `/tunerN/program`.
    pub fn program_value(&self) -> String {
        self.program_index.to_string()
    }
}

/// One entry of the device's `lineup.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupEntry {
    #[serde(rename = "GuideNumber")]
    pub guide_number: String,
    #[serde(rename = "GuideName", default)]
    pub guide_name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// The device's `discover.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    #[serde(rename = "FriendlyName", default)]
    pub friendly_name: Option<String>,
    #[serde(rename = "ModelNumber", default)]
    pub model_number: Option<String>,
    #[serde(rename = "FirmwareVersion", default)]
    pub firmware_version: Option<String>,
    #[serde(rename = "DeviceID", default)]
    pub device_id: Option<String>,
    #[serde(rename = "TunerCount", default)]
    pub tuner_count: Option<usize>,
    #[serde(rename = "LineupURL", default)]
    pub lineup_url: Option<String>,
}

/// Parsed `/tunerN/status` reply.
///
/// ```text
/// ch=8vsb:569000000 lock=8vsb ss=87 snq=100 seq=100 bps=19394080 pps=0
/// ch=none lock=none ss=0 snq=0 seq=0 bps=0 pps=0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TunerStatus {
    /// Current channel, `None` when the tuner reports `ch=none`.
    pub channel: Option<String>,
    /// Lock state, `None` when unlocked.
    pub lock: Option<String>,
    /// Signal strength (%).
    pub signal_strength: u32,
    /// Signal-to-noise quality (%).
    pub snr_quality: u32,
    /// Symbol error quality (%).
    pub symbol_quality: u32,
    /// Bits per second delivered.
    pub bps: u64,
    /// Packets per second delivered to the network.
    pub pps: u64,
}

impl TunerStatus {
    /// True when the device reports no channel on this tuner.
    pub fn is_idle(&self) -> bool {
        self.channel.is_none()
    }
}

/// A device found by `hdhomerun_config discover`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub device_id: String,
    pub address: String,
}

/// Control-plane paths scoped to a tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunerPath(pub usize);

impl TunerPath {
    /// `/tunerN`, the `save` target.
    pub fn root(self) -> String {
        format!("/tuner{}", self.0)
    }

    /// `/tunerN/status`.
    pub fn status(self) -> String {
        format!("/tuner{}/status", self.0)
    }

    /// `/tunerN/channel`.
    pub fn channel(self) -> String {
        format!("/tuner{}/channel", self.0)
    }

    /// `/tunerN/program`.
    pub fn program(self) -> String {
        format!("/tuner{}/program", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tune_values() {
        let ch = Channel::new("7.1", "KATU", 569_000_000, 3);
        assert_eq!(ch.channel_value(DEFAULT_MODULATION), "8vsb:569000000");
        assert_eq!(ch.program_value(), "3");
    }

    #[test]
    fn test_tuner_paths() {
        let t = TunerPath(1);
        assert_eq!(t.root(), "/tuner1");
        assert_eq!(t.status(), "/tuner1/status");
        assert_eq!(t.channel(), "/tuner1/channel");
        assert_eq!(t.program(), "/tuner1/program");
    }

    #[test]
    fn test_discover_json() {
        let json = r#"{
            "FriendlyName": "HDHomeRun DUAL",
            "ModelNumber": "HDHR3-US",
            "FirmwareVersion": "20200907",
            "DeviceID": "1012ABCD",
            "TunerCount": 2,
            "LineupURL": "http://192.168.1.10/lineup.json"
        }"#;
        let d: DiscoverResponse = serde_json::from_str(json).unwrap();
        assert_eq!(d.tuner_count, Some(2));
        assert_eq!(d.lineup_url.as_deref(), Some("http://192.168.1.10/lineup.json"));

        let sparse: DiscoverResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(sparse, DiscoverResponse::default());
    }

    #[test]
    fn test_lineup_json() {
        let json = r#"[
            {"GuideNumber": "7.1", "GuideName": "KATU", "URL": "http://192.168.1.10/ch569000000-3"},
            {"GuideNumber": "8.1", "URL": "http://192.168.1.10/ch551000000-1"}
        ]"#;
        let entries: Vec<LineupEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].guide_name, "KATU");
        assert_eq!(entries[1].guide_name, "");
    }
}
