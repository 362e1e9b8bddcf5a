//! Virtual channel directory.

use std::collections::HashMap;

use log::{info, warn};
use thiserror::Error;

use hdhr_protocol::{channel_from_lineup, Channel, LineupEntry};

/// Directory construction errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No usable channel in the lineup.
    #[error("Channel lineup is empty ({skipped} entries skipped)")]
    Empty { skipped: usize },
}

/// Immutable map from virtual channel number to tuning parameters.
///
/// Keeps lineup order for playlist rendering.
#[derive(Debug)]
pub struct ChannelDirectory {
    channels: Vec<Channel>,
    by_id: HashMap<String, usize>,
}

impl ChannelDirectory {
    /// Build a directory from already-parsed channels.
    ///
    /// Duplicate ids keep their first occurrence.
    #[cfg(test)]
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Result<Self, DirectoryError> {
        Self::build(channels, 0)
    }

    /// Build a directory from the device lineup, skipping entries whose
    /// tuning parameters cannot be extracted.
    pub fn from_lineup(entries: &[LineupEntry]) -> Result<Self, DirectoryError> {
        let mut skipped = 0;
        let channels: Vec<Channel> = entries
            .iter()
            .filter_map(|entry| match channel_from_lineup(entry) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!("Skipping lineup entry {}: {}", entry.guide_number, e);
                    skipped += 1;
                    None
                }
            })
            .collect();
        Self::build(channels, skipped)
    }

    fn build(channels: impl IntoIterator<Item = Channel>, mut skipped: usize) -> Result<Self, DirectoryError> {
        let mut ordered = Vec::new();
        let mut by_id = HashMap::new();

        for channel in channels {
            if by_id.contains_key(&channel.id) {
                warn!("Duplicate channel {} ignored", channel.id);
                skipped += 1;
                continue;
            }
            by_id.insert(channel.id.clone(), ordered.len());
            ordered.push(channel);
        }

        if ordered.is_empty() {
            return Err(DirectoryError::Empty { skipped });
        }

        info!("Channel directory loaded: {} channels ({} skipped)", ordered.len(), skipped);
        Ok(Self {
            channels: ordered,
            by_id,
        })
    }

    /// Look up a virtual channel.
    pub fn resolve(&self, channel_id: &str) -> Option<&Channel> {
        self.by_id.get(channel_id).map(|&i| &self.channels[i])
    }

    /// All channels in lineup order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
