//! Connect options and the holder they are read from

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How remote video is allotted bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BandwidthMode {
    Grid,
    Collaboration,
    PresentationOnly,
}

/// Reconnection behaviour requested from the media service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionPolicy {
    /// Let the service resume a dropped signaling connection
    pub enabled: bool,
    /// Attempts before the room reports a failure disconnect
    pub max_attempts: u32,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self { enabled: true, max_attempts: 3 }
    }
}

/// Options passed through to the connect primitive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Preferred signaling region
    pub region: Option<String>,
    /// Remote video allocation; the service default when absent
    pub bandwidth_mode: Option<BandwidthMode>,
    /// Outgoing audio bitrate cap in bits per second
    pub max_audio_bitrate: Option<u32>,
    /// Request dominant-speaker events
    pub dominant_speaker: bool,
    /// Request network-quality reports
    pub network_quality: bool,
    pub reconnection: ReconnectionPolicy,
    /// Backend-specific settings forwarded untouched
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Shared, mutable holder for [`ConnectOptions`].
///
/// `connect` clones the current value when it is called, so an update
/// made at any time before that is honoured.
#[derive(Debug, Clone, Default)]
pub struct OptionsCell {
    inner: Arc<RwLock<ConnectOptions>>,
}

impl OptionsCell {
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(options)),
        }
    }

    pub fn get(&self) -> ConnectOptions {
        self.inner.read().clone()
    }

    pub fn set(&self, options: ConnectOptions) {
        *self.inner.write() = options;
    }

    pub fn update(&self, f: impl FnOnce(&mut ConnectOptions)) {
        f(&mut self.inner.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_is_shared() {
        let cell = OptionsCell::default();
        let handle = cell.clone();

        handle.update(|o| o.region = Some("de1".into()));
        assert_eq!(cell.get().region.as_deref(), Some("de1"));

        cell.set(ConnectOptions::default());
        assert_eq!(handle.get(), ConnectOptions::default());
    }

    #[test]
    fn test_extra_passthrough() {
        let options: ConnectOptions = serde_json::from_str(
            r#"{"bandwidth_mode":"collaboration","extra":{"preferredVideoCodecs":["VP8"]}}"#,
        )
        .unwrap();
        assert_eq!(options.bandwidth_mode, Some(BandwidthMode::Collaboration));
        assert!(options.reconnection.enabled);
        assert_eq!(options.extra["preferredVideoCodecs"][0], "VP8");
    }
}
