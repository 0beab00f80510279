//! Capture device descriptors and selection

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Kind of a platform media device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::AudioInput => write!(f, "audioinput"),
            DeviceKind::AudioOutput => write!(f, "audiooutput"),
            DeviceKind::VideoInput => write!(f, "videoinput"),
        }
    }
}

/// Snapshot of one device as reported by a single enumeration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceDescriptor {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind,
        }
    }
}

/// How a track request picks its device.
///
/// `Exact` fails when the id is not present; `Preferred` falls back to
/// the platform default, which is how remembered devices are seeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    #[default]
    Default,
    Preferred(String),
    Exact(String),
}

impl DeviceSelector {
    /// Prefer `id` when one is remembered, otherwise the platform default
    pub fn preferred(id: Option<String>) -> Self {
        id.map_or(DeviceSelector::Default, DeviceSelector::Preferred)
    }

    /// Resolve the selector against an enumeration snapshot
    pub fn resolve<'a>(
        &self,
        devices: &'a [DeviceDescriptor],
        kind: DeviceKind,
    ) -> Result<&'a DeviceDescriptor, DeviceError> {
        let mut candidates = devices.iter().filter(|d| d.kind == kind);
        match self {
            DeviceSelector::Default => candidates
                .next()
                .ok_or_else(|| DeviceError::Unavailable(format!("no {} device", kind))),
            DeviceSelector::Exact(id) => candidates
                .find(|d| &d.device_id == id)
                .ok_or_else(|| DeviceError::Unavailable(id.clone())),
            DeviceSelector::Preferred(id) => {
                let all: Vec<_> = candidates.collect();
                all.iter()
                    .find(|d| &d.device_id == id)
                    .or_else(|| all.first())
                    .copied()
                    .ok_or_else(|| DeviceError::Unavailable(format!("no {} device", kind)))
            }
        }
    }
}

/// Which input kinds an enumeration snapshot contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputInventory {
    pub has_audio: bool,
    pub has_video: bool,
}

impl InputInventory {
    pub fn from_devices(devices: &[DeviceDescriptor]) -> Self {
        Self {
            has_audio: devices.iter().any(|d| d.kind == DeviceKind::AudioInput),
            has_video: devices.iter().any(|d| d.kind == DeviceKind::VideoInput),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_audio && !self.has_video
    }
}

/// Input devices of one kind, in enumeration order
pub fn input_devices(devices: &[DeviceDescriptor], kind: DeviceKind) -> Vec<&DeviceDescriptor> {
    devices.iter().filter(|d| d.kind == kind).collect()
}
