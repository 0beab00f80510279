//! Local capture tracks
//!
//! A [`LocalTrack`] wraps one live platform capture stream. It is
//! released explicitly through [`LocalTrack::release`]; dropping the
//! handle does not stop the underlying capture.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::VideoConstraints;
use crate::error::DeviceError;
use crate::media::device::DeviceSelector;

/// Kind of a local track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Platform capture stream behind a local track
#[async_trait]
pub trait MediaTrack: Send + Sync {
    /// Stop capturing and free the device
    fn stop(&self);

    /// Re-source the stream from another device, keeping the track identity.
    /// Returns the id of the device now in use.
    async fn restart(&self, device: &DeviceSelector) -> Result<String, DeviceError>;
}

/// Handle to a live local audio or video capture
pub struct LocalTrack {
    kind: TrackKind,
    /// Logical name, unique per track; published under this name
    name: String,
    /// Device currently captured, updated by `restart`
    device_id: Mutex<String>,
    /// Set once the platform track has been stopped
    released: AtomicBool,
    /// Platform track
    inner: Box<dyn MediaTrack>,
}

impl LocalTrack {
    pub fn new(
        kind: TrackKind,
        name: impl Into<String>,
        device_id: impl Into<String>,
        inner: Box<dyn MediaTrack>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            device_id: Mutex::new(device_id.into()),
            released: AtomicBool::new(false),
            inner,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Logical track name, unique per acquisition
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device currently sourcing this track
    pub fn device_id(&self) -> String {
        self.device_id.lock().clone()
    }

    /// Stop the capture. Safe to call more than once.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Releasing {} track {} ({})", self.kind, self.name, self.device_id());
        self.inner.stop();
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Switch the capture to `device` without replacing the track
    pub async fn restart(&self, device: &DeviceSelector) -> Result<(), DeviceError> {
        if self.is_released() {
            return Err(DeviceError::NoTrack(self.name.clone()));
        }
        let device_id = self.inner.restart(device).await?;
        tracing::info!("Restarted {} track {} on device {}", self.kind, self.name, device_id);
        *self.device_id.lock() = device_id;
        Ok(())
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("device_id", &self.device_id())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Caller overrides for a video capture; unset fields keep the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoOptions {
    /// Capture width in pixels
    pub width: Option<u32>,
    /// Capture height in pixels
    pub height: Option<u32>,
    /// Frames per second
    pub frame_rate: Option<u32>,
    /// Track name; a fresh `camera-<uuid>` when absent
    pub name: Option<String>,
    /// Camera to use; the last-used camera when absent
    pub device: Option<DeviceSelector>,
}

/// Fully resolved audio capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRequest {
    pub device: DeviceSelector,
}

/// Fully resolved video capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub name: String,
    pub device: DeviceSelector,
}

impl VideoRequest {
    /// Apply `options` over `defaults` field by field. A fresh logical
    /// name is generated when the caller does not supply one.
    pub fn resolve(defaults: &VideoConstraints, options: VideoOptions, fallback: DeviceSelector) -> Self {
        Self {
            width: options.width.unwrap_or(defaults.width),
            height: options.height.unwrap_or(defaults.height),
            frame_rate: options.frame_rate.unwrap_or(defaults.frame_rate),
            name: options.name.unwrap_or_else(camera_track_name),
            device: options.device.unwrap_or(fallback),
        }
    }
}

/// One platform request for up to one track of each kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRequest {
    /// Microphone to open, if any
    pub audio: Option<AudioRequest>,
    /// Camera to open, if any
    pub video: Option<VideoRequest>,
}

impl TrackRequest {
    pub fn audio(request: AudioRequest) -> Self {
        Self { audio: Some(request), video: None }
    }

    pub fn video(request: VideoRequest) -> Self {
        Self { audio: None, video: Some(request) }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

/// Logical name for a new camera track
pub fn camera_track_name() -> String {
    format!("camera-{}", uuid::Uuid::new_v4().simple())
}
