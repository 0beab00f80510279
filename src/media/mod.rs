//! Platform media seam
//!
//! The core never talks to capture hardware directly; it goes through
//! [`MediaDevices`], which a browser binding, a native binding or the
//! [`sim`] backend implements.

pub mod device;
pub mod sim;
pub mod track;

use async_trait::async_trait;

use crate::error::DeviceError;

pub use device::{input_devices, DeviceDescriptor, DeviceKind, DeviceSelector, InputInventory};
pub use track::{AudioRequest, LocalTrack, MediaTrack, TrackKind, TrackRequest, VideoOptions, VideoRequest};

/// Device enumeration and capture
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Current device list. Each call is an independent snapshot.
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError>;

    /// Acquire every track in `request` in one platform call (one
    /// permission prompt).
    async fn create_local_tracks(&self, request: TrackRequest) -> Result<Vec<LocalTrack>, DeviceError>;
}
