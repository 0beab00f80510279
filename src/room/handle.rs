//! Connected-room seam

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ConnectError;
use crate::media::LocalTrack;
use crate::room::options::ConnectOptions;

/// Transmission priority of a published track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackPriority {
    Low,
    Standard,
    High,
}

/// Why a room connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called on this side
    Local,
    /// The service ended the session (room completed, participant removed)
    Remote(String),
    /// Signaling or media transport failed and reconnection gave up
    Failed(String),
}

/// A locally published track as seen by the room
pub trait TrackPublication: Send + Sync {
    fn track_name(&self) -> String;
    fn priority(&self) -> TrackPriority;
    fn set_priority(&self, priority: TrackPriority);
}

/// Live connection to a room
#[async_trait]
pub trait RoomHandle: Send + Sync {
    /// Service-assigned room id
    fn sid(&self) -> String;

    /// Leave the room. Resolves [`RoomHandle::disconnected`].
    fn disconnect(&self);

    /// Raise the listener ceiling for room events
    fn set_max_listeners(&self, max: usize);

    fn local_video_publications(&self) -> Vec<Arc<dyn TrackPublication>>;

    /// Resolves once, when the connection ends for any reason
    async fn disconnected(&self) -> DisconnectReason;
}

/// Everything the connect primitive is given
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub options: ConnectOptions,
    pub tracks: Vec<Arc<LocalTrack>>,
}

/// The real-time media service's connect primitive
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(&self, token: &str, request: ConnectRequest) -> Result<Arc<dyn RoomHandle>, ConnectError>;
}
