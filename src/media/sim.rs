//! In-process simulated media service
//!
//! Fake devices, tracks, rooms and tokens with counters and failure
//! switches. Used by the test suite and by the `town-client` binary when
//! no real media binding is linked in.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{ConnectError, DeviceError, TokenError};
use crate::media::device::{DeviceDescriptor, DeviceKind, DeviceSelector};
use crate::media::track::{LocalTrack, MediaTrack, TrackKind, TrackRequest, VideoRequest};
use crate::media::MediaDevices;
use crate::room::handle::{
    ConnectRequest, DisconnectReason, RoomConnector, RoomHandle, TrackPriority, TrackPublication,
};
use crate::token::{RoomDescriptor, TokenGrant, TokenProvider};

type DeviceList = Arc<RwLock<Vec<DeviceDescriptor>>>;

/// Simulated capture hardware and media service
pub struct SimulatedMedia {
    /// Attached hardware, shared with open tracks for restarts
    devices: DeviceList,
    /// Delay before each platform or service call answers
    latency: Mutex<Duration>,
    /// Fail every track request as if the user said no
    deny_permission: Mutex<bool>,
    /// `create_local_tracks` calls
    track_requests: AtomicUsize,
    /// Tracks opened and not yet stopped
    live_tracks: Arc<AtomicUsize>,
    /// Last camera request that reached the platform
    last_video: Mutex<Option<VideoRequest>>,
    /// Tokens `connect` refuses
    rejected_tokens: Mutex<HashSet<String>>,
    /// `connect` calls
    connects: AtomicUsize,
    /// Last request `connect` accepted
    last_connect: Mutex<Option<ConnectRequest>>,
    /// Rooms handed out
    rooms: Mutex<Vec<Arc<SimRoom>>>,
}

impl SimulatedMedia {
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Arc::new(RwLock::new(devices)),
            latency: Mutex::new(Duration::ZERO),
            deny_permission: Mutex::new(false),
            track_requests: AtomicUsize::new(0),
            live_tracks: Arc::new(AtomicUsize::new(0)),
            last_video: Mutex::new(None),
            rejected_tokens: Mutex::new(HashSet::new()),
            connects: AtomicUsize::new(0),
            last_connect: Mutex::new(None),
            rooms: Mutex::new(Vec::new()),
        }
    }

    /// A laptop: one microphone, one camera, one speaker
    pub fn laptop() -> Self {
        Self::with_devices(vec![
            DeviceDescriptor::new("default-mic", "Built-in Microphone", DeviceKind::AudioInput),
            DeviceDescriptor::new("default-cam", "Built-in Camera", DeviceKind::VideoInput),
            DeviceDescriptor::new("default-spk", "Built-in Speakers", DeviceKind::AudioOutput),
        ])
    }

    /// Delay applied to every platform and service call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn deny_permission(&self, deny: bool) {
        *self.deny_permission.lock() = deny;
    }

    pub fn unplug(&self, device_id: &str) {
        self.devices.write().retain(|d| d.device_id != device_id);
    }

    /// Make `connect` reject this token
    pub fn reject_token(&self, token: &str) {
        self.rejected_tokens.lock().insert(token.to_string());
    }

    /// Number of `create_local_tracks` calls, failed ones included
    pub fn track_requests(&self) -> usize {
        self.track_requests.load(Ordering::SeqCst)
    }

    /// Tracks created and not yet stopped
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    pub fn last_video_request(&self) -> Option<VideoRequest> {
        self.last_video.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_connect(&self) -> Option<ConnectRequest> {
        self.last_connect.lock().clone()
    }

    /// Every room handed out, oldest first
    pub fn rooms(&self) -> Vec<Arc<SimRoom>> {
        self.rooms.lock().clone()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn open_track(&self, kind: TrackKind, name: String, device: &DeviceSelector) -> Result<LocalTrack, DeviceError> {
        let device_kind = device_kind(kind);
        let device_id = device.resolve(&self.devices.read(), device_kind)?.device_id.clone();

        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        let inner = SimTrack {
            kind: device_kind,
            devices: self.devices.clone(),
            live_tracks: self.live_tracks.clone(),
        };
        Ok(LocalTrack::new(kind, name, device_id, Box::new(inner)))
    }
}

#[async_trait]
impl MediaDevices for SimulatedMedia {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        self.delay().await;
        Ok(self.devices.read().clone())
    }

    async fn create_local_tracks(&self, request: TrackRequest) -> Result<Vec<LocalTrack>, DeviceError> {
        self.delay().await;
        self.track_requests.fetch_add(1, Ordering::SeqCst);

        if request.is_empty() {
            return Err(DeviceError::Backend("track request names no media kind".into()));
        }

        if *self.deny_permission.lock() {
            return Err(DeviceError::PermissionDenied("camera and microphone".into()));
        }

        let mut tracks = Vec::new();
        if let Some(audio) = &request.audio {
            let name = format!("microphone-{}", uuid::Uuid::new_v4().simple());
            tracks.push(self.open_track(TrackKind::Audio, name, &audio.device)?);
        }
        if let Some(video) = request.video {
            match self.open_track(TrackKind::Video, video.name.clone(), &video.device) {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    tracks.iter().for_each(LocalTrack::release);
                    return Err(e);
                }
            }
            *self.last_video.lock() = Some(video);
        }
        Ok(tracks)
    }
}

#[async_trait]
impl RoomConnector for SimulatedMedia {
    async fn connect(&self, token: &str, request: ConnectRequest) -> Result<Arc<dyn RoomHandle>, ConnectError> {
        self.delay().await;
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;

        if self.rejected_tokens.lock().contains(token) {
            return Err(ConnectError::Rejected(format!("invalid access token {}", token)));
        }

        let publications = request
            .tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .map(|t| Arc::new(SimPublication::new(t.name())))
            .collect();
        let room = Arc::new(SimRoom::new(format!("RM{:04}", attempt), publications));

        *self.last_connect.lock() = Some(request);
        self.rooms.lock().push(room.clone());
        Ok(room as Arc<dyn RoomHandle>)
    }
}

fn device_kind(kind: TrackKind) -> DeviceKind {
    match kind {
        TrackKind::Audio => DeviceKind::AudioInput,
        TrackKind::Video => DeviceKind::VideoInput,
    }
}

struct SimTrack {
    kind: DeviceKind,
    devices: DeviceList,
    live_tracks: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaTrack for SimTrack {
    fn stop(&self) {
        self.live_tracks.fetch_sub(1, Ordering::SeqCst);
    }

    async fn restart(&self, device: &DeviceSelector) -> Result<String, DeviceError> {
        let devices = self.devices.read();
        Ok(device.resolve(&devices, self.kind)?.device_id.clone())
    }
}

/// Published track inside a [`SimRoom`]
pub struct SimPublication {
    name: String,
    priority: Mutex<TrackPriority>,
}

impl SimPublication {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: Mutex::new(TrackPriority::Standard),
        }
    }
}

impl TrackPublication for SimPublication {
    fn track_name(&self) -> String {
        self.name.clone()
    }

    fn priority(&self) -> TrackPriority {
        *self.priority.lock()
    }

    fn set_priority(&self, priority: TrackPriority) {
        *self.priority.lock() = priority;
    }
}

/// Simulated connected room
pub struct SimRoom {
    sid: String,
    ended: watch::Sender<Option<DisconnectReason>>,
    max_listeners: AtomicUsize,
    disconnect_calls: AtomicUsize,
    publications: Vec<Arc<SimPublication>>,
}

impl SimRoom {
    fn new(sid: String, publications: Vec<Arc<SimPublication>>) -> Self {
        let (ended, _) = watch::channel(None);
        Self {
            sid,
            ended,
            max_listeners: AtomicUsize::new(10),
            disconnect_calls: AtomicUsize::new(0),
            publications,
        }
    }

    /// End the session from the service side. Only the first end counts.
    pub fn end(&self, reason: DisconnectReason) {
        self.ended.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_ended(&self) -> bool {
        self.ended.borrow().is_some()
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomHandle for SimRoom {
    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.end(DisconnectReason::Local);
    }

    fn set_max_listeners(&self, max: usize) {
        self.max_listeners.store(max, Ordering::SeqCst);
    }

    fn local_video_publications(&self) -> Vec<Arc<dyn TrackPublication>> {
        self.publications
            .iter()
            .map(|p| p.clone() as Arc<dyn TrackPublication>)
            .collect()
    }

    async fn disconnected(&self) -> DisconnectReason {
        let mut ended = self.ended.subscribe();
        let reason = match ended.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        reason.unwrap_or(DisconnectReason::Local)
    }
}

/// Token service that signs `token:<room>:<user>`
pub struct SimTokenProvider {
    failure: Mutex<Option<TokenError>>,
    issue_empty: Mutex<bool>,
    requests: AtomicUsize,
}

impl SimTokenProvider {
    pub fn new() -> Self {
        Self {
            failure: Mutex::new(None),
            issue_empty: Mutex::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(&self, error: TokenError) {
        *self.failure.lock() = Some(error);
    }

    pub fn issue_empty(&self, empty: bool) {
        *self.issue_empty.lock() = empty;
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for SimTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for SimTokenProvider {
    async fn get_token(&self, room: &RoomDescriptor) -> Result<TokenGrant, TokenError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let token = if *self.issue_empty.lock() {
            String::new()
        } else {
            format!("token:{}:{}", room.room_id, room.user_name)
        };
        Ok(TokenGrant {
            token,
            expiry: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
            room_connection_id: Some(format!("RM-{}", room.room_id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::track::AudioRequest;

    #[tokio::test]
    async fn test_room_ends_once() {
        let media = SimulatedMedia::laptop();
        let room = media
            .connect("t", ConnectRequest { options: Default::default(), tracks: Vec::new() })
            .await
            .unwrap();
        let sim_room = media.rooms()[0].clone();

        sim_room.end(DisconnectReason::Remote("room completed".into()));
        room.disconnect();

        assert_eq!(room.disconnected().await, DisconnectReason::Remote("room completed".into()));
        assert_eq!(sim_room.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_unplugged_device_cannot_restart() {
        let media = SimulatedMedia::laptop();
        let track = media
            .create_local_tracks(TrackRequest::audio(AudioRequest { device: DeviceSelector::Default }))
            .await
            .unwrap()
            .remove(0);

        media.unplug("default-mic");
        let err = track.restart(&DeviceSelector::Default).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(media.live_tracks(), 1);
    }
}
