//! Local track manager
//!
//! Owns the one audio and one video track the user is capturing, decides
//! which devices to use (remembering the last ones picked), and makes
//! sure a replaced track is always released.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::VideoConstraints;
use crate::error::DeviceError;
use crate::media::{
    AudioRequest, DeviceSelector, InputInventory, LocalTrack, MediaDevices, TrackKind, TrackRequest,
    VideoOptions, VideoRequest,
};
use crate::preferences::DevicePreferences;
use crate::tracks::single_flight::SingleFlight;

type TrackSlot = Mutex<Option<Arc<LocalTrack>>>;

/// Acquires, replaces and releases local capture tracks.
///
/// Cloning is cheap; clones share the same tracks.
#[derive(Clone)]
pub struct LocalTracks {
    inner: Arc<Inner>,
}

struct Inner {
    /// Platform capture service
    devices: Arc<dyn MediaDevices>,
    /// Last-used microphone and camera
    preferences: DevicePreferences,
    /// Camera constraints applied when a request leaves them open
    video_defaults: VideoConstraints,
    /// Held microphone track
    audio: TrackSlot,
    /// Held camera track
    video: TrackSlot,
    /// Set while a bulk acquisition is running
    acquiring: AtomicBool,
    /// Coordinates concurrent `get_audio_and_video_tracks` calls
    bulk: SingleFlight<Result<(), DeviceError>>,
}

impl LocalTracks {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        preferences: DevicePreferences,
        video_defaults: VideoConstraints,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                devices,
                preferences,
                video_defaults,
                audio: Mutex::new(None),
                video: Mutex::new(None),
                acquiring: AtomicBool::new(false),
                bulk: SingleFlight::new(),
            }),
        }
    }

    pub fn audio_track(&self) -> Option<Arc<LocalTrack>> {
        self.inner.audio.lock().clone()
    }

    pub fn video_track(&self) -> Option<Arc<LocalTrack>> {
        self.inner.video.lock().clone()
    }

    /// Held tracks, audio first
    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.audio_track().into_iter().chain(self.video_track()).collect()
    }

    /// True while a bulk acquisition is enumerating devices or waiting on
    /// the platform for tracks
    pub fn is_acquiring(&self) -> bool {
        self.inner.acquiring.load(Ordering::SeqCst)
    }

    pub fn preferences(&self) -> &DevicePreferences {
        &self.inner.preferences
    }

    /// Acquire a microphone track, replacing the current one.
    ///
    /// With `device_id` the device must match exactly; without it the
    /// last-used microphone is preferred, then the platform default.
    pub async fn get_local_audio_track(&self, device_id: Option<&str>) -> Result<Arc<LocalTrack>, DeviceError> {
        let device = match device_id {
            Some(id) => DeviceSelector::Exact(id.to_string()),
            None => DeviceSelector::preferred(self.inner.preferences.last_used(TrackKind::Audio)),
        };

        tracing::debug!("Acquiring audio track with {:?}", device);
        let track = self
            .inner
            .create_one(TrackRequest::audio(AudioRequest { device }), TrackKind::Audio)
            .await?;
        replace_slot(&self.inner.audio, Some(track.clone()));
        Ok(track)
    }

    /// Acquire a camera track, replacing the current one. `options`
    /// override the configured defaults field by field.
    pub async fn get_local_video_track(&self, options: Option<VideoOptions>) -> Result<Arc<LocalTrack>, DeviceError> {
        let request = self.inner.video_request(options.unwrap_or_default());

        tracing::debug!("Acquiring video track {} with {:?}", request.name, request.device);
        let track = self
            .inner
            .create_one(TrackRequest::video(request), TrackKind::Video)
            .await?;
        replace_slot(&self.inner.video, Some(track.clone()));
        Ok(track)
    }

    pub fn remove_local_audio_track(&self) {
        replace_slot(&self.inner.audio, None);
    }

    pub fn remove_local_video_track(&self) {
        replace_slot(&self.inner.video, None);
    }

    pub fn release_all(&self) {
        self.remove_local_audio_track();
        self.remove_local_video_track();
    }

    /// Acquire both tracks for a new session in a single platform call.
    ///
    /// Resolves without error when there are no input devices at all and
    /// without doing anything when a track is already held. Concurrent
    /// callers share one acquisition and its outcome.
    ///
    /// The acquisition runs to completion and fills the slots even if every
    /// caller stops waiting for it.
    pub async fn get_audio_and_video_tracks(&self) -> Result<(), DeviceError> {
        let owner = Arc::downgrade(&self.inner);
        self.inner
            .bulk
            .run(move || async move {
                match owner.upgrade() {
                    Some(inner) => inner.acquire_all().await,
                    None => Ok(()),
                }
            })
            .await
            .unwrap_or_else(|| Err(DeviceError::Backend("device acquisition task panicked".into())))
    }

    /// Switch the microphone. The choice is remembered even if the held
    /// track cannot restart on it.
    pub async fn replace_audio_device(&self, device_id: &str) -> Result<(), DeviceError> {
        self.replace_device(TrackKind::Audio, device_id).await
    }

    /// Switch the camera, as [`LocalTracks::replace_audio_device`] does for audio
    pub async fn replace_video_device(&self, device_id: &str) -> Result<(), DeviceError> {
        self.replace_device(TrackKind::Video, device_id).await
    }

    async fn replace_device(&self, kind: TrackKind, device_id: &str) -> Result<(), DeviceError> {
        self.inner.preferences.remember(kind, device_id);

        let track = match kind {
            TrackKind::Audio => self.audio_track(),
            TrackKind::Video => self.video_track(),
        };
        match track {
            Some(track) => track.restart(&DeviceSelector::Exact(device_id.to_string())).await,
            None => {
                tracing::debug!("No {} track held, remembered {} for next acquisition", kind, device_id);
                Ok(())
            }
        }
    }
}

impl Inner {
    fn video_request(&self, options: VideoOptions) -> VideoRequest {
        let fallback = DeviceSelector::preferred(self.preferences.last_used(TrackKind::Video));
        VideoRequest::resolve(&self.video_defaults, options, fallback)
    }

    async fn create_one(&self, request: TrackRequest, kind: TrackKind) -> Result<Arc<LocalTrack>, DeviceError> {
        let mut tracks = self.devices.create_local_tracks(request).await?;
        let position = tracks
            .iter()
            .position(|t| t.kind() == kind)
            .ok_or_else(|| DeviceError::Backend(format!("platform returned no {} track", kind)))?;
        let track = tracks.swap_remove(position);
        for extra in tracks {
            extra.release();
        }
        Ok(Arc::new(track))
    }

    async fn acquire_all(&self) -> Result<(), DeviceError> {
        if self.audio.lock().is_some() || self.video.lock().is_some() {
            tracing::debug!("Local tracks already held, skipping acquisition");
            return Ok(());
        }

        self.acquiring.store(true, Ordering::SeqCst);
        let _acquiring = AcquiringFlag(&self.acquiring);

        let inventory = InputInventory::from_devices(&self.devices.enumerate_devices().await?);
        if inventory.is_empty() {
            tracing::info!("No audio or video input devices, joining without local media");
            return Ok(());
        }

        let request = TrackRequest {
            audio: inventory.has_audio.then(|| AudioRequest {
                device: DeviceSelector::preferred(self.preferences.last_used(TrackKind::Audio)),
            }),
            video: inventory
                .has_video
                .then(|| self.video_request(VideoOptions::default())),
        };

        tracing::info!(
            "Acquiring local tracks (audio: {}, video: {})",
            inventory.has_audio,
            inventory.has_video
        );
        let tracks = self.devices.create_local_tracks(request).await?;

        let mut audio = None;
        let mut video = None;
        for track in tracks {
            let slot = match track.kind() {
                TrackKind::Audio => &mut audio,
                TrackKind::Video => &mut video,
            };
            if slot.is_some() {
                track.release();
            } else {
                *slot = Some(Arc::new(track));
            }
        }

        if let Some(track) = &audio {
            tracing::debug!("Holding audio track {} on {}", track.name(), track.device_id());
        }
        if let Some(track) = &video {
            tracing::debug!("Holding video track {} on {}", track.name(), track.device_id());
        }
        if audio.is_some() {
            replace_slot(&self.audio, audio);
        }
        if video.is_some() {
            replace_slot(&self.video, video);
        }
        Ok(())
    }
}

/// Store `track` in `slot`, releasing whatever was there
fn replace_slot(slot: &TrackSlot, track: Option<Arc<LocalTrack>>) {
    let previous = std::mem::replace(&mut *slot.lock(), track);
    if let Some(previous) = previous {
        previous.release();
    }
}

/// Clears the acquiring flag on every exit path
struct AcquiringFlag<'a>(&'a AtomicBool);

impl Drop for AcquiringFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
