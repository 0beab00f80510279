//! Town session
//!
//! Wires local tracks, the room connection and token fetching together
//! the way a client screen uses them: acquire media, get a token for the
//! chosen town, connect. Whether the user may join a town is decided by
//! the token service; the session does no membership check of its own.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::media::MediaDevices;
use crate::preferences::{DevicePreferences, PreferenceStore};
use crate::room::{LifecycleSignal, PageLifecycle, RoomConnection, RoomConnector, RoomHandle};
use crate::token::{ErrorSlot, RoomDescriptor, TokenFetcher, TokenProvider};
use crate::tracks::LocalTracks;

/// External collaborators a session is built from
pub struct SessionServices {
    pub media: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn RoomConnector>,
    pub tokens: Arc<dyn TokenProvider>,
    pub preferences: Arc<dyn PreferenceStore>,
}

pub struct TownSession {
    tracks: LocalTracks,
    room: RoomConnection,
    tokens: TokenFetcher,
    errors: ErrorSlot,
    lifecycle: Arc<PageLifecycle>,
}

impl TownSession {
    pub fn new(services: SessionServices, config: &AppConfig) -> Self {
        let errors = ErrorSlot::new();
        let lifecycle = Arc::new(PageLifecycle::new(config.room.form_factor));
        let tracks = LocalTracks::new(
            services.media,
            DevicePreferences::load(services.preferences),
            config.video.clone(),
        );

        let sink = errors.clone();
        let room = RoomConnection::new(
            services.connector,
            tracks.clone(),
            lifecycle.clone(),
            Arc::new(move |e: Error| sink.set_error(e)),
            &config.room,
        );

        Self {
            tracks,
            room,
            tokens: TokenFetcher::new(services.tokens, errors.clone()),
            errors,
            lifecycle,
        }
    }

    pub fn tracks(&self) -> &LocalTracks {
        &self.tracks
    }

    pub fn room(&self) -> &RoomConnection {
        &self.room
    }

    pub fn tokens(&self) -> &TokenFetcher {
        &self.tokens
    }

    pub fn errors(&self) -> &ErrorSlot {
        &self.errors
    }

    pub fn lifecycle(&self) -> &Arc<PageLifecycle> {
        &self.lifecycle
    }

    /// Acquire local media, fetch a token for `town` and connect.
    ///
    /// Device and token failures are returned (and shown in the error
    /// slot). A failed connect only lands in the error slot and yields
    /// `Ok(None)`.
    pub async fn join(&self, town: &RoomDescriptor) -> Result<Option<Arc<dyn RoomHandle>>> {
        if let Err(e) = self.tracks.get_audio_and_video_tracks().await {
            self.errors.set_error(Error::Device(e.clone()));
            return Err(e.into());
        }

        let grant = self.tokens.get_token(town).await?;
        tracing::info!("Joining town {} as {}", town.room_id, town.user_name);
        Ok(self.room.connect(&grant.token).await)
    }

    /// Leave the room, keeping local tracks for the next join
    pub fn leave(&self) -> bool {
        self.room.disconnect()
    }

    /// The page is going away: disconnect through the lifecycle hooks and
    /// release local capture.
    pub fn shutdown(&self) {
        self.lifecycle.emit(LifecycleSignal::BeforeUnload);
        self.tracks.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use crate::media::sim::{SimTokenProvider, SimulatedMedia};
    use crate::preferences::MemoryStore;
    use crate::room::RoomState;
    use std::time::Duration;

    fn session(media: &Arc<SimulatedMedia>, tokens: &Arc<SimTokenProvider>) -> TownSession {
        TownSession::new(
            SessionServices {
                media: media.clone(),
                connector: media.clone(),
                tokens: tokens.clone(),
                preferences: Arc::new(MemoryStore::new()),
            },
            &AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_join_connects_with_tracks() {
        let media = Arc::new(SimulatedMedia::laptop());
        let tokens = Arc::new(SimTokenProvider::new());
        let session = session(&media, &tokens);

        let room = session.join(&RoomDescriptor::new("town-7", "ada")).await.unwrap();

        assert!(room.is_some());
        assert_eq!(session.room().state(), RoomState::Connected);
        assert_eq!(media.last_connect().unwrap().tracks.len(), 2);
        assert_eq!(tokens.requests(), 1);
        assert!(session.errors().error().is_none());
    }

    #[tokio::test]
    async fn test_token_failure_never_connects() {
        let media = Arc::new(SimulatedMedia::laptop());
        let tokens = Arc::new(SimTokenProvider::new());
        tokens.fail_with(TokenError::RequestFailed("town not found".into()));
        let session = session(&media, &tokens);

        let Err(err) = session.join(&RoomDescriptor::new("nowhere", "ada")).await else {
            panic!("join succeeded without a token");
        };

        assert!(matches!(err, Error::Token(_)));
        assert_eq!(media.connects(), 0);
        assert!(matches!(session.errors().error().as_deref(), Some(Error::Token(_))));
    }

    #[tokio::test]
    async fn test_rejected_connect_lands_in_error_slot() {
        let media = Arc::new(SimulatedMedia::laptop());
        media.reject_token("token:town-7:ada");
        let tokens = Arc::new(SimTokenProvider::new());
        let session = session(&media, &tokens);

        let room = session.join(&RoomDescriptor::new("town-7", "ada")).await.unwrap();

        assert!(room.is_none());
        assert_eq!(session.room().state(), RoomState::Idle);
        assert!(matches!(session.errors().error().as_deref(), Some(Error::Connect(_))));
    }

    #[tokio::test]
    async fn test_device_failure_is_reported() {
        let media = Arc::new(SimulatedMedia::laptop());
        media.deny_permission(true);
        let tokens = Arc::new(SimTokenProvider::new());
        let session = session(&media, &tokens);

        let Err(err) = session.join(&RoomDescriptor::new("town-7", "ada")).await else {
            panic!("join succeeded without devices");
        };

        assert!(matches!(err, Error::Device(ref e) if e.is_unavailable()));
        assert_eq!(tokens.requests(), 0);
        assert!(session.errors().error().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_releases() {
        let media = Arc::new(SimulatedMedia::laptop());
        let tokens = Arc::new(SimTokenProvider::new());
        let session = session(&media, &tokens);
        session.join(&RoomDescriptor::new("town-7", "ada")).await.unwrap();

        session.shutdown();

        let mut state = session.room().watch_state();
        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| *s == RoomState::Idle))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(media.live_tracks(), 0);
        assert!(media.rooms()[0].is_ended());
    }
}
