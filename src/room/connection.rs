//! Room connection lifecycle
//!
//! ```text
//!   Idle ──connect()──▶ Connecting ──ok──▶ Connected
//!    ▲                      │                  │
//!    └──── error reported ──┘                  │ room "disconnected"
//!    └──────────── subscribers, then reset ────┘
//! ```
//!
//! While connected, the page-lifecycle signals for the current form
//! factor disconnect the room. Those hooks exist only while connected.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::RoomConfig;
use crate::error::{ConnectError, Error};
use crate::room::handle::{ConnectRequest, RoomConnector, RoomHandle, TrackPriority};
use crate::room::lifecycle::{ListenerId, PageLifecycle};
use crate::room::notifier::{DisconnectListener, DisconnectNotifier, SubscriptionId};
use crate::room::options::{ConnectOptions, OptionsCell};
use crate::tracks::LocalTracks;

/// Receives every connect failure, once each
pub type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Idle,
    Connecting,
    Connected,
}

/// Owner of the single room connection.
///
/// `connect` must only be called while [`RoomState::Idle`]. Calling it
/// in any other state never opens a second room; the call is reported to
/// the error handler as [`ConnectError::AlreadyActive`] instead.
#[derive(Clone)]
pub struct RoomConnection {
    inner: Arc<Inner>,
}

struct Inner {
    /// Media service connect primitive
    connector: Arc<dyn RoomConnector>,
    /// Tracks published on connect
    tracks: LocalTracks,
    /// Source of teardown signals
    lifecycle: Arc<PageLifecycle>,
    /// Read once per connect
    options: OptionsCell,
    on_error: ErrorHandler,
    /// Listener ceiling applied to each room
    max_listeners: usize,
    notifier: DisconnectNotifier,
    session: Mutex<Session>,
    /// Mirrors `Session::state` for watchers
    state_tx: watch::Sender<RoomState>,
}

struct Session {
    state: RoomState,
    /// Bumped by every accepted connect; stale results compare unequal
    generation: u64,
    /// Present only while connected
    room: Option<Arc<dyn RoomHandle>>,
    /// Teardown listeners installed for the current room
    hooks: Vec<ListenerId>,
}

impl RoomConnection {
    pub fn new(
        connector: Arc<dyn RoomConnector>,
        tracks: LocalTracks,
        lifecycle: Arc<PageLifecycle>,
        on_error: ErrorHandler,
        config: &RoomConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(RoomState::Idle);
        Self {
            inner: Arc::new(Inner {
                connector,
                tracks,
                lifecycle,
                options: OptionsCell::new(config.connect.clone()),
                on_error,
                max_listeners: config.max_listeners,
                notifier: DisconnectNotifier::new(),
                session: Mutex::new(Session {
                    state: RoomState::Idle,
                    generation: 0,
                    room: None,
                    hooks: Vec::new(),
                }),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> RoomState {
        self.inner.session.lock().state
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == RoomState::Connecting
    }

    /// The live room, present only while connected
    pub fn room(&self) -> Option<Arc<dyn RoomHandle>> {
        self.inner.session.lock().room.clone()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<RoomState> {
        self.inner.state_tx.subscribe()
    }

    pub fn tracks(&self) -> &LocalTracks {
        &self.inner.tracks
    }

    /// Holder read by the next `connect`
    pub fn options(&self) -> &OptionsCell {
        &self.inner.options
    }

    pub fn set_options(&self, options: ConnectOptions) {
        self.inner.options.set(options);
    }

    /// Called with the reason whenever a connected room goes away, before
    /// this connection resets. Subscriptions outlive individual rooms.
    pub fn on_disconnected(&self, listener: DisconnectListener) -> SubscriptionId {
        self.inner.notifier.subscribe(listener)
    }

    pub fn remove_disconnect_listener(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    /// Connect to the room `token` grants access to, publishing whatever
    /// local tracks are held right now.
    ///
    /// Failures go to the error handler and leave the connection idle;
    /// they are not returned. The attempt runs on its own task, so
    /// abandoning this future does not abandon the attempt.
    pub async fn connect(&self, token: &str) -> Option<Arc<dyn RoomHandle>> {
        let generation = match self.inner.begin_connect() {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("connect() rejected: {}", e);
                (self.inner.on_error)(Error::Connect(e));
                return None;
            }
        };

        let request = ConnectRequest {
            options: self.inner.options.get(),
            tracks: self.inner.tracks.tracks(),
        };
        tracing::info!("Connecting to room with {} local tracks", request.tracks.len());

        let connector = self.inner.connector.clone();
        let owner = Arc::downgrade(&self.inner);
        let token = token.to_string();
        let attempt = tokio::spawn(async move {
            let result = connector.connect(&token, request).await;
            match owner.upgrade() {
                Some(inner) => inner.settle(generation, result),
                None => {
                    if let Ok(room) = result {
                        tracing::debug!("Owner gone, closing room {}", room.sid());
                        room.disconnect();
                    }
                    None
                }
            }
        });

        match attempt.await {
            Ok(room) => room,
            Err(e) => {
                tracing::error!("Connect task failed: {}", e);
                self.inner.fail(generation, ConnectError::Aborted);
                None
            }
        }
    }

    /// Leave the current room. Returns false when not connected.
    pub fn disconnect(&self) -> bool {
        match self.room() {
            Some(room) => {
                tracing::info!("Disconnecting from room {}", room.sid());
                room.disconnect();
                true
            }
            None => {
                tracing::debug!("disconnect() with no connected room");
                false
            }
        }
    }
}

impl Inner {
    fn set_state(&self, session: &mut Session, state: RoomState) {
        session.state = state;
        self.state_tx.send_replace(state);
    }

    fn begin_connect(&self) -> Result<u64, ConnectError> {
        let mut session = self.session.lock();
        match session.state {
            RoomState::Connected => return Err(ConnectError::AlreadyActive("connected")),
            RoomState::Connecting => return Err(ConnectError::AlreadyActive("connecting")),
            RoomState::Idle => {}
        }
        session.generation += 1;
        self.set_state(&mut session, RoomState::Connecting);
        Ok(session.generation)
    }

    fn settle(
        self: &Arc<Self>,
        generation: u64,
        result: Result<Arc<dyn RoomHandle>, ConnectError>,
    ) -> Option<Arc<dyn RoomHandle>> {
        let room = match result {
            Ok(room) => room,
            Err(e) => {
                self.fail(generation, e);
                return None;
            }
        };

        let mut session = self.session.lock();
        if session.generation != generation || session.state != RoomState::Connecting {
            drop(session);
            tracing::warn!("Discarding room {} from a superseded connect", room.sid());
            room.disconnect();
            return None;
        }

        room.set_max_listeners(self.max_listeners);
        // Everything starts low; the main speaker view raises the one it renders.
        for publication in room.local_video_publications() {
            publication.set_priority(TrackPriority::Low);
        }
        session.hooks = self.install_teardown_hooks(&room);
        session.room = Some(room.clone());
        self.set_state(&mut session, RoomState::Connected);
        drop(session);

        tracing::info!("Connected to room {}", room.sid());
        self.watch_disconnect(generation, room.clone());
        Some(room)
    }

    fn fail(&self, generation: u64, error: ConnectError) {
        {
            let mut session = self.session.lock();
            if session.generation == generation && session.state == RoomState::Connecting {
                self.set_state(&mut session, RoomState::Idle);
            }
        }
        tracing::warn!("Failed to connect to room: {}", error);
        (self.on_error)(Error::Connect(error));
    }

    fn install_teardown_hooks(&self, room: &Arc<dyn RoomHandle>) -> Vec<ListenerId> {
        self.lifecycle
            .teardown_signals()
            .iter()
            .map(|&signal| {
                let room = Arc::downgrade(room);
                self.lifecycle.add_listener(
                    signal,
                    Arc::new(move || {
                        if let Some(room) = room.upgrade() {
                            tracing::info!("{:?}: disconnecting from room {}", signal, room.sid());
                            room.disconnect();
                        }
                    }),
                )
            })
            .collect()
    }

    fn watch_disconnect(self: &Arc<Self>, generation: u64, room: Arc<dyn RoomHandle>) {
        let owner = Arc::downgrade(self);
        tokio::spawn(async move {
            let reason = room.disconnected().await;
            tracing::info!("Room {} disconnected: {:?}", room.sid(), reason);
            if let Some(inner) = owner.upgrade() {
                inner
                    .notifier
                    .notify(&reason, |_| inner.finish_disconnect(generation));
            }
        });
    }

    fn finish_disconnect(&self, generation: u64) {
        let hooks = {
            let mut session = self.session.lock();
            if session.generation != generation {
                tracing::debug!("Ignoring disconnect of a superseded room");
                return;
            }
            session.room = None;
            self.set_state(&mut session, RoomState::Idle);
            std::mem::take(&mut session.hooks)
        };
        for hook in hooks {
            self.lifecycle.remove_listener(hook);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        for hook in session.hooks.drain(..) {
            self.lifecycle.remove_listener(hook);
        }
        if let Some(room) = session.room.take() {
            tracing::debug!("Connection dropped, disconnecting room {}", room.sid());
            room.disconnect();
        }
    }
}
