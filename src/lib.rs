//! # Town Room
//!
//! Room-connection core for a town-style video chat client.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Client UI (external)                         │
//! │   device picker      join form       participant views      toasts   │
//! └──────┬─────────────────┬──────────────────┬─────────────────────┬────┘
//!        │ replace device  │ join(town)       │ on_disconnected     │ error slot
//!        ▼                 ▼                  ▼                     │
//! ┌──────────────────────────────────────────────────────────────────┴───┐
//! │                       TownSession (session)                          │
//! │  ┌───────────────────────┐  ┌─────────────┐  ┌────────────────────┐  │
//! │  │ LocalTracks (tracks)  │  │TokenFetcher │  │ RoomConnection     │  │
//! │  │  audio slot           │  │  (token)    │  │  (room)            │  │
//! │  │  video slot           │  └──────┬──────┘  │  Idle              │  │
//! │  │  single-flight bulk   │         │         │   → Connecting     │  │
//! │  │  acquisition          │─tracks──┼────────▶│   → Connected      │  │
//! │  └──────────┬────────────┘         │         │  teardown hooks    │  │
//! │             │                      │         └───┬────────────┬───┘  │
//! │  ┌──────────▼────────────┐         │             │            │      │
//! │  │ DevicePreferences     │         │             │            │      │
//! │  │  last mic / camera    │         │             │            │      │
//! │  └──────────┬────────────┘         │             │            │      │
//! └─────────────┼──────────────────────┼─────────────┼────────────┼──────┘
//!               ▼                      ▼             ▼            ▼
//!        PreferenceStore        TokenProvider   RoomConnector  PageLifecycle
//!        (memory / file)        (town service)  MediaDevices   (unload, hidden)
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod preferences;
pub mod room;
pub mod session;
pub mod token;
pub mod tracks;

pub use error::{Error, Result};
pub use session::{SessionServices, TownSession};

/// Application-wide constants
pub mod constants {
    /// Default camera width in pixels
    pub const DEFAULT_VIDEO_WIDTH: u32 = 640;

    /// Default camera height in pixels
    pub const DEFAULT_VIDEO_HEIGHT: u32 = 480;

    /// Default camera frame rate
    pub const DEFAULT_VIDEO_FRAME_RATE: u32 = 24;

    /// Room event listener ceiling. Participant views add up to 13
    /// disconnect listeners.
    pub const MAX_ROOM_LISTENERS: usize = 15;

    /// Preference key for the last microphone picked
    pub const LAST_AUDIO_INPUT_KEY: &str = "last-audio-input";

    /// Preference key for the last camera picked
    pub const LAST_VIDEO_INPUT_KEY: &str = "last-video-input";

    pub const CONFIG_FILE_NAME: &str = "config.toml";

    pub const PREFERENCES_FILE_NAME: &str = "devices.toml";
}
