//! Room connection subsystem

pub mod connection;
pub mod handle;
pub mod lifecycle;
pub mod notifier;
pub mod options;

pub use connection::{ErrorHandler, RoomConnection, RoomState};
pub use handle::{ConnectRequest, DisconnectReason, RoomConnector, RoomHandle, TrackPriority, TrackPublication};
pub use lifecycle::{FormFactor, LifecycleSignal, PageLifecycle};
pub use options::{ConnectOptions, OptionsCell};
