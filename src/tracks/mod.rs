//! Local track management

pub mod manager;
pub mod single_flight;

pub use manager::LocalTracks;
pub use single_flight::SingleFlight;
