//! Town Client
//!
//! Joins a town against the simulated media service and stays connected
//! until Ctrl+C, which is delivered as a before-unload signal.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use town_room::{
    config::AppConfig,
    media::{input_devices, sim::{SimTokenProvider, SimulatedMedia}, DeviceKind, MediaDevices},
    preferences::{FileStore, MemoryStore, PreferenceStore},
    room::RoomState,
    token::RoomDescriptor,
    SessionServices, TownSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting town client");

    let config_path = AppConfig::default_path()?;
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let preferences: Arc<dyn PreferenceStore> = match config
        .preferences
        .resolved_path()
        .and_then(FileStore::open)
    {
        Ok(store) => {
            tracing::info!("Device preferences stored in {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!("Device preferences will not persist: {}", e);
            Arc::new(MemoryStore::new())
        }
    };

    let media = Arc::new(SimulatedMedia::laptop());

    let devices = media.enumerate_devices().await?;
    println!("\n=== Available Input Devices ===");
    for (title, kind) in [("Microphones", DeviceKind::AudioInput), ("Cameras", DeviceKind::VideoInput)] {
        println!("{}:", title);
        for device in input_devices(&devices, kind) {
            println!("  {}", device.label);
            println!("    ID: {}", device.device_id);
        }
    }
    println!();

    let session = TownSession::new(
        SessionServices {
            media: media.clone(),
            connector: media.clone(),
            tokens: Arc::new(SimTokenProvider::new()),
            preferences,
        },
        &config,
    );

    let mut args = std::env::args().skip(1);
    let town = RoomDescriptor::new(
        args.next().unwrap_or_else(|| "town-square".to_string()),
        args.next().unwrap_or_else(|| "guest".to_string()),
    );

    let Some(room) = session.join(&town).await? else {
        let reason = session
            .errors()
            .error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("Unable to join town {}: {}", town.room_id, reason);
    };

    let left = session.room().on_disconnected(Arc::new(|reason| {
        tracing::info!("Room closed: {:?}", reason);
    }));

    tracing::info!(
        "In room {} with {} local tracks - press Ctrl+C to leave",
        room.sid(),
        session.tracks().tracks().len()
    );

    tokio::signal::ctrl_c().await?;
    session.shutdown();

    let mut state = session.room().watch_state();
    if tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == RoomState::Idle))
        .await
        .is_err()
    {
        tracing::warn!("Room did not report disconnection in time");
    }
    session.room().remove_disconnect_listener(left);

    tracing::info!("Left town {}", town.room_id);
    Ok(())
}
