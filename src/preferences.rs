//! Persisted device preferences
//!
//! The last microphone and camera the user picked survive restarts.
//! Storage is injected through [`PreferenceStore`] so tests can use
//! [`MemoryStore`] and applications a [`FileStore`].

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::write_file;
use crate::constants::{LAST_AUDIO_INPUT_KEY, LAST_VIDEO_INPUT_KEY};
use crate::error::ConfigError;
use crate::media::TrackKind;

/// String key/value persistence
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// `None` removes the key
    fn set(&self, key: &str, value: Option<&str>) -> Result<(), ConfigError>;
}

/// In-memory store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.values.write().insert(key.to_string(), value.to_string());
        store
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        let mut values = self.values.write();
        match value {
            Some(v) => values.insert(key.to_string(), v.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// TOML file store; every `set` rewrites the file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened preference store {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        let mut values = self.values.lock();
        match value {
            Some(v) => values.insert(key.to_string(), v.to_string()),
            None => values.remove(key),
        };
        let text = toml::to_string(&*values)?;
        write_file(&self.path, &text)
    }
}

/// Last-used device ids, read once at construction and written through
/// on every explicit switch
pub struct DevicePreferences {
    store: Arc<dyn PreferenceStore>,
    last_audio_input: Mutex<Option<String>>,
    last_video_input: Mutex<Option<String>>,
}

impl DevicePreferences {
    pub fn load(store: Arc<dyn PreferenceStore>) -> Self {
        let last_audio_input = store.get(LAST_AUDIO_INPUT_KEY);
        let last_video_input = store.get(LAST_VIDEO_INPUT_KEY);
        tracing::debug!(
            "Loaded device preferences: mic={:?} camera={:?}",
            last_audio_input,
            last_video_input
        );
        Self {
            store,
            last_audio_input: Mutex::new(last_audio_input),
            last_video_input: Mutex::new(last_video_input),
        }
    }

    pub fn last_used(&self, kind: TrackKind) -> Option<String> {
        self.slot(kind).lock().clone()
    }

    /// Remember `device_id` for `kind`. A storage failure is logged; the
    /// in-memory value is still updated for this session.
    pub fn remember(&self, kind: TrackKind, device_id: &str) {
        *self.slot(kind).lock() = Some(device_id.to_string());
        let key = match kind {
            TrackKind::Audio => LAST_AUDIO_INPUT_KEY,
            TrackKind::Video => LAST_VIDEO_INPUT_KEY,
        };
        if let Err(e) = self.store.set(key, Some(device_id)) {
            tracing::warn!("Failed to persist {} preference: {}", kind, e);
        }
    }

    fn slot(&self, kind: TrackKind) -> &Mutex<Option<String>> {
        match kind {
            TrackKind::Audio => &self.last_audio_input,
            TrackKind::Video => &self.last_video_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", Some("v")).unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.set("k", None).unwrap();
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("devices.toml");

        let store = FileStore::open(&path).unwrap();
        store.set(LAST_AUDIO_INPUT_KEY, Some("mic-usb")).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(LAST_AUDIO_INPUT_KEY).as_deref(), Some("mic-usb"));
        assert_eq!(reopened.get(LAST_VIDEO_INPUT_KEY), None);
    }

    #[test]
    fn test_preferences_read_at_load() {
        let store: Arc<dyn PreferenceStore> = Arc::new(MemoryStore::with_value(LAST_VIDEO_INPUT_KEY, "cam-1"));
        let prefs = DevicePreferences::load(store.clone());
        assert_eq!(prefs.last_used(TrackKind::Video).as_deref(), Some("cam-1"));
        assert_eq!(prefs.last_used(TrackKind::Audio), None);

        // Outside writes are not picked up after load.
        store.set(LAST_VIDEO_INPUT_KEY, Some("cam-2")).unwrap();
        assert_eq!(prefs.last_used(TrackKind::Video).as_deref(), Some("cam-1"));

        prefs.remember(TrackKind::Audio, "mic-2");
        assert_eq!(store.get(LAST_AUDIO_INPUT_KEY).as_deref(), Some("mic-2"));
    }
}
