//! Application configuration
//!
//! Loaded from a TOML file in the platform config directory. Every
//! section has defaults so a missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;
use crate::room::lifecycle::FormFactor;
use crate::room::options::ConnectOptions;

/// Default capture constraints for camera tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIDEO_WIDTH,
            height: DEFAULT_VIDEO_HEIGHT,
            frame_rate: DEFAULT_VIDEO_FRAME_RATE,
        }
    }
}

/// Room connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Listener ceiling applied to every connected room
    pub max_listeners: usize,
    /// Form factor used to decide which page signals disconnect the room
    pub form_factor: FormFactor,
    /// Initial connect options
    pub connect: ConnectOptions,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_listeners: MAX_ROOM_LISTENERS,
            form_factor: FormFactor::Desktop,
            connect: ConnectOptions::default(),
        }
    }
}

/// Where remembered devices are stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Preference file; `None` uses the platform data directory
    pub path: Option<PathBuf>,
}

impl PreferencesConfig {
    pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => project_dirs()
                .map(|dirs| dirs.data_dir().join(PREFERENCES_FILE_NAME))
                .ok_or(ConfigError::NoConfigDir),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub video: VideoConstraints,
    pub room: RoomConfig,
    pub preferences: PreferencesConfig,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        write_file(path, &text)
    }
}

pub(crate) fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("town", "town-room", "town-room")
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.video, VideoConstraints { width: 640, height: 480, frame_rate: 24 });
        assert_eq!(config.room.max_listeners, 15);
        assert_eq!(config.room.form_factor, FormFactor::Desktop);
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [video]
            frame_rate = 30

            [room]
            form_factor = "mobile"

            [room.connect]
            region = "gll"
            "#,
        )
        .unwrap();

        assert_eq!(config.video.width, 640);
        assert_eq!(config.video.frame_rate, 30);
        assert_eq!(config.room.form_factor, FormFactor::Mobile);
        assert_eq!(config.room.connect.region.as_deref(), Some("gll"));
        assert_eq!(config.room.max_listeners, 15);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.room.max_listeners = 20;
        config.preferences.path = Some(dir.path().join("prefs.toml"));
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
        assert_eq!(
            AppConfig::load_or_default(&dir.path().join("missing.toml")).unwrap(),
            AppConfig::default()
        );
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "video = 3").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
