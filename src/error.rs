//! Error types for the room client core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture device errors.
///
/// `Unavailable` and `PermissionDenied` together form the "device
/// unavailable" class: the caller decides whether to fall back to the
/// default device or notify the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    #[error("No track held for {0}")]
    NoTrack(String),

    #[error("Media backend error: {0}")]
    Backend(String),
}

impl DeviceError {
    /// True for the errors that mean the requested device cannot be used
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DeviceError::Unavailable(_) | DeviceError::PermissionDenied(_))
    }
}

/// Room connection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Room at capacity: {0}")]
    Capacity(String),

    #[error("A room connection is already {0}")]
    AlreadyActive(&'static str),

    #[error("Connect attempt aborted before it settled")]
    Aborted,
}

/// Token service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token request failed: {0}")]
    RequestFailed(String),

    #[error("Token service returned no token for room {0}")]
    Missing(String),
}

/// Configuration and preference storage errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No home directory available for config")]
    NoConfigDir,

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_class() {
        assert!(DeviceError::Unavailable("mic-1".into()).is_unavailable());
        assert!(DeviceError::PermissionDenied("camera".into()).is_unavailable());
        assert!(!DeviceError::Backend("boom".into()).is_unavailable());
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ConnectError::Rejected("bad token".into()).into();
        assert_eq!(err.to_string(), "Connect error: Connection rejected: bad token");
    }
}
