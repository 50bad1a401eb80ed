//! Error types for voice sessions.

use std::path::PathBuf;

use thiserror::Error;

/// A session-level failure.
///
/// Reported once, when the session moves to
/// [`Failed`](crate::SessionState::Failed). Per-chunk problems and a close
/// before the endpoint acknowledged the session are never reported here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The microphone or output device cannot be acquired.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The channel to the remote endpoint failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SessionError {
    pub(crate) fn device(err: concierge_audio::Error) -> Self {
        match err {
            concierge_audio::Error::DeviceUnavailable(reason) => {
                SessionError::DeviceUnavailable(reason)
            }
            other => SessionError::DeviceUnavailable(other.to_string()),
        }
    }

    pub(crate) fn transport(err: concierge_live::Error) -> Self {
        match err {
            concierge_live::Error::Transport(reason) => SessionError::Transport(reason),
            other => SessionError::Transport(other.to_string()),
        }
    }

    /// Returns true for device errors, which need user action before a retry.
    pub fn is_device(&self) -> bool {
        matches!(self, SessionError::DeviceUnavailable(_))
    }
}

/// Errors that can occur while loading a session configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid YAML for a session.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
