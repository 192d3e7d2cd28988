//! Error types for the engine.

use crate::compat::String;
use thiserror::Error;

/// Error type for engine-level operations (UI/main thread only — the audio
/// thread never constructs or propagates these; see [`crate::diagnostics`]).
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid tempo: {0}. must be between 20.0 and 999.0 bpm")]
    InvalidTempo(f32),

    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("plugin unavailable: {0}")]
    PluginUnavailable(String),

    #[error("graph invalid: {0}")]
    GraphInvalid(String),

    #[cfg(feature = "cpal-backend")]
    #[error("audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal-backend")]
    #[error("failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal-backend")]
    #[error("failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal-backend")]
    #[error("failed to pause audio stream")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[cfg(feature = "cpal-backend")]
    #[error("failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "cpal-backend")]
    #[error("failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
