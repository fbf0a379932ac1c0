//! Error types for vadgate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VadgateError {
    // Capture errors
    #[error("Capture permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio capture failed: {message}")]
    CaptureFailure { message: String },

    #[error("Audio device not found: {device}")]
    DeviceNotFound { device: String },

    // Model errors
    #[error("Failed to load VAD model: {message}")]
    ModelLoadFailure { message: String },

    #[error("VAD inference failed: {message}")]
    InferenceFailure { message: String },

    // Configuration errors
    #[error("Invalid configuration for {key}: {message}")]
    ConfigInvalid { key: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Anything that indicates a bug in the engine itself
    #[error("Internal error: {message}")]
    Internal { message: String },
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VadgateError>;
