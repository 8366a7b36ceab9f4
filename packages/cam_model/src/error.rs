use thiserror::Error;

use crate::types::ClassLabel;

/// The video device refused to hand out frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("camera access denied: {0}")]
    Denied(String),

    #[error("no camera available")]
    NoDevice,
}

/// Errors that prevent a session from being created
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("failed to load model from {url}: {reason}")]
    ModelLoad { url: String, reason: String },

    #[error("malformed model metadata: {0}")]
    Metadata(String),

    #[error("model has no class labels")]
    NoLabels,

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("setup was interrupted before it completed")]
    Interrupted,
}

/// Errors from a single classification pass. Never fatal to the frame loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("classifier failed: {0}")]
    Classifier(String),

    #[error("probability {probability} for '{label}' is outside [0, 1]")]
    InvalidProbability { label: ClassLabel, probability: f32 },
}
