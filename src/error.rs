//! Error types for the track edit engine.
//!
//! Edit operations return [`TrackError`]. Every check runs before the first
//! write, so an `Err` always means the track or collection is untouched.
//! Persistence and configuration loading have their own error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the track and collection APIs.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Contract violations raised by [`crate::Track`] and [`crate::TrackCollection`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// A frame index outside `0..len`.
    #[error("Invalid frame index {index} for track of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A half-open frame range that is reversed or runs past the end.
    #[error("Invalid frame range {start}..{end} for track of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// Constructor arrays whose shapes disagree.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A collection was built from, or would be left with, no tracks.
    #[error("Track collection must contain at least one track")]
    EmptyCollection,

    /// A track whose frame count differs from the rest of the collection.
    #[error("Track {index} with len {found} did not match expected len {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// A track index outside `0..num_tracks`.
    #[error("Invalid track index {index} for collection of {len} tracks")]
    TrackIndexOutOfRange { index: usize, len: usize },

    /// Linking a track to itself.
    #[error("Cannot link track {0} to itself")]
    SameTrack(usize),

    /// Filter parameters that cannot produce a stable low-pass design.
    #[error("Invalid filter parameters: {0}")]
    InvalidFilter(String),

    /// Too few detected frames to run the forward-backward filter.
    #[error("Need more than {required} detected frames to filter, found {samples}")]
    SignalTooShort { samples: usize, required: usize },

    /// A [`crate::TrackConfig`] that failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for TrackError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(reason) => Self::InvalidConfig(reason),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}

/// Failures while reading or writing a track file.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Missing file, missing field, wrong dtype or inconsistent shapes.
    #[error("Malformed track file {}: {reason}", path.display())]
    MalformedFile { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write track archive: {0}")]
    Write(#[from] ndarray_npy::WriteNpzError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `save` was called before any path was chosen.
    #[error("No save path set")]
    NoSavePath,

    #[error(transparent)]
    Track(#[from] TrackError),
}

impl PersistError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failures while loading or validating a [`crate::TrackConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TrackError::IndexOutOfRange { index: 12, len: 10 };
        assert_eq!(
            err.to_string(),
            "Invalid frame index 12 for track of length 10"
        );

        let err = PersistError::malformed("/tmp/tracks.npz", "X and Y differ");
        assert!(err.to_string().contains("X and Y differ"));

        let err = TrackError::from(ConfigError::Invalid("undo_depth must be at least 1".into()));
        assert_eq!(
            err,
            TrackError::InvalidConfig("undo_depth must be at least 1".into())
        );
    }
}
