//! Error types for the unipiece trainer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for training and segmentation.
#[derive(Error, Debug)]
pub enum TrainerError {
    /// A public operation was invoked with an invalid spec or input.
    ///
    /// Precondition failures are raised before any corpus work starts and
    /// are never partially executed.
    #[error("Precondition violation: {0}")]
    Precondition(String),

    /// A sentence symbol has no covering piece at some boundary.
    ///
    /// This indicates the seeding/coverage step upstream is broken; the
    /// current training run fails and is not retried.
    #[error("No piece covers symbol boundary {pos} in {sentence:?}")]
    CoverageGap { pos: usize, sentence: String },

    /// Expected counts degenerated (e.g. zero total count over the corpus).
    ///
    /// Raised instead of propagating NaN/infinite scores into the model.
    #[error("Degenerate counts: {0}")]
    DegenerateCounts(String),

    /// The vocabulary under construction violates a structural invariant.
    #[error("Invalid vocabulary: {0}")]
    InvalidVocab(String),

    /// I/O error with file context
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for trainer operations.
pub type Result<T> = std::result::Result<T, TrainerError>;
