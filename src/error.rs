//! Error types for PCA fitting and low-rank image reconstruction.

use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, DimRedError>;

/// Errors raised by the PCA engine, the image reconstructor and their collaborators.
///
/// Every error is local and synchronous: it is returned by the call that violated
/// its contract and nothing is retried.
#[derive(Error, Debug)]
pub enum DimRedError {
    /// Constructor or configuration arguments are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `fit` was given a dataset with zero samples.
    #[error("dataset contains no samples")]
    EmptyDataset,

    /// Feature or component counts disagree between the model and its input.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: &'static str,
    },

    /// A model query was issued before `fit`.
    #[error("model has not been fitted; call fit first")]
    NotFitted,

    /// The requested rank is outside `[1, max]`.
    #[error("invalid rank {rank}: must be between 1 and {max}")]
    InvalidRank { rank: i64, max: usize },

    /// The source image could not be read or decoded.
    #[error("failed to load image {path:?}: {source}")]
    InvalidImage {
        path: PathBuf,
        #[source]
        source: ThreadSafeStdError,
    },

    /// A filesystem write failed during batch processing. `rank` is `None` when the
    /// failure happened before any rank was processed (output folder creation).
    #[error("I/O failure at {path:?} (rank {rank:?}): {source}")]
    IoFailure {
        rank: Option<usize>,
        path: PathBuf,
        #[source]
        source: ThreadSafeStdError,
    },

    /// The dense SVD provider reported a failure.
    #[error("SVD backend failure: {0}")]
    Backend(String),

    /// Model encoding or decoding failed.
    #[error("model serialization failed: {0}")]
    Serialization(String),

    /// Opening or creating a model file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DimRedError {
    pub(crate) fn dimension_mismatch(expected: usize, actual: usize, context: &'static str) -> Self {
        DimRedError::DimensionMismatch {
            expected,
            actual,
            context,
        }
    }
}

/// Parses a rank given as text, such as a command-line argument.
///
/// Negative and zero values are rejected with [`DimRedError::InvalidRank`]; the upper
/// bound depends on the image and is checked later by `reconstruct`.
pub fn parse_rank(text: &str) -> Result<usize> {
    let value: i64 = text.trim().parse().map_err(|_| {
        DimRedError::InvalidConfiguration(format!("rank {:?} is not an integer", text))
    })?;
    if value < 1 {
        return Err(DimRedError::InvalidRank {
            rank: value,
            max: 0,
        });
    }
    usize::try_from(value).map_err(|_| DimRedError::InvalidRank {
        rank: value,
        max: 0,
    })
}
