//! Error types for comparisons

use thiserror::Error;
use vlm_judge::VlmError;

use crate::store::StoreError;

/// Errors that can surface from a comparison
#[derive(Error, Debug)]
pub enum CompareError {
    /// The candidate screenshot is not in the store
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Reading or writing the image store failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The semantic judge failed
    #[error(transparent)]
    Vlm(#[from] VlmError),

    /// The shared canvas of the two images is too large to diff
    #[error("canvas {width}x{height} exceeds the {limit} pixel limit")]
    CanvasTooLarge { width: u32, height: u32, limit: u64 },

    /// A batched comparison task panicked or was cancelled
    #[error("comparison task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CompareError {
    fn from(err: tokio::task::JoinError) -> Self {
        CompareError::Task(err.to_string())
    }
}

/// Result type for comparison operations
pub type Result<T> = std::result::Result<T, CompareError>;
