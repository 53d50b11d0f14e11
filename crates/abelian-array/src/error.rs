//! Error types for charge-conserving tensor operations.

use thiserror::Error;

use crate::charge::Charge;

/// Error type for operations on charge-conserving block tensors.
#[derive(Debug, Error)]
pub enum AbelianError {
    /// Operand legs disagree in dimension-per-sector where they must match.
    #[error("shape mismatch: expected sector dims {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Legs disagree in charge labels, directions, group, or total charge
    /// where conservation requires agreement.
    #[error("charge mismatch: {0}")]
    ChargeMismatch(String),

    /// Leg index out of range, or join/split batch indices overlapping or
    /// out of range.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// An invariant of the block store is broken. Raised only by the
    /// consistency checker, never by normal operations.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// A block-wise SVD/eig routine failed to converge on some block.
    #[error("decomposition failed on block {key:?}: {reason}")]
    DecompositionFailure { key: Vec<Charge>, reason: String },
}

/// Result type for tensor operations.
pub type Result<T> = std::result::Result<T, AbelianError>;

impl AbelianError {
    pub(crate) fn axis_out_of_range(axis: usize, rank: usize) -> Self {
        AbelianError::InvalidIndex(format!("axis {axis} out of range for rank {rank}"))
    }
}
