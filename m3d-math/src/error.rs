//! Error type for transform math and value conversion

use thiserror::Error;

/// Errors reported by math primitives
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MathError {
    /// Determinant is zero under the relative-epsilon test
    #[error("matrix is not invertible")]
    NotInvertible,

    /// A size dimension was negative (only the empty sentinel may carry one)
    #[error("size dimensions must be non-negative, got ({0}, {1}, {2})")]
    NegativeSize(f64, f64, f64),

    /// Textual value could not be parsed
    #[error("cannot parse {kind} from {input:?}: {reason}")]
    Parse {
        kind: &'static str,
        input: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, MathError>;
