use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("{op}: expected {expected} elements, got {got}")]
    LengthMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{op}: {len} elements is not a multiple of {chunk}")]
    NotMultiple {
        op: &'static str,
        len: usize,
        chunk: usize,
    },
    #[error("{dtype} data truncated: need {needed} bytes, have {available}")]
    Truncated {
        dtype: String,
        needed: usize,
        available: usize,
    },
    #[error("{dtype} tensor of {numel} elements is too large to address")]
    TooLarge { dtype: String, numel: usize },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ComputeError>;

/// Check that a slice has exactly `expected` elements.
pub(crate) fn expect_len(op: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(ComputeError::LengthMismatch { op, expected, got });
    }
    Ok(())
}
