//! Shared error type for the boosting core.
//!
//! Numeric overflow is deliberately *not* an error: a non-finite gain or
//! update value is reported through the [`ILLEGAL_GAIN`] sentinel so the
//! caller can distinguish "the math blew up" from "you called this wrong".
//!
//! [`ILLEGAL_GAIN`]: crate::boost::ILLEGAL_GAIN

/// Errors that can occur while generating a term update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoostError {
    /// A caller-supplied argument was out of range or inconsistent.
    #[error("illegal parameter value: {0}")]
    IllegalParamVal(&'static str),

    /// An allocation failed while growing a buffer.
    #[error("out of memory")]
    OutOfMemory,

    /// An internal invariant was violated or an unsupported path was reached.
    #[error("unexpected internal state: {0}")]
    UnexpectedInternal(&'static str),
}
