//! Frame Streams error types.

use thiserror::Error;

/// Framing errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Input ended in the middle of a frame
    #[error("truncated frame: {0} bytes left over")]
    Truncated(usize),

    /// Data frames must carry at least one byte; zero is the control escape
    #[error("empty data frame payload")]
    EmptyPayload,

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Expected the control escape but found a data frame length
    #[error("expected control escape, got length {0}")]
    Escape(u32),

    /// Unknown control frame type
    #[error("unknown control type {0:#x}")]
    UnknownControlType(u32),

    /// Control frame length does not match its contents
    #[error("malformed control frame")]
    Malformed,
}
