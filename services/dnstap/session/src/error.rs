//! Session error types.

use dnstap_message::EncodingError;
use dnstap_wire::WireError;
use thiserror::Error;

/// Errors surfaced by a [`SessionWriter`](crate::SessionWriter).
///
/// Protocol and transport errors are fatal: the session refuses further
/// writes once one has occurred.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Peer sent an unexpected control frame or no acceptable content type
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed frame on the wire, or a frame that cannot be encoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Sink I/O failed
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Operation not valid in the current session state
    #[error("invalid session state: {0}")]
    State(&'static str),

    /// Event could not be built
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Session was cancelled while suspended on I/O
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether the peer violated the framing protocol
    pub fn is_protocol(&self) -> bool {
        matches!(self, SessionError::Protocol(_) | SessionError::Wire(_))
    }
}
