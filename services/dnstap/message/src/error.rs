//! Event construction errors.

use thiserror::Error;

/// Errors raised while building an event, before anything reaches the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A label exceeds 63 octets
    #[error("label too long ({len} bytes): {label}")]
    LabelTooLong {
        /// Offending label
        label: String,
        /// Its length in bytes
        len: usize,
    },

    /// Empty label in the middle of a name, e.g. `a..b`
    #[error("empty label in {0:?}")]
    EmptyLabel(String),

    /// Label contains a non-ASCII character
    #[error("non-ASCII label: {0}")]
    NonAscii(String),

    /// Encoded name exceeds 255 octets
    #[error("domain name too long ({0} bytes)")]
    NameTooLong(usize),

    /// HTTP version set on an event whose protocol is not DoH
    #[error("http protocol requires socket protocol DOH")]
    HttpProtocolWithoutDoh,
}
