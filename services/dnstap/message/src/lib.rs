//! dnstap event model.
//!
//! This crate defines the semantic DNS event record handed to the logger,
//! its protobuf envelope (the `protobuf:dnstap.Dnstap` content type), and
//! the DNS wire-format helpers needed to fill it from text input.
//!
//! ## Example
//!
//! ```rust
//! use dnstap_message::{DnstapMessage, MessageType, Timestamp};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! # fn example() -> Result<(), dnstap_message::EncodingError> {
//! let event = DnstapMessage::builder(MessageType::ToolQuery)
//!     .query_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 100)))
//!     .query_port(54321)
//!     .query_time(Timestamp::now())
//!     .query_for("example.com")?
//!     .query_zone("example.com")?
//!     .build()?;
//!
//! let payload = event.encode();
//! assert!(!payload.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod message;
pub mod name;
pub mod time;

/// Frame Streams content type negotiated for dnstap payloads
pub const CONTENT_TYPE: &str = "protobuf:dnstap.Dnstap";

// Re-export main types
pub use envelope::{
    Dnstap, DnstapType, HttpProtocol, Message, MessageType, Policy, PolicyAction, PolicyMatch,
    SocketFamily, SocketProtocol,
};
pub use error::EncodingError;
pub use message::{DnstapMessage, DnstapMessageBuilder};
pub use name::{build_query, build_query_with, decode_name, encode_name, put_name};
pub use time::Timestamp;
