//! Frame Streams sessions for dnstap.
//!
//! This crate writes dnstap events to a file, TCP or unix socket sink as a
//! single Frame Streams session, and offers a non-blocking front end for
//! callers that must never wait on the sink.
//!
//! ## Features
//!
//! - **Transports**: append-only files, TCP and unix stream sockets
//! - **Handshake**: bare START for unidirectional sinks, READY/ACCEPT/START
//!   for bidirectional ones, STOP with optional FINISH on close
//! - **Session Writer**: lifecycle state machine with serialized writes
//! - **Dispatcher**: ordered background delivery with drain on shutdown
//! - **Tracing Layer**: export log events as TOOL_QUERY records
//!
//! ## Example
//!
//! ```rust,no_run
//! use dnstap_message::DnstapMessage;
//! use dnstap_session::{Dispatcher, SessionOptions, SessionWriter};
//!
//! # async fn example() -> Result<(), dnstap_session::SessionError> {
//! let options = SessionOptions::bidirectional();
//! let writer = SessionWriter::connect_tcp("127.0.0.1:6000", options).await?;
//! let dispatcher = Dispatcher::new(writer)?;
//!
//! dispatcher.enqueue(DnstapMessage::tool_query("resolver started"));
//!
//! // Writes everything queued, then STOP
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod layer;
pub mod transport;
pub mod writer;

// Re-export main types
pub use dispatcher::{DispatchStats, Dispatcher, DEFAULT_DRAIN_TIMEOUT};
pub use error::SessionError;
pub use handshake::{Handshake, HandshakeState, Mode};
pub use layer::DnstapLayer;
pub use transport::IoStream;
pub use writer::{SessionOptions, SessionState, SessionWriter};
