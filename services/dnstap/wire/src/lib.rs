//! Frame Streams framing for dnstap.
//!
//! This crate implements the byte-level framing used to carry dnstap
//! events: length-prefixed data frames, escaped control frames and a
//! streaming decoder for reading a captured stream back.
//!
//! ## Wire Format
//!
//! ```text
//! data frame:     | u32 len (> 0) | len bytes payload |
//! control frame:  | u32 0 | u32 frame_len | u32 type | fields ... |
//! control field:  | u32 id | u32 len | len bytes |
//! ```
//!
//! All integers are big-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod control;
pub mod error;
pub mod frame;

// Re-export main types
pub use control::{
    ControlField, ControlFrame, ControlType, CONTROL_HEADER_SIZE, FIELD_CONTENT_TYPE,
    MAX_CONTROL_FRAME_SIZE,
};
pub use error::WireError;
pub use frame::{
    encode_data_frame, Frame, FrameDecoder, DATA_HEADER_SIZE, DEFAULT_MAX_DATA_FRAME_SIZE,
};
