//! Data frames and the streaming frame decoder.
//!
//! A data frame is a big-endian `u32` length followed by that many payload
//! bytes. A length of zero never starts a data frame: it is the escape that
//! introduces a control frame.

use crate::control::{ControlFrame, CONTROL_HEADER_SIZE, MAX_CONTROL_FRAME_SIZE};
use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Default maximum data frame payload (1 MiB)
pub const DEFAULT_MAX_DATA_FRAME_SIZE: usize = 1024 * 1024;

/// Size of the length prefix of a data frame
pub const DATA_HEADER_SIZE: usize = 4;

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opaque payload
    Data(Bytes),
    /// Session control
    Control(ControlFrame),
}

impl Frame {
    /// Control frame, if this is one
    pub fn as_control(&self) -> Option<&ControlFrame> {
        match self {
            Frame::Control(control) => Some(control),
            Frame::Data(_) => None,
        }
    }

    /// Data payload, if this is a data frame
    pub fn as_data(&self) -> Option<&Bytes> {
        match self {
            Frame::Data(payload) => Some(payload),
            Frame::Control(_) => None,
        }
    }
}

/// Encode a data frame into `buf`.
///
/// An empty payload would be read back as a control escape and is rejected.
pub fn encode_data_frame(payload: &[u8], buf: &mut BytesMut) -> Result<(), WireError> {
    if payload.is_empty() {
        return Err(WireError::EmptyPayload);
    }
    if payload.len() > u32::MAX as usize {
        return Err(WireError::Size(payload.len()));
    }

    buf.reserve(DATA_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(())
}

/// Streaming decoder for a Frame Streams byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    max_data_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default data frame limit
    pub fn new() -> Self {
        Self {
            max_data_frame_size: DEFAULT_MAX_DATA_FRAME_SIZE,
        }
    }

    /// Override the data frame limit
    pub fn with_max_data_frame_size(mut self, max: usize) -> Self {
        self.max_data_frame_size = max;
        self
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when more bytes are
    /// needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        if buf.len() < DATA_HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if len > 0 {
            if len > self.max_data_frame_size {
                return Err(WireError::Size(len));
            }
            if buf.len() < DATA_HEADER_SIZE + len {
                return Ok(None);
            }
            buf.advance(DATA_HEADER_SIZE);
            let payload = buf.split_to(len).freeze();
            trace!(len, "decoded data frame");
            return Ok(Some(Frame::Data(payload)));
        }

        // Escape: the next word is the control frame length
        if buf.len() < CONTROL_HEADER_SIZE {
            return Ok(None);
        }
        let frame_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if frame_len < 4 {
            return Err(WireError::Malformed);
        }
        if frame_len > MAX_CONTROL_FRAME_SIZE {
            return Err(WireError::Size(frame_len));
        }
        if buf.len() < CONTROL_HEADER_SIZE + frame_len {
            return Ok(None);
        }

        buf.advance(CONTROL_HEADER_SIZE);
        let body = buf.split_to(frame_len).freeze();
        let control = ControlFrame::decode_body(body)?;
        trace!(kind = %control.kind, "decoded control frame");
        Ok(Some(Frame::Control(control)))
    }

    /// Decode one frame at end of input: leftover bytes that do not form a
    /// complete frame are a truncation error.
    pub fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(WireError::Truncated(buf.len())),
        }
    }

    /// Decode every frame of a complete byte stream
    pub fn decode_all(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, WireError> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.decode_eof(&mut buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
