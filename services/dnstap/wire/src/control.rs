//! Control frames.
//!
//! A control frame is introduced by a zero-length escape and carries a
//! control type followed by zero or more `(field id, length, bytes)` fields:
//!
//! ```text
//! +----------------+----------------+----------------+-----------------------+
//! | u32 escape = 0 | u32 frame_len  | u32 type       | fields (frame_len - 4)|
//! +----------------+----------------+----------------+-----------------------+
//! ```

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the escape plus the frame length word
pub const CONTROL_HEADER_SIZE: usize = 8;

/// Largest accepted control frame length field
pub const MAX_CONTROL_FRAME_SIZE: usize = 512;

/// Field id of a CONTENT_TYPE field
pub const FIELD_CONTENT_TYPE: u32 = 0x01;

/// Control frame types
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlType {
    /// Sent by the writer in reply to READY, carries the chosen content type
    Accept = 0x01,
    /// Opens the data stream
    Start = 0x02,
    /// Closes the data stream
    Stop = 0x03,
    /// Sent by the receiver, lists the content types it accepts
    Ready = 0x04,
    /// Receiver's acknowledgement of STOP
    Finish = 0x05,
}

impl TryFrom<u32> for ControlType {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ControlType::Accept),
            0x02 => Ok(ControlType::Start),
            0x03 => Ok(ControlType::Stop),
            0x04 => Ok(ControlType::Ready),
            0x05 => Ok(ControlType::Finish),
            _ => Err(WireError::UnknownControlType(value)),
        }
    }
}

impl std::fmt::Display for ControlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlType::Accept => "ACCEPT",
            ControlType::Start => "START",
            ControlType::Stop => "STOP",
            ControlType::Ready => "READY",
            ControlType::Finish => "FINISH",
        };
        f.write_str(name)
    }
}

/// One `(id, value)` field of a control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlField {
    /// Field id
    pub id: u32,
    /// Field value
    pub value: Bytes,
}

/// Decoded control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Control type
    pub kind: ControlType,
    /// Fields in wire order
    pub fields: Vec<ControlField>,
}

impl ControlFrame {
    /// Create a control frame without fields
    pub fn new(kind: ControlType) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Append a CONTENT_TYPE field
    pub fn with_content_type(mut self, content_type: impl Into<Bytes>) -> Self {
        self.fields.push(ControlField {
            id: FIELD_CONTENT_TYPE,
            value: content_type.into(),
        });
        self
    }

    /// Iterate over the CONTENT_TYPE values, in wire order
    pub fn content_types(&self) -> impl Iterator<Item = &Bytes> {
        self.fields
            .iter()
            .filter(|f| f.id == FIELD_CONTENT_TYPE)
            .map(|f| &f.value)
    }

    /// Whether one of the CONTENT_TYPE fields equals `content_type`
    pub fn offers(&self, content_type: &[u8]) -> bool {
        self.content_types().any(|ct| ct.as_ref() == content_type)
    }

    /// Value of the frame length field: type word plus all fields
    pub fn frame_len(&self) -> usize {
        4 + self
            .fields
            .iter()
            .map(|f| 8 + f.value.len())
            .sum::<usize>()
    }

    /// Total encoded size including escape and length words
    pub fn encoded_size(&self) -> usize {
        CONTROL_HEADER_SIZE + self.frame_len()
    }

    /// Encode escape, length, type and fields into `buf`
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let frame_len = self.frame_len();
        if frame_len > MAX_CONTROL_FRAME_SIZE {
            return Err(WireError::Size(frame_len));
        }

        buf.reserve(CONTROL_HEADER_SIZE + frame_len);
        buf.put_u32(0);
        buf.put_u32(frame_len as u32);
        buf.put_u32(self.kind as u32);
        for field in &self.fields {
            buf.put_u32(field.id);
            buf.put_u32(field.value.len() as u32);
            buf.put_slice(&field.value);
        }
        Ok(())
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode the body of a control frame (everything after the length word).
    ///
    /// `body` must hold exactly the `frame_len` bytes announced on the wire;
    /// fields have to consume it completely.
    pub fn decode_body(mut body: Bytes) -> Result<Self, WireError> {
        if body.len() < 4 {
            return Err(WireError::Malformed);
        }
        let kind = ControlType::try_from(body.get_u32())?;

        let mut fields = Vec::new();
        while body.has_remaining() {
            if body.remaining() < 8 {
                return Err(WireError::Malformed);
            }
            let id = body.get_u32();
            let len = body.get_u32() as usize;
            if body.remaining() < len {
                return Err(WireError::Malformed);
            }
            fields.push(ControlField {
                id,
                value: body.split_to(len),
            });
        }

        Ok(Self { kind, fields })
    }
}
