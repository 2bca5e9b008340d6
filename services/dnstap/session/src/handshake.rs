//! Frame Streams handshake.
//!
//! Unidirectional sinks (files, or sockets used without a reverse channel)
//! only receive a START frame. Bidirectional sinks first offer their content
//! types with READY; the sender answers with ACCEPT and then START.

use crate::error::SessionError;
use bytes::{Bytes, BytesMut};
use dnstap_wire::{
    ControlFrame, ControlType, WireError, CONTROL_HEADER_SIZE, MAX_CONTROL_FRAME_SIZE,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Whether the sink can talk back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Sender writes START, data and STOP; nothing is read
    #[default]
    Unidirectional,
    /// READY/ACCEPT exchange before START
    Bidirectional,
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing exchanged yet
    Idle,
    /// Waiting for the receiver's READY
    AwaitingReady,
    /// ACCEPT sent
    Accepted,
    /// START sent; data frames may follow
    Started,
    /// STOP sent
    Stopped,
}

/// Control-frame exchange for one session
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    content_type: Bytes,
    announce_content_type: bool,
}

impl Handshake {
    /// Create a handshake negotiating `content_type`
    pub fn new(content_type: impl Into<Bytes>) -> Self {
        Self {
            state: HandshakeState::Idle,
            content_type: content_type.into(),
            announce_content_type: false,
        }
    }

    /// Carry the content type on a unidirectional START
    pub fn announce_content_type(mut self, announce: bool) -> Self {
        self.announce_content_type = announce;
        self
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Negotiated content type
    pub fn content_type(&self) -> &Bytes {
        &self.content_type
    }

    /// Run the opening exchange. Exactly one START is written on success.
    ///
    /// A READY that does not offer the content type fails with
    /// [`SessionError::Protocol`] before anything is written.
    pub async fn open<S>(&mut self, stream: &mut S, mode: Mode) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.state != HandshakeState::Idle {
            return Err(SessionError::State("handshake already performed"));
        }

        let start = match mode {
            Mode::Unidirectional => {
                if self.announce_content_type {
                    ControlFrame::new(ControlType::Start)
                        .with_content_type(self.content_type.clone())
                } else {
                    ControlFrame::new(ControlType::Start)
                }
            }
            Mode::Bidirectional => {
                self.state = HandshakeState::AwaitingReady;
                let ready = recv_control(stream).await?;
                if ready.kind != ControlType::Ready {
                    return Err(SessionError::Protocol(format!(
                        "expected READY, received {}",
                        ready.kind
                    )));
                }
                if !ready.offers(&self.content_type) {
                    return Err(SessionError::Protocol(format!(
                        "receiver does not accept {}",
                        String::from_utf8_lossy(&self.content_type)
                    )));
                }
                debug!("Received READY offering {}", String::from_utf8_lossy(&self.content_type));

                let accept = ControlFrame::new(ControlType::Accept)
                    .with_content_type(self.content_type.clone());
                send_control(stream, &accept).await?;
                self.state = HandshakeState::Accepted;

                ControlFrame::new(ControlType::Start)
            }
        };

        send_control(stream, &start).await?;
        self.state = HandshakeState::Started;
        debug!("Sent START ({:?})", mode);
        Ok(())
    }

    /// Write STOP and, when requested, wait for the receiver's FINISH
    pub async fn close<S>(&mut self, stream: &mut S, await_finish: bool) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.state {
            HandshakeState::Started => {}
            HandshakeState::Stopped => return Ok(()),
            _ => return Err(SessionError::State("STOP before START")),
        }

        send_control(stream, &ControlFrame::new(ControlType::Stop)).await?;
        self.state = HandshakeState::Stopped;
        debug!("Sent STOP");

        if await_finish {
            let finish = recv_control(stream).await?;
            if finish.kind != ControlType::Finish {
                return Err(SessionError::Protocol(format!(
                    "expected FINISH, received {}",
                    finish.kind
                )));
            }
            debug!("Received FINISH");
        }
        Ok(())
    }
}

/// Encode, write and flush a control frame
pub async fn send_control<W>(writer: &mut W, frame: &ControlFrame) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.to_bytes()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!("Wrote {} control frame ({} bytes)", frame.kind, bytes.len());
    Ok(())
}

/// Read exactly one control frame.
///
/// Reads never go past the end of the frame, so data that follows stays in
/// the stream for the next caller.
pub async fn recv_control<R>(reader: &mut R) -> Result<ControlFrame, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; CONTROL_HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let escape = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if escape != 0 {
        return Err(WireError::Escape(escape).into());
    }
    let frame_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if frame_len > MAX_CONTROL_FRAME_SIZE {
        return Err(WireError::Size(frame_len).into());
    }
    if frame_len < 4 {
        return Err(WireError::Malformed.into());
    }

    let mut body = BytesMut::zeroed(frame_len);
    reader.read_exact(&mut body).await?;
    let frame = ControlFrame::decode_body(body.freeze())?;
    trace!("Read {} control frame ({} bytes)", frame.kind, frame_len);
    Ok(frame)
}
