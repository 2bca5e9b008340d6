//! Session writer: one Frame Streams session over one sink.

use crate::error::SessionError;
use crate::handshake::{Handshake, Mode};
use crate::transport::{self, IoStream};
use bytes::{Bytes, BytesMut};
use dnstap_message::{DnstapMessage, CONTENT_TYPE};
use dnstap_wire::{encode_data_frame, WireError, DATA_HEADER_SIZE, DEFAULT_MAX_DATA_FRAME_SIZE};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::ToSocketAddrs;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing written yet
    Created,
    /// START written; data frames accepted
    Started,
    /// STOP written
    Stopped,
    /// Sink released
    Closed,
    /// An I/O or protocol error ended the session
    Failed,
}

/// Session construction options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Handshake mode
    pub mode: Mode,
    /// Shut down and drop the sink on close
    pub owns_stream: bool,
    /// Wait for FINISH after STOP (bidirectional only)
    pub await_finish: bool,
    /// Carry the content type on a unidirectional START
    pub announce_content_type: bool,
    /// Negotiated content type
    pub content_type: Bytes,
    /// Largest accepted data frame payload
    pub max_frame_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Unidirectional,
            owns_stream: true,
            await_finish: false,
            announce_content_type: false,
            content_type: Bytes::from_static(CONTENT_TYPE.as_bytes()),
            max_frame_size: DEFAULT_MAX_DATA_FRAME_SIZE,
        }
    }
}

impl SessionOptions {
    /// Options for a sink that cannot talk back
    pub fn unidirectional() -> Self {
        Self::default()
    }

    /// Options for a sink that runs the READY/ACCEPT exchange
    pub fn bidirectional() -> Self {
        Self {
            mode: Mode::Bidirectional,
            ..Self::default()
        }
    }

    /// Set sink ownership
    pub fn owns_stream(mut self, owns: bool) -> Self {
        self.owns_stream = owns;
        self
    }

    /// Wait for FINISH after STOP
    pub fn await_finish(mut self, await_finish: bool) -> Self {
        self.await_finish = await_finish;
        self
    }

    /// Carry the content type on a unidirectional START
    pub fn announce_content_type(mut self, announce: bool) -> Self {
        self.announce_content_type = announce;
        self
    }
}

struct WriterInner<S> {
    stream: Option<S>,
    handshake: Handshake,
    state: SessionState,
}

/// Writes dnstap events to a sink as one Frame Streams session.
///
/// All methods take `&self`; an internal async lock keeps each frame's
/// bytes contiguous when several tasks write through the same writer.
/// The first write starts the session if [`start`](Self::start) was not
/// called explicitly.
pub struct SessionWriter<S = IoStream> {
    inner: Mutex<WriterInner<S>>,
    options: SessionOptions,
    cancel: CancellationToken,
    frames_written: AtomicU64,
}

impl SessionWriter<IoStream> {
    /// Wrap a transport, checking that it can carry the requested mode
    pub fn from_io_stream(
        stream: IoStream,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        if options.mode == Mode::Bidirectional && !stream.is_bidirectional() {
            return Err(SessionError::State("sink cannot carry a bidirectional handshake"));
        }
        Ok(Self::new(stream, options))
    }

    /// Append a session to the file at `path`, creating it if needed
    pub async fn create_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let file = transport::open_file(path).await?;
        Self::from_io_stream(IoStream::File(file), SessionOptions::unidirectional())
    }

    /// Connect to a collector over TCP
    pub async fn connect_tcp(
        addr: impl ToSocketAddrs,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let stream = transport::connect_tcp(addr).await?;
        Self::from_io_stream(IoStream::Tcp(stream), options)
    }

    /// Connect to a collector over a unix stream socket
    #[cfg(unix)]
    pub async fn connect_unix(
        path: impl AsRef<Path>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let stream = transport::connect_unix(path).await?;
        Self::from_io_stream(IoStream::Unix(stream), options)
    }
}

impl<S> SessionWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected sink
    pub fn new(stream: S, options: SessionOptions) -> Self {
        let handshake = Handshake::new(options.content_type.clone())
            .announce_content_type(options.announce_content_type);
        Self {
            inner: Mutex::new(WriterInner {
                stream: Some(stream),
                handshake,
                state: SessionState::Created,
            }),
            options,
            cancel: CancellationToken::new(),
            frames_written: AtomicU64::new(0),
        }
    }

    /// Options the session was built with
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Token that aborts any suspended I/O; cancelling fails the session
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Data frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Run the handshake and write START. Idempotent once started.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner).await
    }

    /// Serialize `message` and write it as one data frame
    pub async fn write_message(&self, message: &DnstapMessage) -> Result<(), SessionError> {
        let payload = message.encode();
        self.write_payload(&payload).await
    }

    /// Write an already serialized payload as one data frame
    pub async fn write_payload(&self, payload: &[u8]) -> Result<(), SessionError> {
        if payload.len() > self.options.max_frame_size {
            return Err(WireError::Size(payload.len()).into());
        }
        let mut frame = BytesMut::with_capacity(DATA_HEADER_SIZE + payload.len());
        encode_data_frame(payload, &mut frame)?;

        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner).await?;

        let stream = inner
            .stream
            .as_mut()
            .ok_or(SessionError::State("sink released"))?;
        let result = cancellable(&self.cancel, async {
            stream.write_all(&frame).await?;
            Ok::<(), SessionError>(())
        })
        .await;

        match result {
            Ok(()) => {
                self.frames_written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Write STOP. A no-op once stopped or closed.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    /// Stop if needed, then release the sink.
    ///
    /// Never fails: errors from the implicit STOP are logged and dropped.
    /// An owned sink is shut down; a borrowed one is flushed and kept for
    /// [`into_inner`](Self::into_inner).
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return;
        }

        if inner.state == SessionState::Started {
            if let Err(e) = self.stop_locked(&mut inner).await {
                debug!("Implicit STOP failed: {}", e);
            }
        }

        if let Some(mut stream) = inner.stream.take() {
            let owns_stream = self.options.owns_stream;
            let result = cancellable(&self.cancel, async {
                if owns_stream {
                    stream.shutdown().await?;
                } else {
                    stream.flush().await?;
                }
                Ok::<(), SessionError>(())
            })
            .await;
            if let Err(e) = result {
                debug!("Error releasing dnstap sink: {}", e);
            }
            if !owns_stream {
                inner.stream = Some(stream);
            }
        }

        inner.state = SessionState::Closed;
        info!(
            "dnstap session closed after {} data frames",
            self.frames_written()
        );
    }

    /// Take back a sink the session did not own
    pub fn into_inner(self) -> Option<S> {
        self.inner.into_inner().stream
    }

    async fn start_locked(&self, inner: &mut WriterInner<S>) -> Result<(), SessionError> {
        match inner.state {
            SessionState::Started => return Ok(()),
            SessionState::Created => {}
            SessionState::Stopped => return Err(SessionError::State("session already stopped")),
            SessionState::Closed => return Err(SessionError::State("session closed")),
            SessionState::Failed => return Err(SessionError::State("session failed")),
        }

        let WriterInner {
            stream, handshake, ..
        } = &mut *inner;
        let stream = stream
            .as_mut()
            .ok_or(SessionError::State("sink released"))?;

        let result = cancellable(&self.cancel, handshake.open(stream, self.options.mode)).await;
        match result {
            Ok(()) => {
                inner.state = SessionState::Started;
                info!("dnstap session started ({:?})", self.options.mode);
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                warn!("dnstap handshake failed: {}", e);
                Err(e)
            }
        }
    }

    async fn stop_locked(&self, inner: &mut WriterInner<S>) -> Result<(), SessionError> {
        match inner.state {
            SessionState::Started => {}
            SessionState::Stopped | SessionState::Closed => return Ok(()),
            SessionState::Created => return Err(SessionError::State("STOP before START")),
            SessionState::Failed => return Err(SessionError::State("session failed")),
        }

        let await_finish =
            self.options.await_finish && self.options.mode == Mode::Bidirectional;
        let WriterInner {
            stream, handshake, ..
        } = &mut *inner;
        let stream = stream
            .as_mut()
            .ok_or(SessionError::State("sink released"))?;

        let result = cancellable(&self.cancel, handshake.close(stream, await_finish)).await;
        match result {
            Ok(()) => {
                inner.state = SessionState::Stopped;
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

impl<S> std::fmt::Debug for SessionWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWriter")
            .field("options", &self.options)
            .field("frames_written", &self.frames_written.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Run `fut` unless `token` fires first
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SessionError::Cancelled),
        result = fut => result,
    }
}
