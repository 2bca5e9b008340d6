//! Byte sinks for dnstap sessions.
//!
//! Files are append-only and therefore unidirectional; TCP and unix stream
//! sockets can carry the bidirectional handshake.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::debug;

/// Unified sink type over the supported transports
pub enum IoStream {
    /// Append-only file
    File(File),
    /// TCP connection to a collector
    Tcp(TcpStream),
    /// Unix stream socket connection to a collector
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for IoStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            IoStream::File(file) => Pin::new(file).poll_read(cx, buf),
            IoStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            IoStream::File(file) => Pin::new(file).poll_write(cx, buf),
            IoStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::File(file) => Pin::new(file).poll_flush(cx),
            IoStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::File(file) => Pin::new(file).poll_shutdown(cx),
            IoStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            IoStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl IoStream {
    /// Whether the transport can carry the READY/ACCEPT exchange
    pub fn is_bidirectional(&self) -> bool {
        !matches!(self, IoStream::File(_))
    }
}

impl std::fmt::Debug for IoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoStream::File(_) => f.write_str("IoStream::File"),
            IoStream::Tcp(stream) => write!(f, "IoStream::Tcp({:?})", stream.peer_addr().ok()),
            #[cfg(unix)]
            IoStream::Unix(_) => f.write_str("IoStream::Unix"),
        }
    }
}

/// Open `path` for appending, creating it if needed
pub async fn open_file(path: impl AsRef<Path>) -> tokio::io::Result<File> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    debug!("Opened dnstap file {:?}", path);
    Ok(file)
}

/// Connect to a collector over TCP
pub async fn connect_tcp(addr: impl ToSocketAddrs) -> tokio::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    debug!("Connected to dnstap collector at {:?}", stream.peer_addr().ok());
    Ok(stream)
}

/// Connect to a collector over a unix stream socket
#[cfg(unix)]
pub async fn connect_unix(path: impl AsRef<Path>) -> tokio::io::Result<UnixStream> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).await?;
    debug!("Connected to dnstap collector at {:?}", path);
    Ok(stream)
}
