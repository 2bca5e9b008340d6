//! Fire-and-forget event dispatch.
//!
//! [`Dispatcher::enqueue`] never blocks and never fails: events go into an
//! unbounded queue drained by a single background task, which keeps them
//! in submission order. Write failures are counted and logged once.
//!
//! Shutdown is bounded: if the queue has not drained within the drain
//! timeout (a receiver that never sends READY, a stalled socket), the
//! session's I/O is cancelled and the remaining events fail fast.

use crate::error::SessionError;
use crate::transport::IoStream;
use crate::writer::SessionWriter;
use dnstap_message::DnstapMessage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events accepted into the queue
    pub enqueued: u64,
    /// Events written to the session
    pub written: u64,
    /// Events whose write failed
    pub failed: u64,
    /// Events rejected after shutdown began
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// How long [`Dispatcher::shutdown`] waits for the queue to drain before
/// cancelling session I/O
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum Worker {
    Idle(mpsc::UnboundedReceiver<DnstapMessage>),
    /// Flips to `true` once the worker has drained and closed the writer
    Running(watch::Receiver<bool>),
    Finished,
}

/// Queues events and writes them through a shared [`SessionWriter`].
///
/// The background task is spawned on the first enqueue. Dropping the
/// dispatcher asks the task to drain the queue and close the session; call
/// [`shutdown`](Self::shutdown) to wait for that to finish.
pub struct Dispatcher<S = IoStream> {
    writer: Arc<SessionWriter<S>>,
    tx: mpsc::UnboundedSender<DnstapMessage>,
    worker: Mutex<Worker>,
    spawned: AtomicBool,
    shutdown: CancellationToken,
    runtime: Handle,
    counters: Arc<Counters>,
    drain_timeout: Duration,
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a dispatcher on the current tokio runtime
    pub fn new(writer: SessionWriter<S>) -> Result<Self, SessionError> {
        let runtime = Handle::try_current()
            .map_err(|_| SessionError::State("dispatcher requires a tokio runtime"))?;
        Ok(Self::with_handle(writer, runtime))
    }

    /// Create a dispatcher whose worker runs on `runtime`
    pub fn with_handle(writer: SessionWriter<S>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            writer: Arc::new(writer),
            tx,
            worker: Mutex::new(Worker::Idle(rx)),
            spawned: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            runtime,
            counters: Arc::new(Counters::default()),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Bound the graceful drain in [`shutdown`](Self::shutdown)
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Session the events are written to
    pub fn writer(&self) -> &Arc<SessionWriter<S>> {
        &self.writer
    }

    /// Current counters
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Queue `message` for writing. Returns immediately.
    ///
    /// Events submitted after shutdown began are dropped and counted.
    pub fn enqueue(&self, message: DnstapMessage) {
        if self.shutdown.is_cancelled() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dispatcher shut down, dropping event");
            return;
        }

        if !self.spawned.load(Ordering::Acquire) {
            self.spawn_worker();
        }

        match self.tx.send(message) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Stop accepting events, write everything already queued, then close
    /// the session. Never fails.
    ///
    /// Every caller waits for the worker to finish. If it has not finished
    /// within the drain timeout, in-flight I/O is cancelled so the call
    /// always returns.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let done = {
            let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match &*slot {
                Worker::Running(done) => Some(done.clone()),
                Worker::Idle(_) => {
                    *slot = Worker::Finished;
                    None
                }
                Worker::Finished => None,
            }
        };

        if let Some(mut done) = done {
            let drained = tokio::time::timeout(self.drain_timeout, done.wait_for(|d| *d))
                .await
                .is_ok();
            if !drained {
                warn!(
                    "dnstap dispatcher did not drain within {:?}, cancelling session I/O",
                    self.drain_timeout
                );
                self.writer.cancel_token().cancel();
                // Errors only if the worker is gone without signalling
                let _ = done.wait_for(|d| *d).await;
            }
        }

        self.writer.close().await;

        let stats = self.stats();
        info!(
            "dnstap dispatcher stopped: {} written, {} failed, {} dropped",
            stats.written, stats.failed, stats.dropped
        );
    }

    /// Cancel in-flight I/O, then shut down. Queued events fail fast.
    pub async fn abort(&self) {
        self.writer.cancel_token().cancel();
        self.shutdown().await;
    }

    fn spawn_worker(&self) {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*slot, Worker::Idle(_)) {
            return;
        }
        if let Worker::Idle(rx) = std::mem::replace(&mut *slot, Worker::Finished) {
            let (done_tx, done_rx) = watch::channel(false);
            self.runtime.spawn(run_worker(
                self.writer.clone(),
                rx,
                self.shutdown.clone(),
                self.counters.clone(),
                done_tx,
            ));
            *slot = Worker::Running(done_rx);
        }
        self.spawned.store(true, Ordering::Release);
    }
}

impl<S> Drop for Dispatcher<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.counters.snapshot())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn run_worker<S>(
    writer: Arc<SessionWriter<S>>,
    mut rx: mpsc::UnboundedReceiver<DnstapMessage>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    done: watch::Sender<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Waits for the receiver's READY; a stalled handshake is cancelled by
    // shutdown() once the drain timeout expires
    if let Err(e) = writer.start().await {
        warn!("dnstap session failed to start: {}", e);
    }

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(message) => deliver(&writer, &message, &counters).await,
                None => break,
            },
        }
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(message) = rx.recv().await {
        deliver(&writer, &message, &counters).await;
        drained += 1;
    }
    debug!("Dispatcher drained {} queued events", drained);

    writer.close().await;
    let _ = done.send(true);
}

async fn deliver<S>(writer: &SessionWriter<S>, message: &DnstapMessage, counters: &Counters)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match writer.write_message(message).await {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            if counters.failed.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!("dnstap write failed, further events will be dropped: {}", e);
            } else {
                debug!("Dropped dnstap event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SessionOptions;
    use dnstap_message::MessageType;
    use dnstap_wire::{ControlType, Frame, FrameDecoder};
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn event(text: &str) -> DnstapMessage {
        DnstapMessage::builder(MessageType::ToolQuery)
            .query_text(text)
            .build()
            .unwrap()
    }

    fn dispatcher() -> (Dispatcher<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(1024 * 1024);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        (Dispatcher::new(writer).unwrap(), server)
    }

    async fn read_frames(mut server: DuplexStream) -> Vec<Frame> {
        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        FrameDecoder::new().decode_all(&bytes).unwrap()
    }

    fn texts(frames: &[Frame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(Frame::as_data)
            .map(|payload| {
                let message = DnstapMessage::decode(payload).unwrap();
                let wire = message.message().unwrap().query_message.clone().unwrap();
                String::from_utf8(wire).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_new_requires_runtime() {
        let (client, _server) = tokio::io::duplex(64);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        assert!(matches!(
            Dispatcher::new(writer),
            Err(SessionError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queue_in_order() {
        let (dispatcher, server) = dispatcher();
        for i in 0..100 {
            dispatcher.enqueue(event(&format!("event {}", i)));
        }
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.enqueued, 100);
        assert_eq!(stats.written, 100);
        assert_eq!(stats.failed, 0);

        let frames = read_frames(server).await;
        let first = frames.first().and_then(Frame::as_control).map(|c| c.kind);
        let last = frames.last().and_then(Frame::as_control).map(|c| c.kind);
        assert_eq!(first, Some(ControlType::Start));
        assert_eq!(last, Some(ControlType::Stop));
        let expected: Vec<String> = (0..100).map(|i| format!("event {}", i)).collect();
        assert_eq!(texts(&frames), expected);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let (dispatcher, server) = dispatcher();
        dispatcher.enqueue(event("kept"));
        dispatcher.shutdown().await;
        dispatcher.enqueue(event("late"));
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(texts(&read_frames(server).await), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_without_events() {
        let (dispatcher, server) = dispatcher();
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.stats(), DispatchStats::default());
        assert!(read_frames(server).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_writes_are_counted() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        let dispatcher = Dispatcher::new(writer).unwrap();

        for i in 0..5 {
            dispatcher.enqueue(event(&format!("event {}", i)));
        }
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.enqueued, 5);
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 5);
    }

    #[tokio::test]
    async fn test_abort_does_not_wait_for_receiver() {
        let (client, _server) = tokio::io::duplex(1024);
        let writer = SessionWriter::new(client, SessionOptions::bidirectional());
        let dispatcher = Dispatcher::new(writer).unwrap();

        dispatcher.enqueue(event("never written"));
        dispatcher.abort().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_with_silent_receiver_is_bounded() {
        // Receiver stays connected but never sends READY
        let (client, _server) = tokio::io::duplex(1024);
        let writer = SessionWriter::new(client, SessionOptions::bidirectional());
        let dispatcher = Dispatcher::new(writer)
            .unwrap()
            .with_drain_timeout(Duration::from_millis(100));

        dispatcher.enqueue(event("stuck behind handshake"));
        let finished = tokio::time::timeout(Duration::from_secs(2), dispatcher.shutdown()).await;

        assert!(finished.is_ok());
        let stats = dispatcher.stats();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_stalled_write() {
        // Nobody reads, so the second frame cannot fit in the pipe
        let (client, _server) = tokio::io::duplex(64);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        let dispatcher = Dispatcher::new(writer)
            .unwrap()
            .with_drain_timeout(Duration::from_millis(100));

        for _ in 0..3 {
            dispatcher.enqueue(event(&"x".repeat(40)));
        }
        let finished = tokio::time::timeout(Duration::from_secs(2), dispatcher.shutdown()).await;

        assert!(finished.is_ok());
        let stats = dispatcher.stats();
        assert_eq!(stats.written + stats.failed, 3);
        assert!(stats.failed >= 1);
    }

    #[tokio::test]
    async fn test_concurrent_shutdowns_wait_for_drain() {
        let (client, mut server) = tokio::io::duplex(256);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        let dispatcher = Dispatcher::new(writer).unwrap();

        let reader = tokio::spawn(async move {
            let mut bytes = Vec::new();
            let mut chunk = [0u8; 32];
            loop {
                let n = server.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                bytes.extend_from_slice(&chunk[..n]);
                tokio::task::yield_now().await;
            }
            FrameDecoder::new().decode_all(&bytes).unwrap()
        });

        for i in 0..200 {
            dispatcher.enqueue(event(&format!("event {}", i)));
        }
        tokio::join!(dispatcher.shutdown(), dispatcher.shutdown());

        let stats = dispatcher.stats();
        assert_eq!(stats.enqueued, 200);
        assert_eq!(stats.written, 200);
        assert_eq!(stats.failed, 0);

        let frames = reader.await.unwrap();
        let expected: Vec<String> = (0..200).map(|i| format!("event {}", i)).collect();
        assert_eq!(texts(&frames), expected);
    }

    #[tokio::test]
    async fn test_drop_drains_in_background() {
        let (dispatcher, server) = dispatcher();
        for i in 0..10 {
            dispatcher.enqueue(event(&format!("event {}", i)));
        }
        drop(dispatcher);

        let frames = read_frames(server).await;
        assert_eq!(texts(&frames).len(), 10);
    }
}
