//! Forward `tracing` events into a dnstap session.
//!
//! Each event becomes a TOOL_QUERY record whose query message holds the
//! formatted log line. Events emitted by the dnstap crates themselves are
//! skipped so the session cannot feed on its own diagnostics.

use crate::dispatcher::Dispatcher;
use crate::transport::IoStream;
use dnstap_message::{DnstapMessage, MessageType, Timestamp};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

const SKIPPED_TARGETS: &[&str] = &["dnstap_session", "dnstap_wire", "dnstap_message"];

/// `tracing_subscriber` layer exporting log events as dnstap records
pub struct DnstapLayer<S = IoStream> {
    dispatcher: Arc<Dispatcher<S>>,
    identity: Option<Vec<u8>>,
    version: Option<Vec<u8>>,
    max_level: Level,
}

impl<S> DnstapLayer<S> {
    /// Export events at INFO and above through `dispatcher`
    pub fn new(dispatcher: Arc<Dispatcher<S>>) -> Self {
        Self {
            dispatcher,
            identity: None,
            version: None,
            max_level: Level::INFO,
        }
    }

    /// Identity stamped on every record
    pub fn with_identity(mut self, identity: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Version stamped on every record
    pub fn with_version(mut self, version: impl Into<Vec<u8>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Most verbose level exported
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    fn record(&self, event: &Event<'_>) -> DnstapMessage {
        let meta = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{} {}: {}{}",
            meta.level(),
            meta.target(),
            visitor.message,
            visitor.fields
        );
        let mut builder = DnstapMessage::builder(MessageType::ToolQuery)
            .query_text(&line)
            .query_time(Timestamp::now());
        if let Some(identity) = &self.identity {
            builder = builder.identity(identity.clone());
        }
        if let Some(version) = &self.version {
            builder = builder.version(version.clone());
        }
        match builder.build() {
            Ok(message) => message,
            Err(_) => DnstapMessage::tool_query(&line),
        }
    }
}

impl<S, Sub> Layer<Sub> for DnstapLayer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    Sub: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, Sub>) {
        let meta = event.metadata();
        if *meta.level() > self.max_level {
            return;
        }
        if SKIPPED_TARGETS.iter().any(|t| meta.target().starts_with(t)) {
            return;
        }
        self.dispatcher.enqueue(self.record(event));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{SessionOptions, SessionWriter};
    use dnstap_wire::{Frame, FrameDecoder};
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tracing_subscriber::layer::SubscriberExt;

    async fn exported(server: DuplexStream) -> Vec<DnstapMessage> {
        let mut server = server;
        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();
        FrameDecoder::new()
            .decode_all(&bytes)
            .unwrap()
            .iter()
            .filter_map(Frame::as_data)
            .map(|payload| DnstapMessage::decode(payload).unwrap())
            .collect()
    }

    fn text(message: &DnstapMessage) -> String {
        let wire = message.message().unwrap().query_message.clone().unwrap();
        String::from_utf8(wire).unwrap()
    }

    #[tokio::test]
    async fn test_events_become_tool_queries() {
        let (client, server) = tokio::io::duplex(1024 * 1024);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        let dispatcher = Arc::new(Dispatcher::new(writer).unwrap());

        let layer = DnstapLayer::new(dispatcher.clone())
            .with_identity("resolver-1")
            .with_version("0.1.0");
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", zone = "example.com", "zone loaded");
            tracing::debug!(target: "app", "too verbose");
            tracing::warn!(target: "dnstap_session::writer", "internal");
            tracing::error!(target: "app", "resolver down");
        });
        dispatcher.shutdown().await;

        let messages = exported(server).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(text(&messages[0]), "INFO app: zone loaded zone=example.com");
        assert_eq!(text(&messages[1]), "ERROR app: resolver down");

        let envelope = messages[0].envelope();
        assert_eq!(envelope.identity.as_deref(), Some(&b"resolver-1"[..]));
        assert_eq!(envelope.version.as_deref(), Some(&b"0.1.0"[..]));
        assert_eq!(messages[0].kind(), MessageType::ToolQuery);
        assert!(messages[0].message().unwrap().query_time_sec.is_some());
    }

    #[tokio::test]
    async fn test_max_level() {
        let (client, server) = tokio::io::duplex(1024 * 1024);
        let writer = SessionWriter::new(client, SessionOptions::unidirectional());
        let dispatcher = Arc::new(Dispatcher::new(writer).unwrap());

        let layer = DnstapLayer::new(dispatcher.clone()).with_max_level(Level::DEBUG);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "app", "visible");
            tracing::trace!(target: "app", "hidden");
        });
        dispatcher.shutdown().await;

        let messages = exported(server).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(text(&messages[0]), "DEBUG app: visible");
    }
}
