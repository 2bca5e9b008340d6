//! dnstap client binary.
//!
//! Streams synthetic TOOL_QUERY events to a file, a TCP collector or a unix
//! socket collector using Frame Streams, then stops the session cleanly.

use clap::{ArgAction, Parser};
use dnstap_message::{DnstapMessage, MessageType, Timestamp};
use dnstap_session::{Dispatcher, DnstapLayer, SessionOptions, SessionWriter};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{ClientConfig, Target};
use logging::DnstapLogFormatter;

const QUERY_NAME: &str = "example.com";
const QUERY_ZONE: &str = "example.com";
const QUERY_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 100));
const QUERY_PORT: u16 = 54321;

/// Send dnstap events to a Frame Streams collector
#[derive(Parser, Debug)]
#[command(
    name = "dnstap-client",
    about = "Send dnstap events to a file, TCP or unix socket collector"
)]
struct Args {
    /// Sink type
    #[arg(long, value_enum)]
    target: Option<Target>,

    /// Output file for --target file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Collector host for --target tcp
    #[arg(long)]
    host: Option<String>,

    /// Collector port for --target tcp
    #[arg(long)]
    port: Option<u16>,

    /// Collector socket path for --target unix
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Identity of the sending server
    #[arg(long)]
    identity: Option<String>,

    /// Version of the sending server
    #[arg(long)]
    version: Option<String>,

    /// Number of events to send [default: 100]
    #[arg(long)]
    count: Option<u32>,

    /// Delay between events, e.g. 100ms [default: 100ms]
    #[arg(long)]
    interval: Option<humantime::Duration>,

    /// Longest wait for queued events at shutdown, e.g. 5s [default: 5s]
    #[arg(long)]
    drain_timeout: Option<humantime::Duration>,

    /// Use the READY/ACCEPT handshake on stream sockets [default: true]
    #[arg(long, action = ArgAction::Set)]
    handshake: Option<bool>,

    /// Also export this client's own log events as dnstap records
    #[arg(long)]
    forward_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "dnstap.yaml")]
    config: PathBuf,
}

impl Args {
    /// Command line values win over file and environment
    fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(file) = &self.file {
            config.file = file.clone();
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(socket) = &self.socket {
            config.socket = socket.clone();
        }
        if self.identity.is_some() {
            config.identity = self.identity.clone();
        }
        if self.version.is_some() {
            config.version = self.version.clone();
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(interval) = self.interval {
            config.interval = interval.into();
        }
        if let Some(drain_timeout) = self.drain_timeout {
            config.drain_timeout = drain_timeout.into();
        }
        if let Some(handshake) = self.handshake {
            config.handshake = handshake;
        }
    }
}

fn env_filter(log_level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::new("info")
        .add_directive(format!("dnstap_client={}", log_level).parse()?)
        .add_directive(format!("dnstap_session={}", log_level).parse()?)
        .add_directive(format!("dnstap_wire={}", log_level).parse()?))
}

async fn open_writer(config: &ClientConfig) -> anyhow::Result<SessionWriter> {
    let options = if config.handshake {
        SessionOptions::bidirectional()
    } else {
        SessionOptions::unidirectional()
    };

    let writer = match config.target {
        Target::File => SessionWriter::create_file(&config.file).await?,
        Target::Tcp => {
            SessionWriter::connect_tcp((config.host.as_str(), config.port), options).await?
        }
        #[cfg(unix)]
        Target::Unix => SessionWriter::connect_unix(&config.socket, options).await?,
        #[cfg(not(unix))]
        Target::Unix => anyhow::bail!("unix sockets are not supported on this platform"),
    };
    Ok(writer)
}

fn build_event(config: &ClientConfig) -> anyhow::Result<DnstapMessage> {
    let mut builder = DnstapMessage::builder(MessageType::ToolQuery)
        .query_address(QUERY_ADDRESS)
        .query_port(QUERY_PORT)
        .query_time(Timestamp::now())
        .query_for(QUERY_NAME)?
        .query_zone(QUERY_ZONE)?;
    if let Some(identity) = &config.identity {
        builder = builder.identity(identity.as_bytes());
    }
    if let Some(version) = &config.version {
        builder = builder.version(version.as_bytes());
    }
    Ok(builder.build()?)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Console-only logging until the session exists
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&args.log_level)?)
        .event_format(DnstapLogFormatter::new("dnstap-client".to_string()))
        .finish();
    let bootstrap_guard = tracing::subscriber::set_default(bootstrap);

    info!("Starting dnstap client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config);
    config.validate()?;

    let writer = open_writer(&config).await?;
    info!("Opened dnstap session to {}", config.describe_target());
    let dispatcher = Arc::new(Dispatcher::new(writer)?.with_drain_timeout(config.drain_timeout));

    drop(bootstrap_guard);

    let forward = if args.forward_logs {
        let mut layer = DnstapLayer::new(dispatcher.clone());
        if let Some(identity) = &config.identity {
            layer = layer.with_identity(identity.as_bytes());
        }
        if let Some(version) = &config.version {
            layer = layer.with_version(version.as_bytes());
        }
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter(&args.log_level)?)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(DnstapLogFormatter::new("dnstap-client".to_string())),
        )
        .with(forward)
        .init();

    info!(
        "Sending {} events every {}",
        config.count,
        humantime::format_duration(config.interval)
    );

    let send = async {
        for i in 0..config.count {
            if i > 0 {
                tokio::time::sleep(config.interval).await;
            }
            dispatcher.enqueue(build_event(&config)?);
            debug!("Queued event {}/{}", i + 1, config.count);
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        result = send => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, flushing queued events");
        }
    }

    tokio::select! {
        _ = dispatcher.shutdown() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted again, abandoning queued events");
            dispatcher.abort().await;
        }
    }

    let stats = dispatcher.stats();
    if stats.failed > 0 {
        anyhow::bail!(
            "{} of {} events could not be written to {}",
            stats.failed,
            stats.enqueued,
            config.describe_target()
        );
    }

    info!("Sent {} events to {}", stats.written, config.describe_target());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "dnstap-client",
            "--target",
            "tcp",
            "--host",
            "10.0.0.1",
            "--port",
            "6001",
            "--count",
            "3",
            "--interval",
            "250ms",
            "--handshake",
            "false",
            "--drain-timeout",
            "2s",
        ]);

        let mut config = ClientConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.target, Target::Tcp);
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 6001);
        assert_eq!(config.count, 3);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert!(!config.handshake);
        assert_eq!(config.drain_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_unset_args_keep_config() {
        let args = Args::parse_from(["dnstap-client"]);
        let mut config = ClientConfig {
            identity: Some("from-file".to_string()),
            ..ClientConfig::default()
        };
        args.apply_to(&mut config);

        assert_eq!(config.identity.as_deref(), Some("from-file"));
        assert_eq!(config.count, 100);
        assert!(config.handshake);
    }

    #[test]
    fn test_build_event() {
        let config = ClientConfig {
            identity: Some("resolver-1".to_string()),
            ..ClientConfig::default()
        };
        let event = build_event(&config).unwrap();
        let message = event.message().unwrap();

        assert_eq!(event.kind(), MessageType::ToolQuery);
        assert_eq!(event.envelope().identity.as_deref(), Some(&b"resolver-1"[..]));
        assert_eq!(message.query_port, Some(u32::from(QUERY_PORT)));
        assert_eq!(message.query_address.as_deref(), Some(&[192, 0, 2, 100][..]));
        assert_eq!(
            message.query_zone.as_deref(),
            Some(&b"\x07example\x03com\x00"[..])
        );
    }
}
