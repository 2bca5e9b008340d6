//! Configuration handling for the dnstap client.
//!
//! Settings come from an optional YAML file, then environment variables,
//! then the command line (applied by `main`).

use anyhow::{bail, Result};
use dnstap_session::dispatcher::DEFAULT_DRAIN_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Where events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Append to a file
    File,
    /// TCP collector
    Tcp,
    /// Unix stream socket collector
    Unix,
}

impl std::str::FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Target::File),
            "tcp" => Ok(Target::Tcp),
            "unix" => Ok(Target::Unix),
            other => bail!("unknown target {:?}, expected file, tcp or unix", other),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub target: Target,
    /// Output file for the file target
    pub file: PathBuf,
    /// Collector host for the tcp target
    pub host: String,
    /// Collector port for the tcp target
    pub port: u16,
    /// Socket path for the unix target
    pub socket: PathBuf,
    pub identity: Option<String>,
    pub version: Option<String>,
    /// Run the READY/ACCEPT handshake on stream sockets
    pub handshake: bool,
    /// Number of events to send
    pub count: u32,
    /// Delay between events
    pub interval: Duration,
    /// Longest wait for queued events at shutdown
    pub drain_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: Target::File,
            file: PathBuf::from("dnstap.fstrm"),
            host: "127.0.0.1".to_string(),
            port: 6000,
            socket: PathBuf::from("/var/run/dnstap.sock"),
            identity: None,
            version: None,
            handshake: true,
            count: 100,
            interval: Duration::from_millis(100),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    dnstap: Option<FileConfig>,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    target: Option<Target>,
    file: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    socket: Option<PathBuf>,
    identity: Option<String>,
    version: Option<String>,
    handshake: Option<bool>,
    count: Option<u32>,
    interval_ms: Option<u64>,
    drain_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}, using defaults: {}",
                        config_path.as_ref(),
                        e
                    );
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path.as_ref());
            }
        }

        config.apply_environment_overrides()?;
        Ok(config)
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        let Some(section) = root_config.dnstap else {
            return;
        };

        if let Some(target) = section.target {
            self.target = target;
        }
        if let Some(file) = section.file {
            self.file = file;
        }
        if let Some(host) = section.host {
            self.host = host;
        }
        if let Some(port) = section.port {
            self.port = port;
        }
        if let Some(socket) = section.socket {
            self.socket = socket;
        }
        if section.identity.is_some() {
            self.identity = section.identity;
        }
        if section.version.is_some() {
            self.version = section.version;
        }
        if let Some(handshake) = section.handshake {
            self.handshake = handshake;
        }
        if let Some(count) = section.count {
            self.count = count;
        }
        if let Some(interval_ms) = section.interval_ms {
            self.interval = Duration::from_millis(interval_ms);
        }
        if let Some(drain_timeout_ms) = section.drain_timeout_ms {
            self.drain_timeout = Duration::from_millis(drain_timeout_ms);
        }
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(target) = lookup("DNSTAP_TARGET") {
            self.target = target.parse()?;
            info!("Target overridden by environment: {:?}", self.target);
        }

        if let Some(file) = lookup("DNSTAP_FILE") {
            self.file = PathBuf::from(file);
            info!("Output file overridden by environment: {:?}", self.file);
        }

        if let Some(host) = lookup("DNSTAP_HOST") {
            self.host = host;
            info!("Collector host overridden by environment: {}", self.host);
        }

        if let Some(port) = lookup("DNSTAP_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.port = port;
                    info!("Collector port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid DNSTAP_PORT {:?}", port),
            }
        }

        if let Some(socket) = lookup("DNSTAP_SOCKET") {
            self.socket = PathBuf::from(socket);
            info!("Socket path overridden by environment: {:?}", self.socket);
        }

        if let Some(identity) = lookup("DNSTAP_IDENTITY") {
            self.identity = Some(identity);
        }

        if let Some(version) = lookup("DNSTAP_VERSION") {
            self.version = Some(version);
        }

        Ok(())
    }

    /// Reject settings that cannot produce a session
    pub fn validate(&self) -> Result<()> {
        match self.target {
            Target::File if self.file.as_os_str().is_empty() => bail!("missing output file"),
            Target::Tcp if self.host.is_empty() => bail!("missing collector host"),
            Target::Tcp if self.port == 0 => bail!("invalid collector port 0"),
            Target::Unix if self.socket.as_os_str().is_empty() => bail!("missing socket path"),
            _ => Ok(()),
        }
    }

    /// Human readable sink description for logs
    pub fn describe_target(&self) -> String {
        match self.target {
            Target::File => format!("file {}", self.file.display()),
            Target::Tcp => format!("tcp {}:{}", self.host, self.port),
            Target::Unix => format!("unix {}", self.socket.display()),
        }
    }
}
