// src/hardware/mod.rs - Link lifecycle: disconnected, physical, simulated
pub mod serial;
pub mod temperature;

use std::io::ErrorKind;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use thermo_shared::{PortOpener, SIMULATION_PORT, SerialTransport};
use thiserror::Error;

use crate::config::LinkConfig;

const READ_CHUNK: usize = 4096;
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Longest unterminated line kept across reads before it is treated as noise.
const MAX_PENDING_TAIL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Cannot open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },
    #[error("Serial read error: {0}")]
    Read(String),
    #[error("Serial write error: {0}")]
    Write(String),
    #[error("No usable data for {0} consecutive reads")]
    Stalled(u32),
}

/// The link itself. Only [`LinkManager`] ever holds the transport.
pub enum Link {
    Disconnected,
    Connected {
        port: String,
        transport: Box<dyn SerialTransport>,
    },
    Simulated,
}

impl Link {
    pub fn is_open(&self) -> bool {
        !matches!(self, Link::Disconnected)
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            Link::Disconnected => LinkKind::Disconnected,
            Link::Connected { port, .. } => LinkKind::Connected(port.clone()),
            Link::Simulated => LinkKind::Simulated,
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.kind(), f)
    }
}

/// Handle-free description of the link, safe to hand to collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Disconnected,
    Connected(String),
    Simulated,
}

impl LinkKind {
    pub fn label(&self) -> String {
        match self {
            LinkKind::Disconnected => "Disconnected".to_string(),
            LinkKind::Connected(port) => format!("Connected: {}", port),
            LinkKind::Simulated => "Simulation mode".to_string(),
        }
    }
}

/// Link statistics, reset on every successful open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub commands_sent: u64,
    pub write_errors: u64,
    pub timeouts: u64,
    pub frames_decoded: u64,
    pub decode_failures: u64,
}

/// Owns the link and everything that touches the transport.
pub struct LinkManager {
    opener: Box<dyn PortOpener>,
    link: Link,
    config: LinkConfig,
    stats: LinkStats,
    tail: Vec<u8>,
    /// Drop bytes up to the next newline before trusting a line start.
    resync: bool,
}

impl LinkManager {
    pub fn new(opener: Box<dyn PortOpener>, config: LinkConfig) -> Self {
        Self {
            opener,
            link: Link::Disconnected,
            config,
            stats: LinkStats::default(),
            tail: Vec::new(),
            resync: false,
        }
    }

    /// Open `port`, or the synthetic process for the reserved "Simulation" id.
    /// An already-open link is closed first.
    pub async fn open(&mut self, port: &str) -> Result<LinkKind, LinkError> {
        self.close();

        if port == SIMULATION_PORT {
            self.link = Link::Simulated;
        } else {
            let transport = self
                .opener
                .open(port, self.config.baud)
                .await
                .map_err(|e| LinkError::OpenFailed {
                    port: port.to_string(),
                    reason: e.to_string(),
                })?;
            self.link = Link::Connected {
                port: port.to_string(),
                transport,
            };
        }

        self.stats = LinkStats::default();
        self.tail.clear();
        // A device that is already streaming may be mid-line
        self.resync = matches!(self.link, Link::Connected { .. });
        tracing::info!("Link open: {}", self.link.kind().label());
        Ok(self.link.kind())
    }

    /// Close the link. Returns whether anything was actually open, so a second
    /// call is a harmless no-op.
    pub fn close(&mut self) -> bool {
        match std::mem::replace(&mut self.link, Link::Disconnected) {
            Link::Disconnected => false,
            Link::Simulated => {
                tracing::info!("Simulation stopped");
                true
            }
            Link::Connected { port, transport } => {
                drop(transport);
                self.tail.clear();
                self.resync = false;
                tracing::info!("Closed {} ({:?})", port, self.stats);
                true
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.link, Link::Simulated)
    }

    pub fn kind(&self) -> LinkKind {
        self.link.kind()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Candidate port identifiers, with the simulation pseudo-port last.
    pub fn available_ports(&self) -> Vec<String> {
        let mut ports = self.opener.available_ports();
        ports.push(SIMULATION_PORT.to_string());
        ports
    }

    /// One timeout-bounded read from the physical link.
    ///
    /// Returns the complete lines that arrived, possibly none. An unterminated
    /// trailing line is held back and completed by a later read. Timeouts are
    /// empty reads; other I/O errors mean the link is gone.
    pub async fn read_batch(&mut self) -> Result<Vec<u8>, LinkError> {
        let deadline = self.read_deadline();
        self.read_batch_until(deadline).await
    }

    /// When a read started now has to give up.
    pub fn read_deadline(&self) -> Instant {
        Instant::now() + self.config.read_timeout()
    }

    /// [`read_batch`](Self::read_batch) against a fixed deadline, so a read
    /// that is dropped and restarted does not extend its own timeout.
    pub async fn read_batch_until(&mut self, deadline: Instant) -> Result<Vec<u8>, LinkError> {
        let Link::Connected { transport, .. } = &mut self.link else {
            return Ok(Vec::new());
        };

        let mut buf = vec![0u8; READ_CHUNK];
        let result = tokio::time::timeout_at(deadline, transport.read(&mut buf)).await;
        match result {
            Err(_) => {
                self.stats.timeouts += 1;
                tracing::trace!("Read timed out");
                Ok(Vec::new())
            }
            Ok(Ok(n)) => {
                self.stats.bytes_received += n as u64;
                Ok(self.assemble(&buf[..n]))
            }
            Ok(Err(e)) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                self.stats.timeouts += 1;
                Ok(Vec::new())
            }
            Ok(Err(e)) => Err(LinkError::Read(e.to_string())),
        }
    }

    /// Fire-and-forget write. Not connected to a device is not an error.
    /// Returns whether bytes went out.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<bool, LinkError> {
        let Link::Connected { transport, .. } = &mut self.link else {
            return Ok(false);
        };

        let result = tokio::time::timeout(WRITE_TIMEOUT, transport.write_all(bytes)).await;
        match result {
            Ok(Ok(())) => {
                self.stats.commands_sent += 1;
                self.stats.bytes_sent += bytes.len() as u64;
                tracing::debug!("TX: {}", String::from_utf8_lossy(bytes).trim_end());
                Ok(true)
            }
            Ok(Err(e)) => {
                self.stats.write_errors += 1;
                Err(LinkError::Write(e.to_string()))
            }
            Err(_) => {
                self.stats.write_errors += 1;
                Err(LinkError::Write(format!("timed out after {:?}", WRITE_TIMEOUT)))
            }
        }
    }

    pub fn record_decode(&mut self, decoded: bool) {
        if decoded {
            self.stats.frames_decoded += 1;
        } else {
            self.stats.decode_failures += 1;
        }
    }

    fn assemble(&mut self, fresh: &[u8]) -> Vec<u8> {
        let fresh = if self.resync {
            match fresh.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    tracing::trace!("Skipped {} bytes to the next line start", end + 1);
                    self.resync = false;
                    &fresh[end + 1..]
                }
                None => return Vec::new(),
            }
        } else {
            fresh
        };

        let mut batch = std::mem::take(&mut self.tail);
        batch.extend_from_slice(fresh);
        let complete = batch.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        let remainder = batch.split_off(complete);
        if remainder.len() <= MAX_PENDING_TAIL {
            self.tail = remainder;
        } else {
            tracing::warn!("Dropping {} bytes without a line terminator", remainder.len());
            // The rest of that line is still on its way
            self.resync = true;
        }
        batch
    }
}

impl std::fmt::Debug for LinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkManager")
            .field("link", &self.link)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
