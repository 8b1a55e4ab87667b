// src/sink.rs - Where snapshots and link errors go
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thermo_shared::ProcessStatus;
use tokio::sync::mpsc;

use crate::hardware::LinkError;
use crate::history::Bounds;

/// Read-only view of the loop after a tick, a connect or a disconnect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub times: Vec<f64>,
    pub measured: Vec<f64>,
    pub setpoint: Vec<f64>,
    pub status: Option<ProcessStatus>,
    pub connection_label: String,
    /// Current target, which may be newer than the last sample's setpoint.
    pub target: f64,
    pub last_measured: Option<f64>,
    /// Setpoint minus measured of the newest sample.
    pub control_error: Option<f64>,
    pub bounds: Option<Bounds>,
}

/// Outbound collaborator of the control loop.
///
/// Called from the control task, so implementations should not block.
pub trait SnapshotSink: Send + Sync {
    fn on_snapshot(&self, snapshot: Arc<Snapshot>);

    fn on_link_error(&self, error: &LinkError);

    fn on_ports(&self, ports: &[String]) {
        tracing::info!("Available ports: {}", ports.join(", "));
    }
}

/// Human-readable one-line summaries through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn on_snapshot(&self, snapshot: Arc<Snapshot>) {
        match (snapshot.last_measured, snapshot.status) {
            (Some(measured), Some(status)) => tracing::info!(
                "[{}] T={:.2}°C target={:.2}°C error={:+.2}°C {}",
                snapshot.connection_label,
                measured,
                snapshot.target,
                snapshot.control_error.unwrap_or_default(),
                status
            ),
            _ => tracing::info!(
                "[{}] target={:.2}°C, no data",
                snapshot.connection_label,
                snapshot.target
            ),
        }
    }

    fn on_link_error(&self, error: &LinkError) {
        tracing::error!("Link error: {}", error);
    }
}

/// One JSON object per line on any writer.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit<T: Serialize>(&self, value: &T) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *out, value)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            tracing::warn!("Failed to write snapshot: {}", e);
        }
    }
}

impl<W: Write + Send> SnapshotSink for JsonLinesSink<W> {
    fn on_snapshot(&self, snapshot: Arc<Snapshot>) {
        self.emit(&*snapshot);
    }

    fn on_link_error(&self, error: &LinkError) {
        self.emit(&serde_json::json!({ "link_error": error.to_string() }));
    }

    fn on_ports(&self, ports: &[String]) {
        self.emit(&serde_json::json!({ "ports": ports }));
    }
}

/// Everything a sink can receive, as a message.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Snapshot(Arc<Snapshot>),
    LinkError(LinkError),
    Ports(Vec<String>),
}

/// Forwards to a channel, for embedding the loop in another task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        // Receiver gone means nobody is watching any more
        let _ = self.tx.send(event);
    }
}

impl SnapshotSink for ChannelSink {
    fn on_snapshot(&self, snapshot: Arc<Snapshot>) {
        self.forward(SinkEvent::Snapshot(snapshot));
    }

    fn on_link_error(&self, error: &LinkError) {
        self.forward(SinkEvent::LinkError(error.clone()));
    }

    fn on_ports(&self, ports: &[String]) {
        self.forward(SinkEvent::Ports(ports.to_vec()));
    }
}
