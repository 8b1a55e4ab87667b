// In-memory serial ports backed by virtual controllers.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thermo_shared::protocol::parse_command;
use thermo_shared::{PortOpener, SerialTransport};

use crate::controller::VirtualController;

/// Line condition seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFault {
    Healthy,
    /// Reads never complete; the host's read timeout fires.
    Silent,
    /// Reads fail as if the cable was pulled.
    Broken,
}

#[derive(Debug)]
struct DeviceSlot {
    controller: VirtualController,
    fault: LineFault,
    refuse_open: bool,
    lines_per_read: usize,
    injected: Vec<u8>,
}

impl DeviceSlot {
    fn next_batch(&mut self) -> Vec<u8> {
        if !self.injected.is_empty() {
            return std::mem::take(&mut self.injected);
        }
        let mut batch = Vec::new();
        for _ in 0..self.lines_per_read {
            batch.extend_from_slice(&self.controller.step().encode());
        }
        batch
    }
}

/// Test-side handle on a virtual device plugged into a [`VirtualBench`].
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    inner: Arc<Mutex<DeviceSlot>>,
}

impl DeviceHandle {
    fn new(controller: VirtualController) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeviceSlot {
                controller,
                fault: LineFault::Healthy,
                refuse_open: false,
                lines_per_read: 1,
                injected: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceSlot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn press_setpoint(&self, delta: f64) {
        self.lock().controller.press_setpoint(delta);
    }

    pub fn setpoint(&self) -> f64 {
        self.lock().controller.setpoint()
    }

    /// Setpoints received over the wire, oldest first.
    pub fn received_setpoints(&self) -> Vec<f64> {
        self.lock()
            .controller
            .received()
            .iter()
            .map(|command| match *command {
                thermo_shared::DeviceCommand::SetTarget(value) => value,
            })
            .collect()
    }

    pub fn set_fault(&self, fault: LineFault) {
        self.lock().fault = fault;
    }

    pub fn set_legacy_output(&self, legacy: bool) {
        self.lock().controller.set_legacy_output(legacy);
    }

    /// Number of telemetry lines the device emits between two host reads.
    pub fn set_lines_per_read(&self, lines: usize) {
        self.lock().lines_per_read = lines.max(1);
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.lock().refuse_open = refuse;
    }

    /// Replace the next read's bytes with `bytes`.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().injected.extend_from_slice(bytes);
    }
}

/// Transport handed to the host when it opens a virtual port.
#[derive(Debug)]
pub struct VirtualPort {
    device: DeviceHandle,
    inbound: Vec<u8>,
}

#[async_trait]
impl SerialTransport for VirtualPort {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let batch = {
            let mut slot = self.device.lock();
            match slot.fault {
                LineFault::Broken => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
                }
                LineFault::Silent => None,
                LineFault::Healthy => Some(slot.next_batch()),
            }
        };

        match batch {
            Some(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            None => std::future::pending::<io::Result<usize>>().await,
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut slot = self.device.lock();
        if slot.fault == LineFault::Broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }
        self.inbound.extend_from_slice(buf);
        while let Some(pos) = self.inbound.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.inbound.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            match parse_command(&line) {
                Ok(command) => slot.controller.apply(command),
                Err(e) => tracing::warn!("device ignored {:?}: {}", line.trim(), e),
            }
        }
        Ok(())
    }
}

/// A set of virtual devices addressable by port name.
#[derive(Debug, Default)]
pub struct VirtualBench {
    devices: HashMap<String, DeviceHandle>,
}

impl VirtualBench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&mut self, port: &str, controller: VirtualController) -> DeviceHandle {
        let handle = DeviceHandle::new(controller);
        self.devices.insert(port.to_string(), handle.clone());
        handle
    }
}

#[async_trait]
impl PortOpener for VirtualBench {
    async fn open(&self, port: &str, _baud: u32) -> io::Result<Box<dyn SerialTransport>> {
        let device = self.devices.get(port).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such port: {}", port))
        })?;
        if device.lock().refuse_open {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "port busy"));
        }
        Ok(Box::new(VirtualPort {
            device: device.clone(),
            inbound: Vec::new(),
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.devices.keys().cloned().collect();
        ports.sort();
        ports
    }
}
