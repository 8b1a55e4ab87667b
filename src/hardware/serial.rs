// src/hardware/serial.rs - OS serial ports via serial2-tokio
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use thermo_shared::{PortOpener, SerialTransport};

/// Opens real serial devices (8N1, no flow control).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

/// An open OS serial port.
pub struct SystemPort {
    port: SerialPort,
    name: String,
}

#[async_trait]
impl PortOpener for SystemSerial {
    async fn open(&self, port: &str, baud: u32) -> std::io::Result<Box<dyn SerialTransport>> {
        let serial = SerialPort::open(port, baud)?;
        tracing::debug!("Opened {} at {} baud", port, baud);
        Ok(Box::new(SystemPort {
            port: serial,
            name: port.to_string(),
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        match SerialPort::available_ports() {
            Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            Err(e) => {
                tracing::warn!("Port enumeration failed: {}", e);
                vec![]
            }
        }
    }
}

#[async_trait]
impl SerialTransport for SystemPort {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf).await
    }
}

impl std::fmt::Debug for SystemPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPort")
            .field("name", &self.name)
            .finish()
    }
}
