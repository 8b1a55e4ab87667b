use async_trait::async_trait;

/// Byte stream to the embedded controller.
///
/// Reads may block until data arrives; callers bound them with a timeout and
/// must tolerate the future being dropped mid-read.
#[async_trait]
pub trait SerialTransport: Send {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;
}

/// Opens transports by port identifier and lists the candidates.
#[async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self, port: &str, baud: u32) -> std::io::Result<Box<dyn SerialTransport>>;
    fn available_ports(&self) -> Vec<String>;
}
