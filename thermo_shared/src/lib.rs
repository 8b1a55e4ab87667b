// thermo_shared: what the host and the embedded controller agree on

pub mod protocol;
pub mod serial_interface;
pub mod status;

pub use protocol::{DecodeError, DeviceCommand, Frame};
pub use serial_interface::{PortOpener, SerialTransport};
pub use status::{ProcessStatus, classify, classify_with_band, STABLE_BAND};

/// Reserved port identifier that selects the synthetic process model.
pub const SIMULATION_PORT: &str = "Simulation";
