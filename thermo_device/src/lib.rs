//! Virtual embedded temperature controller.
//!
//! Speaks the same line protocol as the real board through an in-memory
//! [`thermo_shared::SerialTransport`], so the host's physical-link path can be
//! driven end to end without hardware.

pub mod controller;
pub mod port;

pub use controller::{FirmwareConfig, VirtualController};
pub use port::{DeviceHandle, LineFault, VirtualBench, VirtualPort};
