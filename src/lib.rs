// src/lib.rs - Serial thermal process monitor and controller
pub mod communication;
pub mod config;
pub mod controller;
pub mod hardware;
pub mod history;
pub mod scheduler;
pub mod simulator;
pub mod sink;

pub use controller::{ControlLoop, LoopState, TickOutcome};
pub use thermo_shared::{Frame, ProcessStatus, SIMULATION_PORT};
