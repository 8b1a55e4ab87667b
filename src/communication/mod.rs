// src/communication/mod.rs - Operator-facing command channel
pub mod commands;

pub use commands::{CommandError, OperatorCommand, parse_operator_line};
