// src/communication/commands.rs - Operator commands and their text form
use thiserror::Error;

use crate::hardware::temperature::SetpointDelta;

/// A request from the operator, drained by the control task between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Open a port, or "Simulation".
    Connect(String),
    Disconnect,
    SetpointDelta(SetpointDelta),
    SetpointAbsolute(f64),
    /// Report candidate ports to the sink.
    ListPorts,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid setpoint: '{0}' is not a number")]
    InvalidSetpoint(String),
    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(String),
}

/// Parse one line of operator input.
///
/// ```
/// use thermo_rs::communication::{OperatorCommand, parse_operator_line};
///
/// assert_eq!(parse_operator_line("set 26,5"), Ok(OperatorCommand::SetpointAbsolute(26.5)));
/// assert_eq!(parse_operator_line("connect Simulation"), Ok(OperatorCommand::Connect("Simulation".into())));
/// ```
pub fn parse_operator_line(line: &str) -> Result<OperatorCommand, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    if let Some(delta) = SetpointDelta::parse(word) {
        return Ok(OperatorCommand::SetpointDelta(delta));
    }

    match word.to_ascii_lowercase().as_str() {
        "connect" | "open" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument(word.to_string()));
            }
            Ok(OperatorCommand::Connect(rest.to_string()))
        }
        "disconnect" | "close" => Ok(OperatorCommand::Disconnect),
        "set" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument(word.to_string()));
            }
            parse_setpoint(rest).map(OperatorCommand::SetpointAbsolute)
        }
        "ports" => Ok(OperatorCommand::ListPorts),
        "quit" | "exit" => Ok(OperatorCommand::Shutdown),
        _ => Err(CommandError::UnknownCommand(line.to_string())),
    }
}

/// Operators type either decimal separator.
pub fn parse_setpoint(text: &str) -> Result<f64, CommandError> {
    let normalized = text.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CommandError::InvalidSetpoint(text.trim().to_string())),
    }
}
