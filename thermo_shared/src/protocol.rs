//! Line-oriented telemetry protocol spoken over the serial link.
//!
//! Device to host, one frame per newline-terminated line:
//!
//! ```text
//! 21.30;25.00\n   modern frame: measured;setpoint
//! 21.30\n         legacy frame: measured only
//! ```
//!
//! Host to device: `SET:<setpoint with one decimal>\n`. Nothing is acknowledged.
//!
//! The protocol reflects current state rather than queueing it, so only the
//! last complete line of a read batch is decoded.

use thiserror::Error;

pub const FIELD_SEPARATOR: char = ';';
pub const COMMAND_PREFIX: &str = "SET:";

/// Decoded inbound telemetry line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Modern { measured: f64, device_setpoint: f64 },
    Legacy { measured: f64 },
}

impl Frame {
    pub fn measured(&self) -> f64 {
        match *self {
            Frame::Modern { measured, .. } | Frame::Legacy { measured } => measured,
        }
    }

    /// Setpoint reported by the device; legacy frames carry none.
    pub fn device_setpoint(&self) -> Option<f64> {
        match *self {
            Frame::Modern { device_setpoint, .. } => Some(device_setpoint),
            Frame::Legacy { .. } => None,
        }
    }

    /// Device-side encoding of a telemetry line.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Frame::Modern { measured, device_setpoint } => {
                format!("{:.2}{}{:.2}\n", measured, FIELD_SEPARATOR, device_setpoint).into_bytes()
            }
            Frame::Legacy { measured } => format!("{:.2}\n", measured).into_bytes(),
        }
    }
}

/// Command understood by the embedded controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    SetTarget(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("empty read")]
    Empty,
    #[error("no complete line in batch")]
    NoCompleteLine,
    #[error("line is not valid UTF-8")]
    Utf8,
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
}

/// Returns the last newline-terminated line of `batch`, without its terminator.
/// Bytes after the final newline belong to a line still in flight and are ignored.
pub fn last_complete_line(batch: &[u8]) -> Result<&[u8], DecodeError> {
    if batch.is_empty() {
        return Err(DecodeError::Empty);
    }
    let end = batch
        .iter()
        .rposition(|&b| b == b'\n')
        .ok_or(DecodeError::NoCompleteLine)?;
    let start = batch[..end]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    Ok(&batch[start..end])
}

/// Decode the newest telemetry frame in a read batch, reporting why it failed.
pub fn try_decode(batch: &[u8]) -> Result<Frame, DecodeError> {
    let line = last_complete_line(batch)?;
    let line = std::str::from_utf8(line)
        .map_err(|_| DecodeError::Utf8)?
        .trim();
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    match line.split_once(FIELD_SEPARATOR) {
        Some((measured, rest)) => {
            // Fields past the setpoint are ignored.
            let (setpoint, _) = rest.split_once(FIELD_SEPARATOR).unwrap_or((rest, ""));
            Ok(Frame::Modern {
                measured: parse_field(measured)?,
                device_setpoint: parse_field(setpoint)?,
            })
        }
        None => Ok(Frame::Legacy {
            measured: parse_field(line)?,
        }),
    }
}

/// Decode the newest telemetry frame in a read batch.
///
/// `None` means "nothing usable arrived": the caller keeps its previous
/// measurement. It is not an error state.
pub fn decode(batch: &[u8]) -> Option<Frame> {
    try_decode(batch).ok()
}

/// Encode an outbound setpoint command, e.g. `SET:25.5\n`.
pub fn encode_setpoint(setpoint: f64) -> Vec<u8> {
    format!("{}{:.1}\n", COMMAND_PREFIX, setpoint).into_bytes()
}

/// Device-side parsing of one command line.
pub fn parse_command(line: &str) -> Result<DeviceCommand, DecodeError> {
    let line = line.trim();
    let value = line
        .strip_prefix(COMMAND_PREFIX)
        .ok_or_else(|| DecodeError::UnknownCommand(line.to_string()))?;
    Ok(DeviceCommand::SetTarget(parse_field(value)?))
}

fn parse_field(field: &str) -> Result<f64, DecodeError> {
    let field = field.trim();
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(DecodeError::InvalidNumber(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_modern_frame() {
        assert_eq!(
            decode(b"21.3;25.0\n"),
            Some(Frame::Modern { measured: 21.3, device_setpoint: 25.0 })
        );
    }

    #[test]
    fn test_decode_legacy_frame() {
        assert_eq!(decode(b"21.3\n"), Some(Frame::Legacy { measured: 21.3 }));
    }

    #[test]
    fn test_decode_garbage_is_none() {
        assert_eq!(decode(b"garbage\n"), None);
        assert_eq!(
            try_decode(b"garbage\n"),
            Err(DecodeError::InvalidNumber("garbage".to_string()))
        );
    }

    #[test]
    fn test_decode_empty_read() {
        assert_eq!(decode(b""), None);
        assert_eq!(try_decode(b""), Err(DecodeError::Empty));
        assert_eq!(try_decode(b"\n"), Err(DecodeError::Empty));
    }

    #[test]
    fn test_only_last_complete_line_counts() {
        let batch = b"20.1;25.0\n20.2;25.0\n20.3;26.0\n20.4;2";
        assert_eq!(
            decode(batch),
            Some(Frame::Modern { measured: 20.3, device_setpoint: 26.0 })
        );
    }

    #[test]
    fn test_partial_line_without_newline() {
        assert_eq!(try_decode(b"21.3;25"), Err(DecodeError::NoCompleteLine));
    }

    #[test]
    fn test_crlf_terminated_lines() {
        assert_eq!(
            decode(b"22.50;24.00\r\n"),
            Some(Frame::Modern { measured: 22.5, device_setpoint: 24.0 })
        );
    }

    #[test]
    fn test_bad_setpoint_field_rejects_whole_frame() {
        assert_eq!(decode(b"21.3;\n"), None);
        assert_eq!(decode(b"21.3;abc\n"), None);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        assert_eq!(
            decode(b"21.3;25.0;99\n"),
            Some(Frame::Modern { measured: 21.3, device_setpoint: 25.0 })
        );
    }

    #[test]
    fn test_non_finite_values_rejected() {
        assert_eq!(decode(b"NaN\n"), None);
        assert_eq!(decode(b"21.0;inf\n"), None);
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(try_decode(b"\xff\xfe\n"), Err(DecodeError::Utf8));
    }

    #[test]
    fn test_encode_setpoint() {
        assert_eq!(encode_setpoint(25.5), b"SET:25.5\n".to_vec());
        assert_eq!(encode_setpoint(25.0), b"SET:25.0\n".to_vec());
        assert_eq!(encode_setpoint(19.96), b"SET:20.0\n".to_vec());
    }

    #[test]
    fn test_device_side_round_trip() {
        let frame = Frame::Modern { measured: 23.456, device_setpoint: 25.0 };
        assert_eq!(frame.encode(), b"23.46;25.00\n".to_vec());
        assert_eq!(
            decode(&frame.encode()),
            Some(Frame::Modern { measured: 23.46, device_setpoint: 25.0 })
        );

        let command = String::from_utf8(encode_setpoint(21.5)).unwrap();
        assert_eq!(parse_command(&command), Ok(DeviceCommand::SetTarget(21.5)));
    }

    #[test]
    fn test_parse_command_rejects_unknown() {
        assert!(matches!(parse_command("GET:1"), Err(DecodeError::UnknownCommand(_))));
        assert!(matches!(parse_command("SET:x"), Err(DecodeError::InvalidNumber(_))));
    }
}
