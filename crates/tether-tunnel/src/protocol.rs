// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The tunnel's line-oriented wire protocol.
//!
//! Requests are single text lines. The only recognized command is
//! `READ:<id>`; anything else is echoed back as unrecognized. Responses
//! keep the legacy wire strings of the plant-floor clients verbatim, so
//! existing tooling keeps working against this implementation:
//!
//! | Input             | Response                                |
//! |-------------------|-----------------------------------------|
//! | `READ:<id>`       | `Valor leído: <value>\n`                |
//! | anything else     | `Comando no reconocido: <input>\n`      |
//! | backend failure   | `Error procesando la solicitud: <msg>\n`|

/// Default tunnel listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 5050;

// =============================================================================
// Command
// =============================================================================

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read the value behind `id` from the backend.
    Read {
        /// Backend-specific value identifier.
        id: String,
    },
}

/// A request line that did not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand {
    /// The offending input, as received (trimmed of the line ending).
    pub input: String,
}

/// Parses one request line.
///
/// The grammar is deliberately strict: the verb is case-sensitive and the
/// id must be non-empty. Surrounding whitespace on the line is tolerated
/// because interactive clients send `\r\n`.
pub fn parse_command(line: &str) -> Result<Command, UnknownCommand> {
    let trimmed = line.trim();

    if let Some(id) = trimmed.strip_prefix("READ:") {
        if !id.is_empty() {
            return Ok(Command::Read { id: id.to_string() });
        }
    }

    Err(UnknownCommand {
        input: trimmed.to_string(),
    })
}

// =============================================================================
// Responses
// =============================================================================

/// Formats a successful read response.
pub fn format_value(value: &str) -> String {
    format!("Valor leído: {}\n", value)
}

/// Formats the response to an unrecognized command.
pub fn format_unknown(input: &str) -> String {
    format!("Comando no reconocido: {}\n", input)
}

/// Formats the response to a backend failure.
pub fn format_backend_error(message: &str) -> String {
    format!("Error procesando la solicitud: {}\n", message)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read() {
        assert_eq!(
            parse_command("READ:42"),
            Ok(Command::Read { id: "42".into() })
        );
        assert_eq!(
            parse_command("READ:ns=2;s=Tank.Level\r\n"),
            Ok(Command::Read {
                id: "ns=2;s=Tank.Level".into()
            })
        );
    }

    #[test]
    fn test_parse_rejects_everything_else() {
        for input in ["read:42", "READ:", "WRITE:1=2", "", "PING", "READ"] {
            assert!(parse_command(input).is_err(), "should reject {:?}", input);
        }
    }

    #[test]
    fn test_unknown_preserves_input() {
        let err = parse_command("WRITE:1=2\r\n").unwrap_err();
        assert_eq!(err.input, "WRITE:1=2");
    }

    #[test]
    fn test_response_wire_format() {
        assert_eq!(format_value("7"), "Valor leído: 7\n");
        assert_eq!(
            format_unknown("WRITE:1=2"),
            "Comando no reconocido: WRITE:1=2\n"
        );
        assert_eq!(
            format_backend_error("session closed"),
            "Error procesando la solicitud: session closed\n"
        );
    }
}
