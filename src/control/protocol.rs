//! Control-plane command grammar.
//!
//! One command per datagram, whitespace separated, case-insensitive:
//!
//! ```text
//! LED <ON|OFF|TOGGLE> <pin>
//! SET <pin> <0|1>
//! ```
//!
//! Every command is answered with a single token, `OK` or `ERR`.

use std::fmt;
use std::str::FromStr;

/// Reason a command line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,
    #[error("unknown verb `{0}` (expected LED or SET)")]
    UnknownVerb(String),
    #[error("unknown LED action `{0}` (expected ON, OFF or TOGGLE)")]
    UnknownAction(String),
    #[error("{verb} takes {expected} arguments, got {found}")]
    WrongArity {
        verb: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid pin `{0}`")]
    InvalidPin(String),
    #[error("invalid value `{0}` (expected 0 or 1)")]
    InvalidValue(String),
}

/// Sub-action of the `LED` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAction {
    On,
    Off,
    Toggle,
}

impl LedAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Toggle => "TOGGLE",
        }
    }
}

/// A parsed control command.
///
/// Maps one to one onto an actuator operation. Malformed text never
/// produces a `Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Led { action: LedAction, pin: u32 },
    Set { pin: u32, value: bool },
}

impl Command {
    /// Parse one command line.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(verb) = tokens.first() else {
            return Err(ProtocolError::Empty);
        };

        if verb.eq_ignore_ascii_case("LED") {
            expect_arity("LED", &tokens)?;
            let action = parse_action(tokens[1])?;
            let pin = parse_pin(tokens[2])?;
            Ok(Self::Led { action, pin })
        } else if verb.eq_ignore_ascii_case("SET") {
            expect_arity("SET", &tokens)?;
            let pin = parse_pin(tokens[1])?;
            let value = parse_value(tokens[2])?;
            Ok(Self::Set { pin, value })
        } else {
            Err(ProtocolError::UnknownVerb((*verb).to_string()))
        }
    }

    /// Pin the command addresses.
    pub fn pin(&self) -> u32 {
        match *self {
            Self::Led { pin, .. } | Self::Set { pin, .. } => pin,
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Led { action, pin } => write!(f, "LED {} {pin}", action.as_str()),
            Self::Set { pin, value } => write!(f, "SET {pin} {}", u8::from(value)),
        }
    }
}

fn expect_arity(verb: &'static str, tokens: &[&str]) -> Result<(), ProtocolError> {
    let found = tokens.len() - 1;
    if found == 2 {
        Ok(())
    } else {
        Err(ProtocolError::WrongArity {
            verb,
            expected: 2,
            found,
        })
    }
}

fn parse_action(token: &str) -> Result<LedAction, ProtocolError> {
    match token.to_ascii_uppercase().as_str() {
        "ON" => Ok(LedAction::On),
        "OFF" => Ok(LedAction::Off),
        "TOGGLE" => Ok(LedAction::Toggle),
        _ => Err(ProtocolError::UnknownAction(token.to_string())),
    }
}

fn parse_pin(token: &str) -> Result<u32, ProtocolError> {
    // `u32::from_str` accepts a leading '+', which is not a pin number.
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidPin(token.to_string()));
    }
    token
        .parse()
        .map_err(|_| ProtocolError::InvalidPin(token.to_string()))
}

fn parse_value(token: &str) -> Result<bool, ProtocolError> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ProtocolError::InvalidValue(token.to_string())),
    }
}

/// Single-token acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Err,
}

impl Ack {
    pub const OK_BYTES: &'static [u8] = b"OK";
    pub const ERR_BYTES: &'static [u8] = b"ERR";

    /// Wire payload.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Ok => Self::OK_BYTES,
            Self::Err => Self::ERR_BYTES,
        }
    }

    pub fn from_success(ok: bool) -> Self {
        if ok { Self::Ok } else { Self::Err }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Err => f.write_str("ERR"),
        }
    }
}
