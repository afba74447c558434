//! Interactive console shorthand on the viewer.
//!
//! The operator types `on 17` and the console sends `LED ON 17`. The wire
//! command is validated by the server, not here.

use std::path::PathBuf;

pub const USAGE: &str = "\
commands:
  on <pin>          turn an LED on
  off <pin>         turn an LED off
  toggle <pin>      invert an LED
  set <pin> <0|1>   set a pin
  save [path]       write the latest frame as PNG
  quit              leave";

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Wire command to send
    Send(String),
    /// Save the latest frame, to the default file name when `None`
    Save(Option<PathBuf>),
    Quit,
    Empty,
    Invalid,
}

impl ConsoleInput {
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Self::Empty;
        };

        match (first.to_ascii_lowercase().as_str(), &tokens[1..]) {
            ("on" | "off" | "toggle", [pin]) => {
                Self::Send(format!("LED {} {pin}", first.to_ascii_uppercase()))
            }
            ("set", [pin, value]) => Self::Send(format!("SET {pin} {value}")),
            ("led", [action, pin]) => {
                Self::Send(format!("LED {} {pin}", action.to_ascii_uppercase()))
            }
            ("save", []) => Self::Save(None),
            ("save", [path]) => Self::Save(Some(PathBuf::from(path))),
            ("quit" | "exit", []) => Self::Quit,
            _ => Self::Invalid,
        }
    }
}
