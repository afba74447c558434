//! # Control Plane
//!
//! Text commands over UDP, one per datagram, each answered by `OK` or `ERR`.
//!
//! - [`protocol`]: command grammar and acknowledgment tokens
//! - [`server`]: receive loop on the device, dispatching to the actuators
//! - [`client`]: one-shot sender with a bounded wait for the reply
//! - [`console`]: interactive shorthand typed on the viewer

pub mod client;
pub mod console;
pub mod protocol;
pub mod server;

pub use client::{ControlClient, Delivery};
pub use protocol::{Ack, Command, LedAction, ProtocolError};
pub use server::ControlServer;

use crate::actuator::ActuatorController;
use crate::error::LinkResult;

/// Apply a parsed command to the actuators.
pub fn dispatch(actuators: &ActuatorController, command: &Command) -> LinkResult<()> {
    match *command {
        Command::Led {
            action: LedAction::On,
            pin,
        } => actuators.set(pin, true),
        Command::Led {
            action: LedAction::Off,
            pin,
        } => actuators.set(pin, false),
        Command::Led {
            action: LedAction::Toggle,
            pin,
        } => actuators.toggle(pin).map(|_| ()),
        Command::Set { pin, value } => actuators.set(pin, value),
    }
}

/// Parse and apply one datagram, producing its acknowledgment.
///
/// Malformed text and unconfigured pins both answer `ERR` without touching
/// any pin.
pub fn handle_datagram(actuators: &ActuatorController, payload: &[u8]) -> Ack {
    let text = String::from_utf8_lossy(payload);
    let result = Command::parse(text.trim())
        .map_err(Into::into)
        .and_then(|command| dispatch(actuators, &command));
    match result {
        Ok(()) => Ack::Ok,
        Err(e) => {
            tracing::debug!(command = %text.trim(), "command rejected: {e}");
            Ack::Err
        }
    }
}
