//! # camlink
//!
//! Camera stream supervision and LED control between a capture node and a
//! remote viewer.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `session`: pipeline supervision (start, watch status events, stop)
//! - `media`: the media framework seam and pipeline descriptions
//! - `core`: the latest-frame cache and PNG snapshots
//! - `actuator`: authoritative pin state over sysfs GPIO or a mock
//! - `control`: the UDP command protocol, server, client and console
//! - `capture`: the node's capture process launcher
//! - `config`: settings and their validation
//! - `error`: the library error type
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use camlink::actuator::ActuatorController;
//! use camlink::control::{ControlClient, ControlServer, Delivery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let leds = Arc::new(ActuatorController::mock(&[17, 27]));
//! let server = ControlServer::bind("127.0.0.1:6000", leds, Duration::from_secs(1)).await?;
//!
//! let client = ControlClient::new("127.0.0.1:6000");
//! let delivery = client.send("LED ON 17", Duration::from_secs(1)).await;
//! assert_eq!(delivery, Delivery::Acknowledged);
//!
//! server.stop();
//! server.join(Duration::from_secs(2)).await;
//! # Ok(())
//! # }
//! ```

pub mod actuator;
pub mod capture;
pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod media;
pub mod session;

/// Re-export error types for convenience
pub use error::{ErrorSeverity, LinkError, LinkResult, Recoverable};

pub use actuator::{ActuatorController, BackingMode, PinState};
pub use control::{Ack, Command, ControlClient, ControlServer, Delivery};
pub use core::{Frame, FrameCache, FrameSlot, PixelFormat};
pub use session::{PipelineSupervisor, SessionError, SessionState};
