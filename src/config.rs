//! # Configuration Module
//!
//! Settings for the two ends of the link, shared between the CLI and the
//! library.
//!
//! ## Node (device side)
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `bind_host` | `0.0.0.0` | Interface the control server binds |
//! | `control_port` | 6000 | UDP control port |
//! | `led_pins` | 17, 27 | Configured actuator pins (BCM numbering) |
//! | `poll_interval` | 1 s | Bound on each wait of the receive loop |
//! | `capture` | none | Camera stream settings when streaming |
//! | `kill_grace` | 5 s | SIGTERM to SIGKILL escalation delay |
//!
//! ## Viewer
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `server` | required | Node host, optionally `host:port` |
//! | `video_port` | 5000 | UDP port the RTP stream arrives on |
//! | `ack_timeout` | 1 s | Wait for each command's reply |
//! | `status_poll` | 100 ms | Bound on each wait for pipeline events |
//! | `join_timeout` | 2 s | Wait for the pipeline thread on exit |

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::actuator::GpioSettings;
use crate::error::{LinkError, LinkResult};
use crate::media::description::CaptureSettings;

pub const CONTROL_PORT: u16 = 6000;
pub const VIDEO_PORT: u16 = 5000;
pub const DEFAULT_LED_PINS: [u32; 2] = [17, 27];
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STATUS_POLL: Duration = Duration::from_millis(100);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Device side settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_host: String,
    pub control_port: u16,
    pub led_pins: Vec<u32>,
    pub poll_interval: Duration,
    pub gpio: GpioSettings,
    /// Stream the camera to a viewer when set
    pub capture: Option<CaptureSettings>,
    pub kill_grace: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            control_port: CONTROL_PORT,
            led_pins: DEFAULT_LED_PINS.to_vec(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            gpio: GpioSettings::default(),
            capture: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl NodeConfig {
    /// Address the control server binds.
    pub fn bind_address(&self) -> String {
        socket_address(&self.bind_host, self.control_port)
    }

    pub fn validate(&self) -> LinkResult<()> {
        if self.led_pins.is_empty() {
            return Err(LinkError::invalid_setting("led_pins", "at least one pin is required"));
        }
        if self
            .led_pins
            .iter()
            .any(|&pin| pin.checked_add(self.gpio.base).is_none())
        {
            return Err(LinkError::invalid_setting(
                "gpio.base",
                "pin number plus base does not fit a GPIO line number",
            ));
        }
        require_port("control_port", self.control_port)?;
        require_nonzero("poll_interval", self.poll_interval)?;
        require_nonzero("kill_grace", self.kill_grace)?;
        if let Some(capture) = &self.capture {
            validate_capture(capture)?;
        }
        Ok(())
    }
}

/// Viewer side settings.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Node host, `host` or `host:port`
    pub server: String,
    pub control_port: u16,
    pub video_port: u16,
    pub ack_timeout: Duration,
    pub status_poll: Duration,
    pub join_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            control_port: CONTROL_PORT,
            video_port: VIDEO_PORT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            status_poll: DEFAULT_STATUS_POLL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

impl ViewerConfig {
    /// Control endpoint of the node, using `control_port` when the server
    /// string carries no port.
    pub fn control_address(&self) -> String {
        socket_address(&self.server, self.control_port)
    }

    pub fn validate(&self) -> LinkResult<()> {
        if self.server.trim().is_empty() {
            return Err(LinkError::invalid_setting("server", "must not be empty"));
        }
        require_port("control_port", self.control_port)?;
        require_port("video_port", self.video_port)?;
        require_nonzero("ack_timeout", self.ack_timeout)?;
        require_nonzero("status_poll", self.status_poll)?;
        require_nonzero("join_timeout", self.join_timeout)?;
        Ok(())
    }
}

/// `host:port` for `host`, which may already carry a port.
///
/// Bare IPv6 addresses are bracketed.
pub fn socket_address(host: &str, default_port: u16) -> String {
    let host = host.trim();
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return SocketAddr::new(ip, default_port).to_string();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{host}:{default_port}"),
    }
}

fn validate_capture(capture: &CaptureSettings) -> LinkResult<()> {
    if capture.client_host.trim().is_empty() {
        return Err(LinkError::invalid_setting("capture.client_host", "must not be empty"));
    }
    require_port("capture.video_port", capture.video_port)?;
    for (field, value) in [
        ("capture.width", capture.width),
        ("capture.height", capture.height),
        ("capture.framerate", capture.framerate),
        ("capture.bitrate", capture.bitrate),
    ] {
        if value == 0 {
            return Err(LinkError::invalid_setting(field, "must be greater than 0"));
        }
    }
    Ok(())
}

fn require_port(field: &'static str, port: u16) -> LinkResult<()> {
    if port == 0 {
        return Err(LinkError::invalid_setting(field, "port must be greater than 0"));
    }
    Ok(())
}

fn require_nonzero(field: &'static str, value: Duration) -> LinkResult<()> {
    if value.is_zero() {
        return Err(LinkError::invalid_setting(field, "must be greater than 0"));
    }
    Ok(())
}
