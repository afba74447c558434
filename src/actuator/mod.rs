//! # Actuator Controller
//!
//! Authoritative state for a fixed set of digital output pins (LEDs).
//!
//! The pin set is closed: it is given at construction and never changes.
//! Operations on any other pin fail without touching state. Logical state is
//! updated before the backend is driven, and a failed hardware write is
//! logged but not rolled back (indicator LEDs, best effort).
//!
//! ```rust
//! use camlink::actuator::{ActuatorController, BackingMode};
//!
//! let leds = ActuatorController::mock(&[17, 27]);
//! assert_eq!(leds.mode(), BackingMode::Mock);
//! leds.set(17, true).unwrap();
//! assert_eq!(leds.level(17), Some(true));
//! assert!(leds.toggle(99).is_err());
//! ```

pub mod gpio;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::{LinkError, LinkResult};
use gpio::{GpioBackend, MockGpio, SysfsGpio};

/// Whether levels reach a physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingMode {
    Hardware,
    Mock,
}

impl fmt::Display for BackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => f.write_str("hardware"),
            Self::Mock => f.write_str("mock"),
        }
    }
}

/// Snapshot of one actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub pin: u32,
    pub level: bool,
    pub mode: BackingMode,
}

/// Where to look for the GPIO facility.
#[derive(Debug, Clone)]
pub struct GpioSettings {
    /// sysfs root, normally `/sys/class/gpio`
    pub sysfs_root: PathBuf,
    /// Offset added to every pin number
    pub base: u32,
    /// Skip probing and use mock mode
    pub force_mock: bool,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(gpio::SYSFS_GPIO_ROOT),
            base: 0,
            force_mock: false,
        }
    }
}

struct Inner {
    levels: BTreeMap<u32, bool>,
    backend: Box<dyn GpioBackend>,
    released: bool,
}

/// Race-free owner of actuator state.
pub struct ActuatorController {
    mode: BackingMode,
    inner: Mutex<Inner>,
}

impl ActuatorController {
    /// Open the controller, preferring hardware.
    ///
    /// Falls back to mock mode, logging once, when the facility is missing
    /// or any configured line cannot be set up.
    pub fn open(pins: &[u32], settings: &GpioSettings) -> Self {
        if settings.force_mock {
            tracing::info!("GPIO mock mode forced by configuration");
            return Self::mock(pins);
        }

        let Some(sysfs) = SysfsGpio::probe(&settings.sysfs_root, settings.base) else {
            let err = LinkError::ResourceUnavailable {
                facility: "GPIO".into(),
                reason: format!("{} not found", settings.sysfs_root.join("export").display()),
            };
            tracing::warn!("{err}; using mock mode (hardware will not change)");
            return Self::mock(pins);
        };

        match Self::with_backend(pins, Box::new(sysfs), BackingMode::Hardware) {
            Ok(controller) => controller,
            Err(err) => {
                tracing::warn!("{err}; using mock mode (hardware will not change)");
                Self::mock(pins)
            }
        }
    }

    /// Controller that never drives hardware.
    pub fn mock(pins: &[u32]) -> Self {
        let levels = pins.iter().map(|&pin| (pin, false)).collect();
        Self {
            mode: BackingMode::Mock,
            inner: Mutex::new(Inner {
                levels,
                backend: Box::new(MockGpio),
                released: false,
            }),
        }
    }

    /// Controller on an explicit backend. Every pin is set up low.
    ///
    /// On a setup failure the lines already configured are released and
    /// `ResourceUnavailable` is returned.
    pub fn with_backend(
        pins: &[u32],
        mut backend: Box<dyn GpioBackend>,
        mode: BackingMode,
    ) -> LinkResult<Self> {
        let levels: BTreeMap<u32, bool> = pins.iter().map(|&pin| (pin, false)).collect();
        let mut ready = Vec::with_capacity(levels.len());
        for &pin in levels.keys() {
            if let Err(e) = backend.setup(pin, false) {
                let _ = backend.cleanup(&ready);
                return Err(LinkError::ResourceUnavailable {
                    facility: format!("GPIO ({})", backend.name()),
                    reason: format!("pin {pin}: {e}"),
                });
            }
            ready.push(pin);
        }
        tracing::info!(backend = backend.name(), %mode, pins = ?ready, "GPIO configured");
        Ok(Self {
            mode,
            inner: Mutex::new(Inner {
                levels,
                backend,
                released: false,
            }),
        })
    }

    pub fn mode(&self) -> BackingMode {
        self.mode
    }

    /// Set `pin` to `value`.
    pub fn set(&self, pin: u32, value: bool) -> LinkResult<()> {
        let mut inner = self.inner.lock();
        Self::apply(&mut inner, pin, value)
    }

    /// Invert `pin`, returning the new level.
    pub fn toggle(&self, pin: u32) -> LinkResult<bool> {
        let mut inner = self.inner.lock();
        let current = *inner
            .levels
            .get(&pin)
            .ok_or(LinkError::UnconfiguredPin(pin))?;
        Self::apply(&mut inner, pin, !current)?;
        Ok(!current)
    }

    fn apply(inner: &mut Inner, pin: u32, value: bool) -> LinkResult<()> {
        if inner.released {
            return Err(LinkError::ActuatorReleased);
        }
        let Some(level) = inner.levels.get_mut(&pin) else {
            tracing::warn!(pin, "pin is not in the configured LED set");
            return Err(LinkError::UnconfiguredPin(pin));
        };
        *level = value;
        if let Err(e) = inner.backend.output(pin, value) {
            tracing::warn!(pin, value, "GPIO write failed, keeping logical state: {e}");
        }
        tracing::info!(pin, "LED {}", if value { "ON" } else { "OFF" });
        Ok(())
    }

    /// Current level, `None` for unconfigured pins.
    pub fn level(&self, pin: u32) -> Option<bool> {
        self.inner.lock().levels.get(&pin).copied()
    }

    /// State of every configured pin, ordered by pin number.
    pub fn pins(&self) -> Vec<PinState> {
        self.inner
            .lock()
            .levels
            .iter()
            .map(|(&pin, &level)| PinState {
                pin,
                level,
                mode: self.mode,
            })
            .collect()
    }

    pub fn is_configured(&self, pin: u32) -> bool {
        self.inner.lock().levels.contains_key(&pin)
    }

    /// Release the lines. Later `set`/`toggle` calls fail with
    /// `ActuatorReleased`. Calling it again is a no-op. Dropping the
    /// controller releases the lines as well.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.released {
            return;
        }
        inner.released = true;
        let pins: Vec<u32> = inner.levels.keys().copied().collect();
        match inner.backend.cleanup(&pins) {
            Ok(()) => tracing::info!("GPIO released"),
            Err(e) => tracing::warn!("GPIO cleanup incomplete: {e}"),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().released
    }
}

impl Drop for ActuatorController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ActuatorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuatorController")
            .field("mode", &self.mode)
            .field("pins", &self.pins())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    /// Backend whose writes can be made to fail.
    struct FlakyGpio {
        writes: Arc<Mutex<Vec<(u32, bool)>>>,
        fail_output: bool,
        fail_setup_on: Option<u32>,
        cleaned: Arc<Mutex<Vec<u32>>>,
    }

    impl FlakyGpio {
        fn new() -> Self {
            Self {
                writes: Arc::default(),
                fail_output: false,
                fail_setup_on: None,
                cleaned: Arc::default(),
            }
        }
    }

    impl GpioBackend for FlakyGpio {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn setup(&mut self, pin: u32, _initial: bool) -> io::Result<()> {
            if self.fail_setup_on == Some(pin) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            Ok(())
        }

        fn output(&mut self, pin: u32, level: bool) -> io::Result<()> {
            if self.fail_output {
                return Err(io::Error::other("line stuck"));
            }
            self.writes.lock().push((pin, level));
            Ok(())
        }

        fn cleanup(&mut self, pins: &[u32]) -> io::Result<()> {
            self.cleaned.lock().extend_from_slice(pins);
            Ok(())
        }
    }

    #[test]
    fn test_pins_start_low() {
        let leds = ActuatorController::mock(&[27, 17, 17]);
        let states = leds.pins();
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| !s.level && s.mode == BackingMode::Mock));
        assert_eq!(states[0].pin, 17);
    }

    #[test]
    fn test_set_and_toggle() {
        let leds = ActuatorController::mock(&[17, 27]);
        leds.set(17, true).unwrap();
        assert_eq!(leds.level(17), Some(true));
        assert_eq!(leds.toggle(27).unwrap(), true);
        assert_eq!(leds.toggle(27).unwrap(), false);
        assert_eq!(leds.level(27), Some(false));
    }

    #[test]
    fn test_unconfigured_pin_is_rejected() {
        let leds = ActuatorController::mock(&[17]);
        assert!(matches!(leds.set(99, true), Err(LinkError::UnconfiguredPin(99))));
        assert!(matches!(leds.toggle(99), Err(LinkError::UnconfiguredPin(99))));
        assert_eq!(leds.level(99), None);
        assert_eq!(leds.level(17), Some(false));
    }

    #[test]
    fn test_hardware_failure_keeps_logical_state() {
        let mut gpio = FlakyGpio::new();
        gpio.fail_output = true;
        let leds =
            ActuatorController::with_backend(&[17], Box::new(gpio), BackingMode::Hardware).unwrap();
        leds.set(17, true).unwrap();
        assert_eq!(leds.level(17), Some(true));
    }

    #[test]
    fn test_backend_receives_writes() {
        let gpio = FlakyGpio::new();
        let writes = Arc::clone(&gpio.writes);
        let leds =
            ActuatorController::with_backend(&[17, 27], Box::new(gpio), BackingMode::Hardware)
                .unwrap();
        leds.set(17, true).unwrap();
        leds.toggle(27).unwrap();
        assert_eq!(*writes.lock(), vec![(17, true), (27, true)]);
    }

    #[test]
    fn test_setup_failure_releases_ready_lines() {
        let mut gpio = FlakyGpio::new();
        gpio.fail_setup_on = Some(27);
        let cleaned = Arc::clone(&gpio.cleaned);
        let result = ActuatorController::with_backend(&[17, 27], Box::new(gpio), BackingMode::Hardware);
        assert!(matches!(result, Err(LinkError::ResourceUnavailable { .. })));
        assert_eq!(*cleaned.lock(), vec![17]);
    }

    #[test]
    fn test_shutdown_blocks_further_changes() {
        let gpio = FlakyGpio::new();
        let cleaned = Arc::clone(&gpio.cleaned);
        let leds =
            ActuatorController::with_backend(&[17], Box::new(gpio), BackingMode::Hardware).unwrap();
        leds.shutdown();
        leds.shutdown();
        assert_eq!(*cleaned.lock(), vec![17]);
        assert!(leds.is_shut_down());
        assert!(matches!(leds.set(17, true), Err(LinkError::ActuatorReleased)));
        assert!(matches!(leds.toggle(17), Err(LinkError::ActuatorReleased)));
        assert_eq!(leds.level(17), Some(false));
    }

    #[test]
    fn test_drop_releases_lines_once() {
        let gpio = FlakyGpio::new();
        let cleaned = Arc::clone(&gpio.cleaned);
        let leds =
            ActuatorController::with_backend(&[17, 27], Box::new(gpio), BackingMode::Hardware)
                .unwrap();
        leds.set(17, true).unwrap();
        drop(leds);
        assert_eq!(*cleaned.lock(), vec![17, 27]);

        let gpio = FlakyGpio::new();
        let cleaned = Arc::clone(&gpio.cleaned);
        let leds =
            ActuatorController::with_backend(&[17], Box::new(gpio), BackingMode::Hardware).unwrap();
        leds.shutdown();
        drop(leds);
        assert_eq!(*cleaned.lock(), vec![17]);
    }

    #[test]
    fn test_open_without_facility_falls_back_to_mock() {
        let dir = tempfile::tempdir().unwrap();
        let settings = GpioSettings {
            sysfs_root: dir.path().to_path_buf(),
            ..GpioSettings::default()
        };
        let leds = ActuatorController::open(&[17], &settings);
        assert_eq!(leds.mode(), BackingMode::Mock);
        leds.set(17, true).unwrap();
    }
}
