//! GPIO facility backends.
//!
//! `SysfsGpio` drives lines through the Linux sysfs interface
//! (`/sys/class/gpio`). `MockGpio` accepts everything and only logs, so the
//! controller keeps working on machines without the facility.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Output-line operations the actuator controller needs.
pub trait GpioBackend: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Configure `pin` as an output driven to `initial`.
    fn setup(&mut self, pin: u32, initial: bool) -> io::Result<()>;

    /// Drive `pin` to `level`.
    fn output(&mut self, pin: u32, level: bool) -> io::Result<()>;

    /// Release every listed line.
    fn cleanup(&mut self, pins: &[u32]) -> io::Result<()>;
}

/// Linux sysfs GPIO backend.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
    base: u32,
}

impl SysfsGpio {
    /// Returns a backend when `<root>/export` exists.
    ///
    /// `base` is added to every pin number; newer kernels number the SoC
    /// lines from a non-zero chip base.
    pub fn probe(root: impl Into<PathBuf>, base: u32) -> Option<Self> {
        let root = root.into();
        root.join("export").exists().then_some(Self { root, base })
    }

    fn line(&self, pin: u32) -> io::Result<u32> {
        self.base.checked_add(pin).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pin {pin} with base {} is out of range", self.base),
            )
        })
    }

    fn line_dir(&self, pin: u32) -> io::Result<PathBuf> {
        Ok(self.root.join(format!("gpio{}", self.line(pin)?)))
    }

    fn write(path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    }
}

impl GpioBackend for SysfsGpio {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn setup(&mut self, pin: u32, initial: bool) -> io::Result<()> {
        let line_dir = self.line_dir(pin)?;
        if !line_dir.exists() {
            match fs::write(self.root.join("export"), self.line(pin)?.to_string()) {
                Ok(()) => {}
                // EBUSY: already exported by someone else
                Err(e) if e.raw_os_error() == Some(16) => {}
                Err(e) => return Err(e),
            }
        }
        // "high"/"low" set the direction and the initial level atomically.
        let direction = if initial { "high" } else { "low" };
        Self::write(&line_dir.join("direction"), direction)
    }

    fn output(&mut self, pin: u32, level: bool) -> io::Result<()> {
        Self::write(
            &self.line_dir(pin)?.join("value"),
            if level { "1" } else { "0" },
        )
    }

    fn cleanup(&mut self, pins: &[u32]) -> io::Result<()> {
        let mut first_error = None;
        for &pin in pins {
            let result = self.line(pin).and_then(|line| {
                Self::write(&self.line_dir(pin)?.join("direction"), "in")?;
                Self::write(&self.root.join("unexport"), &line.to_string())
            });
            if let Err(e) = result {
                tracing::warn!(pin, "failed to release GPIO line: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Backend used when no GPIO facility is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockGpio;

impl GpioBackend for MockGpio {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn setup(&mut self, pin: u32, initial: bool) -> io::Result<()> {
        tracing::debug!(pin, initial, "mock GPIO setup");
        Ok(())
    }

    fn output(&mut self, pin: u32, level: bool) -> io::Result<()> {
        tracing::debug!(pin, level, "mock GPIO output");
        Ok(())
    }

    fn cleanup(&mut self, pins: &[u32]) -> io::Result<()> {
        tracing::debug!(?pins, "mock GPIO cleanup");
        Ok(())
    }
}
