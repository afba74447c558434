//! # Capture Module
//!
//! Launches the camera capture/encode command line on the node.

#[cfg(unix)]
pub mod process;

#[cfg(unix)]
pub use process::CaptureProcess;
