//! adk-host library
//!
//! Drives an Android device through the Android Open Accessory handshake and
//! runs a bulk transfer session against it once it re-enumerates as an
//! accessory. The `adk-host` binary is a thin CLI over [`runner::run`].

pub mod config;
pub mod runner;
pub mod usb;

pub use config::{HostConfig, SessionMode};
pub use runner::{RunError, RunOptions, RunSummary, run};
