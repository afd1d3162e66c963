//! Common utilities for adk-host
//!
//! This crate provides the pieces shared between the host library and its
//! tests: the USB transport seam the negotiator and session are written
//! against, error handling, logging setup, and a scripted fake transport.

pub mod error;
pub mod logging;
pub mod test_utils;
pub mod transport;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::{DeviceIo, MAX_TIMEOUT, NO_TIMEOUT, Sleeper, ThreadSleeper, UsbTransport};
