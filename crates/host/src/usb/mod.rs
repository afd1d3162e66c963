//! USB subsystem
//!
//! Everything runs on the calling thread and every operation blocks:
//! - `transport`: the `rusb` implementation of the transport traits
//! - `device`: the session context that owns a handle and its claimed interface
//! - `negotiator`: the AOA handshake and re-enumeration polling
//! - `inspector`: bulk endpoint discovery from the configuration descriptor
//! - `session`: bulk reads and writes once in accessory mode

pub mod device;
pub mod inspector;
pub mod negotiator;
pub mod session;
pub mod transport;

pub use device::{DeviceSession, DeviceSummary};
pub use inspector::discover_endpoints;
pub use negotiator::{NegotiationSettings, Negotiator};
pub use session::{
    CancelToken, DiagnosticSummary, LoopbackReport, ReadReport, ReadSink, SessionSettings,
    TransferLoop,
};
pub use transport::{RusbHandle, RusbTransport, map_rusb_error};
