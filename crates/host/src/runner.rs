//! Run orchestration
//!
//! open → negotiate → discover endpoints → transfer → teardown. Each stage
//! returns its own error; the first failure ends the run and the session is
//! dropped on the way out, releasing its interface before the handle closes.

use crate::config::{HostConfig, SessionMode};
use crate::usb::{
    CancelToken, DeviceSession, DiagnosticSummary, LoopbackReport, Negotiator, ReadSink,
    TransferLoop, discover_endpoints,
};
use common::{Sleeper, UsbTransport};
use protocol::{
    ACCESSORY_INTERFACE, AoaVersion, DescriptorError, EndpointPair, ErrorKind, NegotiationError,
    TransferError,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to open device {vendor_id:04x}:{product_id:04x}: {kind}")]
    Open {
        vendor_id: u16,
        product_id: u16,
        kind: ErrorKind,
    },

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl RunError {
    /// Transport error kind behind this failure, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RunError::Config(_) => None,
            RunError::Open { kind, .. } => Some(*kind),
            RunError::Negotiation(e) => e.kind(),
            RunError::Descriptor(DescriptorError::Read(kind)) => Some(*kind),
            RunError::Descriptor(_) => None,
            RunError::Transfer(e) => e.kind(),
        }
    }
}

/// Switches for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Device is already an accessory: open it directly and skip the handshake
    pub skip_negotiation: bool,
    pub cancel: Option<CancelToken>,
}

/// What a successful run observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// `None` when the handshake was skipped
    pub version: Option<AoaVersion>,
    pub endpoints: EndpointPair,
    pub diagnostic: Option<DiagnosticSummary>,
    pub loopback: Option<LoopbackReport>,
}

/// Run one full diagnostic against the configured device
pub fn run<T, S, K>(
    transport: &mut T,
    sleeper: &mut S,
    config: &HostConfig,
    options: RunOptions,
    sink: &mut K,
) -> Result<RunSummary, RunError>
where
    T: UsbTransport,
    S: Sleeper,
    K: ReadSink,
{
    let negotiation = config
        .negotiation_settings()
        .map_err(|e| RunError::Config(format!("{:#}", e)))?;
    let product_id = config
        .device
        .product_id()
        .map_err(|e| RunError::Config(format!("{:#}", e)))?;
    let vendor_id = negotiation.vendor_id;

    let (version, mut session) = if options.skip_negotiation {
        let accessory_product_id = negotiation.accessory_product_id;
        info!(
            "Skipping negotiation, opening accessory {:04x}:{:04x}",
            vendor_id, accessory_product_id
        );
        let mut session = open(transport, vendor_id, accessory_product_id)?;
        if !session.is_accessory() {
            warn!(
                "{:04x}:{:04x} is not a known accessory product id",
                session.vendor_id(),
                session.product_id()
            );
        }
        session
            .claim(ACCESSORY_INTERFACE)
            .map_err(|kind| NegotiationError::ClaimFailed {
                interface: ACCESSORY_INTERFACE,
                kind,
            })?;
        (None, session)
    } else {
        let mut session = open(transport, vendor_id, product_id)?;
        // Vendor requests go to EP0 and work without a claimed interface
        if let Err(kind) = session.claim(ACCESSORY_INTERFACE) {
            warn!(
                "Could not claim interface {} before negotiation: {}",
                ACCESSORY_INTERFACE, kind
            );
        }

        let mut negotiator = Negotiator::new(transport, sleeper, negotiation);
        let (version, accessory) = negotiator.negotiate(session, &config.accessory)?;
        (Some(version), accessory)
    };

    let endpoints = discover_endpoints(&mut session, config.session.descriptor_buffer_len)?;

    let mut transfers = TransferLoop::new(&mut session, endpoints, config.session_settings());
    if let Some(cancel) = options.cancel {
        transfers = transfers.with_cancel(cancel);
    }

    let (diagnostic, loopback) = match config.session.mode {
        SessionMode::Diagnostic => (Some(transfers.run_diagnostic(sink)?), None),
        SessionMode::Loopback => (None, Some(transfers.run_loopback()?)),
    };

    session.close();
    info!("Session finished");

    Ok(RunSummary {
        version,
        endpoints,
        diagnostic,
        loopback,
    })
}

fn open<T: UsbTransport>(
    transport: &mut T,
    vendor_id: u16,
    product_id: u16,
) -> Result<DeviceSession<T::Handle>, RunError> {
    DeviceSession::open(transport, vendor_id, product_id).map_err(|kind| RunError::Open {
        vendor_id,
        product_id,
        kind,
    })
}
