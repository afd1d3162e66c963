//! Stage error types
//!
//! Every stage of a run returns its own typed error. All of them are terminal
//! for the run: the caller tears the device down and reports.

use crate::classify::ErrorKind;
use crate::types::{Direction, IdentityField};
use thiserror::Error;

/// Why the protocol version query failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VersionQueryFailure {
    #[error("transport error: {0}")]
    Transport(ErrorKind),

    #[error("response too short: {received} bytes")]
    ShortResponse { received: usize },
}

/// Accessory handshake errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("Protocol version query failed: {0}")]
    VersionQueryFailed(VersionQueryFailure),

    #[error("Sending identification {field} failed: {kind}")]
    IdentificationFailed { field: IdentityField, kind: ErrorKind },

    #[error("Start accessory request failed: {0}")]
    ModeSwitchFailed(ErrorKind),

    #[error("Accessory did not re-enumerate after {attempts} attempts")]
    ReenumerationTimeout { attempts: u32 },

    #[error("Failed to claim interface {interface} in accessory mode: {kind}")]
    ClaimFailed { interface: u8, kind: ErrorKind },

    #[error("Invalid identification: {0}")]
    InvalidIdentification(#[from] IdentificationError),
}

impl NegotiationError {
    /// Transport error kind behind this failure, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            NegotiationError::VersionQueryFailed(VersionQueryFailure::Transport(kind))
            | NegotiationError::ModeSwitchFailed(kind) => Some(*kind),
            NegotiationError::IdentificationFailed { kind, .. }
            | NegotiationError::ClaimFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Identification strings that cannot be sent as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentificationError {
    #[error("{0} contains a NUL byte")]
    InteriorNul(IdentityField),

    #[error("{field} is {len} bytes long")]
    TooLong { field: IdentityField, len: usize },
}

/// Configuration descriptor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("Failed to read configuration descriptor: {0}")]
    Read(ErrorKind),

    #[error("No interface")]
    NoInterface,

    #[error("No endpoints: interface declares {declared}")]
    NoEndpoints { declared: u8 },

    #[error("No bulk {0} endpoint on the interface")]
    MissingBulkEndpoint(Direction),

    #[error("Malformed descriptor at offset {offset}")]
    Malformed { offset: usize },
}

/// Bulk session errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("Bulk read ({step}) error: {kind}")]
    Read { step: &'static str, kind: ErrorKind },

    #[error("Bulk write ({step}) error: {kind}")]
    Write { step: &'static str, kind: ErrorKind },

    #[error("Bulk transfer short read: expected {expected}, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Session deadline exceeded")]
    DeadlineExceeded,
}

impl TransferError {
    /// Transport error kind behind this failure, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TransferError::Read { kind, .. } | TransferError::Write { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
