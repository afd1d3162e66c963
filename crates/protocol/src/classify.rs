//! Error classifier
//!
//! Maps libusb error codes and transfer completion statuses onto closed
//! enumerations. Both mappings are total: anything undefined lands on
//! [`ErrorKind::Unknown`] or [`TransferStatus::UnknownStatus`].
//!
//! The classifier never retries anything. Retry policy belongs to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport error kind (libusb `LIBUSB_ERROR_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum ErrorKind {
    #[error("input/output error")]
    Io,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("access denied")]
    AccessDenied,
    #[error("no such device")]
    NoDevice,
    #[error("entity not found")]
    NotFound,
    #[error("resource busy")]
    Busy,
    #[error("operation timed out")]
    Timeout,
    #[error("overflow")]
    Overflow,
    #[error("pipe error")]
    Pipe,
    #[error("system call interrupted")]
    Interrupted,
    #[error("insufficient memory")]
    OutOfMemory,
    #[error("operation not supported")]
    NotSupported,
    #[error("other error")]
    Other,
    #[error("unknown error")]
    Unknown,
}

impl ErrorKind {
    /// Every kind with a libusb code, in code order
    pub const DEFINED: [ErrorKind; 13] = [
        ErrorKind::Io,
        ErrorKind::InvalidParameter,
        ErrorKind::AccessDenied,
        ErrorKind::NoDevice,
        ErrorKind::NotFound,
        ErrorKind::Busy,
        ErrorKind::Timeout,
        ErrorKind::Overflow,
        ErrorKind::Pipe,
        ErrorKind::Interrupted,
        ErrorKind::OutOfMemory,
        ErrorKind::NotSupported,
        ErrorKind::Other,
    ];

    /// Classify a raw libusb error code
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => ErrorKind::Io,
            -2 => ErrorKind::InvalidParameter,
            -3 => ErrorKind::AccessDenied,
            -4 => ErrorKind::NoDevice,
            -5 => ErrorKind::NotFound,
            -6 => ErrorKind::Busy,
            -7 => ErrorKind::Timeout,
            -8 => ErrorKind::Overflow,
            -9 => ErrorKind::Pipe,
            -10 => ErrorKind::Interrupted,
            -11 => ErrorKind::OutOfMemory,
            -12 => ErrorKind::NotSupported,
            -99 => ErrorKind::Other,
            _ => ErrorKind::Unknown,
        }
    }

    /// libusb code for this kind, None for [`ErrorKind::Unknown`]
    pub fn code(self) -> Option<i32> {
        match self {
            ErrorKind::Io => Some(-1),
            ErrorKind::InvalidParameter => Some(-2),
            ErrorKind::AccessDenied => Some(-3),
            ErrorKind::NoDevice => Some(-4),
            ErrorKind::NotFound => Some(-5),
            ErrorKind::Busy => Some(-6),
            ErrorKind::Timeout => Some(-7),
            ErrorKind::Overflow => Some(-8),
            ErrorKind::Pipe => Some(-9),
            ErrorKind::Interrupted => Some(-10),
            ErrorKind::OutOfMemory => Some(-11),
            ErrorKind::NotSupported => Some(-12),
            ErrorKind::Other => Some(-99),
            ErrorKind::Unknown => None,
        }
    }

    /// libusb constant name
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Io => "LIBUSB_ERROR_IO",
            ErrorKind::InvalidParameter => "LIBUSB_ERROR_INVALID_PARAM",
            ErrorKind::AccessDenied => "LIBUSB_ERROR_ACCESS",
            ErrorKind::NoDevice => "LIBUSB_ERROR_NO_DEVICE",
            ErrorKind::NotFound => "LIBUSB_ERROR_NOT_FOUND",
            ErrorKind::Busy => "LIBUSB_ERROR_BUSY",
            ErrorKind::Timeout => "LIBUSB_ERROR_TIMEOUT",
            ErrorKind::Overflow => "LIBUSB_ERROR_OVERFLOW",
            ErrorKind::Pipe => "LIBUSB_ERROR_PIPE",
            ErrorKind::Interrupted => "LIBUSB_ERROR_INTERRUPTED",
            ErrorKind::OutOfMemory => "LIBUSB_ERROR_NO_MEM",
            ErrorKind::NotSupported => "LIBUSB_ERROR_NOT_SUPPORTED",
            ErrorKind::Other => "LIBUSB_ERROR_OTHER",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Long form used in diagnostic output
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Io => "Input/output error.",
            ErrorKind::InvalidParameter => "Invalid parameter.",
            ErrorKind::AccessDenied => "Access denied (insufficient permissions).",
            ErrorKind::NoDevice => "No such device (it may have been disconnected).",
            ErrorKind::NotFound => "Entity not found.",
            ErrorKind::Busy => "Resource busy.",
            ErrorKind::Timeout => "Operation timed out.",
            ErrorKind::Overflow => "Overflow.",
            ErrorKind::Pipe => "Pipe error.",
            ErrorKind::Interrupted => "System call interrupted (perhaps due to signal).",
            ErrorKind::OutOfMemory => "Insufficient memory.",
            ErrorKind::NotSupported => {
                "Operation not supported or unimplemented on this platform."
            }
            ErrorKind::Other => "Other error.",
            ErrorKind::Unknown => "Unknown error.",
        }
    }
}

/// Asynchronous transfer completion status (libusb `LIBUSB_TRANSFER_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Completed,
    TransferError,
    TimedOut,
    Cancelled,
    Stalled,
    DeviceGone,
    Overflow,
    UnknownStatus,
}

impl TransferStatus {
    pub const DEFINED: [TransferStatus; 7] = [
        TransferStatus::Completed,
        TransferStatus::TransferError,
        TransferStatus::TimedOut,
        TransferStatus::Cancelled,
        TransferStatus::Stalled,
        TransferStatus::DeviceGone,
        TransferStatus::Overflow,
    ];

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => TransferStatus::Completed,
            1 => TransferStatus::TransferError,
            2 => TransferStatus::TimedOut,
            3 => TransferStatus::Cancelled,
            4 => TransferStatus::Stalled,
            5 => TransferStatus::DeviceGone,
            6 => TransferStatus::Overflow,
            _ => TransferStatus::UnknownStatus,
        }
    }

    pub fn code(self) -> Option<i32> {
        match self {
            TransferStatus::Completed => Some(0),
            TransferStatus::TransferError => Some(1),
            TransferStatus::TimedOut => Some(2),
            TransferStatus::Cancelled => Some(3),
            TransferStatus::Stalled => Some(4),
            TransferStatus::DeviceGone => Some(5),
            TransferStatus::Overflow => Some(6),
            TransferStatus::UnknownStatus => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == TransferStatus::Completed
    }

    pub fn description(self) -> &'static str {
        match self {
            TransferStatus::Completed => "Transfer completed.",
            TransferStatus::TransferError => "Transfer failed.",
            TransferStatus::TimedOut => "Transfer timed out.",
            TransferStatus::Cancelled => "Transfer was cancelled.",
            TransferStatus::Stalled => {
                "Halt condition detected (endpoint stalled), or control request not supported."
            }
            TransferStatus::DeviceGone => "Device was disconnected.",
            TransferStatus::Overflow => "Device sent more data than requested.",
            TransferStatus::UnknownStatus => "Unknown transfer status.",
        }
    }
}
