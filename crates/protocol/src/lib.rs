//! Protocol library for adk-host
//!
//! This crate defines the Android Open Accessory (AOA) v1 wire protocol as seen
//! from the USB host: request codes, the accessory identification strings and
//! their wire encoding, protocol version decoding, the raw configuration
//! descriptor walker, and the error taxonomy shared by every stage.
//!
//! Nothing here talks to a USB library. The `common` crate defines the
//! transport seam and the `host` crate drives it with `rusb`.
//!
//! # Example
//!
//! ```
//! use protocol::{AccessoryIdentification, IdentityField};
//!
//! let ident = AccessoryIdentification::default();
//!
//! // Manufacturer goes out without a NUL, everything else with one
//! let manufacturer = ident.wire_payload(IdentityField::Manufacturer);
//! let model = ident.wire_payload(IdentityField::Model);
//! assert_eq!(manufacturer.len(), ident.manufacturer.len());
//! assert_eq!(model.len(), ident.model.len() + 1);
//! ```

pub mod aoa;
pub mod classify;
pub mod descriptor;
pub mod error;
pub mod types;
pub mod version;

pub use aoa::{
    ACCESSORY_ADB_PRODUCT_ID, ACCESSORY_GET_PROTOCOL, ACCESSORY_INTERFACE,
    ACCESSORY_PRODUCT_ID, ACCESSORY_SEND_STRING, ACCESSORY_START, DEFAULT_PRODUCT_ID,
    GOOGLE_VENDOR_ID, REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT, is_accessory_product,
};
pub use classify::{ErrorKind, TransferStatus};
pub use descriptor::{DescriptorRecord, Descriptors, find_bulk_endpoints};
pub use error::{DescriptorError, IdentificationError, NegotiationError, TransferError, VersionQueryFailure};
pub use types::{AccessoryIdentification, Direction, EndpointPair, IdentityField};
pub use version::AoaVersion;
