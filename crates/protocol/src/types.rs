//! Accessory identification and endpoint types
//!
//! The device binds each identification control transfer to a field by its
//! `wIndex`, so the field order here is part of the wire protocol.

use crate::error::IdentificationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identification field, in wire index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityField {
    /// Index 0
    Manufacturer,
    /// Index 1
    Model,
    /// Index 2
    Description,
    /// Index 3
    Version,
    /// Index 4
    Uri,
    /// Index 5
    Serial,
}

impl IdentityField {
    /// All fields in the order they must be sent
    pub const ALL: [IdentityField; 6] = [
        IdentityField::Manufacturer,
        IdentityField::Model,
        IdentityField::Description,
        IdentityField::Version,
        IdentityField::Uri,
        IdentityField::Serial,
    ];

    /// Value used as `wIndex` of the send-string request
    pub fn index(self) -> u16 {
        match self {
            IdentityField::Manufacturer => 0,
            IdentityField::Model => 1,
            IdentityField::Description => 2,
            IdentityField::Version => 3,
            IdentityField::Uri => 4,
            IdentityField::Serial => 5,
        }
    }

    /// Every field except the manufacturer goes out with its trailing NUL
    pub fn is_nul_terminated(self) -> bool {
        !matches!(self, IdentityField::Manufacturer)
    }

    pub fn name(self) -> &'static str {
        match self {
            IdentityField::Manufacturer => "manufacturer",
            IdentityField::Model => "model",
            IdentityField::Description => "description",
            IdentityField::Version => "version",
            IdentityField::Uri => "uri",
            IdentityField::Serial => "serial",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (index {})", self.name(), self.index())
    }
}

/// Strings the host announces itself with during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryIdentification {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    pub serial: String,
}

impl Default for AccessoryIdentification {
    fn default() -> Self {
        Self {
            manufacturer: "adk-host".to_string(),
            model: "adk-host".to_string(),
            description: "AOA diagnostic host".to_string(),
            version: "1.0".to_string(),
            uri: "https://github.com/adk-host/adk-host".to_string(),
            serial: "0000000001".to_string(),
        }
    }
}

impl AccessoryIdentification {
    /// Longest string that still fits a control transfer with its NUL
    pub const MAX_FIELD_LEN: usize = u16::MAX as usize - 1;

    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::Manufacturer => &self.manufacturer,
            IdentityField::Model => &self.model,
            IdentityField::Description => &self.description,
            IdentityField::Version => &self.version,
            IdentityField::Uri => &self.uri,
            IdentityField::Serial => &self.serial,
        }
    }

    /// Bytes carried by the send-string request for `field`
    pub fn wire_payload(&self, field: IdentityField) -> Vec<u8> {
        let value = self.field(field);
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        if field.is_nul_terminated() {
            payload.push(0);
        }
        payload
    }

    /// All six payloads in wire order
    pub fn payloads(&self) -> impl Iterator<Item = (IdentityField, Vec<u8>)> + '_ {
        IdentityField::ALL
            .into_iter()
            .map(move |field| (field, self.wire_payload(field)))
    }

    /// Reject strings the device would truncate or that cannot be sent
    pub fn validate(&self) -> Result<(), IdentificationError> {
        for field in IdentityField::ALL {
            let value = self.field(field);
            if value.as_bytes().contains(&0) {
                return Err(IdentificationError::InteriorNul(field));
            }
            if value.len() > Self::MAX_FIELD_LEN {
                return Err(IdentificationError::TooLong {
                    field,
                    len: value.len(),
                });
            }
        }
        Ok(())
    }
}

/// Endpoint direction, taken from bit 7 of the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn from_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

/// Bulk endpoints of the accessory interface
///
/// Only meaningful once the device has re-enumerated in accessory mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointPair {
    pub bulk_in: u8,
    pub bulk_out: u8,
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in={:#04x} out={:#04x}", self.bulk_in, self.bulk_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_indices_are_sequential() {
        for (position, field) in IdentityField::ALL.iter().enumerate() {
            assert_eq!(field.index() as usize, position);
        }
    }

    #[test]
    fn test_only_manufacturer_is_unterminated() {
        let ident = AccessoryIdentification::default();
        for (field, payload) in ident.payloads() {
            let value = ident.field(field);
            if field == IdentityField::Manufacturer {
                assert_eq!(payload, value.as_bytes());
            } else {
                assert_eq!(payload.len(), value.len() + 1);
                assert_eq!(payload.last(), Some(&0));
            }
        }
    }

    #[test]
    fn test_empty_fields() {
        let ident = AccessoryIdentification {
            manufacturer: String::new(),
            model: String::new(),
            description: String::new(),
            version: String::new(),
            uri: String::new(),
            serial: String::new(),
        };
        assert!(ident.wire_payload(IdentityField::Manufacturer).is_empty());
        assert_eq!(ident.wire_payload(IdentityField::Serial), vec![0]);
    }

    #[test]
    fn test_validate_rejects_interior_nul() {
        let ident = AccessoryIdentification {
            uri: "http://a\0b".to_string(),
            ..Default::default()
        };
        assert_eq!(
            ident.validate(),
            Err(IdentificationError::InteriorNul(IdentityField::Uri))
        );
        assert!(AccessoryIdentification::default().validate().is_ok());
    }

    #[test]
    fn test_direction_from_address() {
        assert_eq!(Direction::from_address(0x81), Direction::In);
        assert_eq!(Direction::from_address(0x83), Direction::In);
        assert_eq!(Direction::from_address(0x02), Direction::Out);
    }
}
