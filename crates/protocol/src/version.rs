//! AOA protocol version

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version reported by the device in response to request 51
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AoaVersion(pub u16);

impl AoaVersion {
    /// Size of the version response
    pub const RESPONSE_LEN: usize = 2;

    /// Decode a little-endian version response
    ///
    /// Returns None when fewer than two bytes were received.
    pub fn decode(response: &[u8]) -> Option<Self> {
        if response.len() < Self::RESPONSE_LEN {
            return None;
        }
        Some(Self(LittleEndian::read_u16(response)))
    }

    /// A device reporting 0 does not implement accessory mode
    pub fn supports_accessory(&self) -> bool {
        self.0 >= 1
    }
}

impl fmt::Display for AoaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
