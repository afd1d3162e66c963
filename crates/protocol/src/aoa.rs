//! AOA v1 wire constants
//!
//! Request codes and request types are fixed by the Android Open Accessory
//! protocol. Product ids are the ones Google devices enumerate under.

/// Google vendor id
pub const GOOGLE_VENDOR_ID: u16 = 0x18D1;

/// Product id of the test device in its normal (mass storage) mode
pub const DEFAULT_PRODUCT_ID: u16 = 0x4E21;

/// Product id after switching into accessory mode
pub const ACCESSORY_PRODUCT_ID: u16 = 0x2D00;

/// Product id after switching into accessory mode with ADB enabled
pub const ACCESSORY_ADB_PRODUCT_ID: u16 = 0x2D01;

/// Get protocol version (IN, 2-byte little-endian response)
pub const ACCESSORY_GET_PROTOCOL: u8 = 51;

/// Send identification string, `wIndex` selects the field
pub const ACCESSORY_SEND_STRING: u8 = 52;

/// Start accessory mode, no data stage
pub const ACCESSORY_START: u8 = 53;

/// bmRequestType: device-to-host | vendor | device
pub const REQUEST_TYPE_VENDOR_IN: u8 = 0xC0;

/// bmRequestType: host-to-device | vendor | device
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;

/// Interface claimed before and after the mode switch
pub const ACCESSORY_INTERFACE: u8 = 0;

/// Whether a product id is one of the accessory-mode ids
pub fn is_accessory_product(product_id: u16) -> bool {
    matches!(product_id, ACCESSORY_PRODUCT_ID | ACCESSORY_ADB_PRODUCT_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_types_encode_direction() {
        assert_eq!(REQUEST_TYPE_VENDOR_IN & 0x80, 0x80);
        assert_eq!(REQUEST_TYPE_VENDOR_OUT & 0x80, 0x00);
        // Both are vendor requests addressed to the device
        assert_eq!(REQUEST_TYPE_VENDOR_IN & 0x7F, REQUEST_TYPE_VENDOR_OUT);
    }

    #[test]
    fn test_is_accessory_product() {
        assert!(is_accessory_product(ACCESSORY_PRODUCT_ID));
        assert!(is_accessory_product(ACCESSORY_ADB_PRODUCT_ID));
        assert!(!is_accessory_product(DEFAULT_PRODUCT_ID));
    }
}
