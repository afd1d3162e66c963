//! USB device session
//!
//! [`DeviceSession`] is the context threaded through every stage of a run:
//! it owns the open handle, remembers which interface was claimed and, once
//! discovered, the bulk endpoints. Ownership moves linearly from the
//! negotiator to the transfer loop to teardown.

use common::{DeviceIo, UsbTransport};
use protocol::{EndpointPair, ErrorKind, is_accessory_product};
use rusb::{Context, Device};
use std::time::Duration;
use tracing::{debug, warn};

/// Open device plus the state accumulated on it
///
/// Dropping the session releases the claimed interface before the handle is
/// closed, so early returns never leave an interface claimed.
pub struct DeviceSession<H: DeviceIo> {
    handle: H,
    vendor_id: u16,
    product_id: u16,
    claimed: Option<u8>,
    endpoints: Option<EndpointPair>,
}

impl<H: DeviceIo> DeviceSession<H> {
    /// Open `vendor_id:product_id` through `transport`
    pub fn open<T>(transport: &mut T, vendor_id: u16, product_id: u16) -> Result<Self, ErrorKind>
    where
        T: UsbTransport<Handle = H>,
    {
        let handle = transport.open(vendor_id, product_id)?;
        Ok(Self::from_handle(handle, vendor_id, product_id))
    }

    pub fn from_handle(handle: H, vendor_id: u16, product_id: u16) -> Self {
        Self {
            handle,
            vendor_id,
            product_id,
            claimed: None,
            endpoints: None,
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn is_accessory(&self) -> bool {
        is_accessory_product(self.product_id)
    }

    pub fn claimed_interface(&self) -> Option<u8> {
        self.claimed
    }

    pub fn endpoints(&self) -> Option<EndpointPair> {
        self.endpoints
    }

    pub fn set_endpoints(&mut self, endpoints: EndpointPair) {
        self.endpoints = Some(endpoints);
    }

    /// Handle for issuing transfers
    pub fn io(&mut self) -> &mut H {
        &mut self.handle
    }

    /// Claim an interface
    ///
    /// Only one interface is tracked; claiming another releases the first.
    pub fn claim(&mut self, interface: u8) -> Result<(), ErrorKind> {
        if self.claimed == Some(interface) {
            return Ok(());
        }
        self.release();

        self.handle.claim_interface(interface)?;
        debug!(
            "Claimed interface {} on {:04x}:{:04x}",
            interface, self.vendor_id, self.product_id
        );
        self.claimed = Some(interface);
        Ok(())
    }

    /// Release the claimed interface, if any
    ///
    /// Release failures are logged and otherwise ignored: the device may
    /// already have dropped off the bus.
    pub fn release(&mut self) {
        if let Some(interface) = self.claimed.take() {
            match self.handle.release_interface(interface) {
                Ok(()) => debug!("Released interface {}", interface),
                Err(e) => debug!("Could not release interface {}: {}", interface, e),
            }
        }
    }

    /// Release the interface and close the handle
    pub fn close(self) {
        debug!("Closing {:04x}:{:04x}", self.vendor_id, self.product_id);
        drop(self);
    }
}

impl<H: DeviceIo> Drop for DeviceSession<H> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Device found on the bus, for `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceSummary {
    /// Read the device descriptor and, if the device can be opened, its strings
    pub fn from_device(device: &Device<Context>) -> Result<Self, rusb::Error> {
        let descriptor = device.device_descriptor()?;

        let mut summary = Self {
            bus_number: device.bus_number(),
            device_address: device.address(),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            manufacturer: None,
            product: None,
            serial_number: None,
        };

        // Strings need an open handle, which fails without permissions
        match device.open() {
            Ok(handle) => {
                let timeout = Duration::from_millis(200);
                let language = handle
                    .read_languages(timeout)
                    .ok()
                    .and_then(|languages| languages.first().copied());

                if let Some(language) = language {
                    summary.manufacturer = handle
                        .read_manufacturer_string(language, &descriptor, timeout)
                        .ok();
                    summary.product = handle
                        .read_product_string(language, &descriptor, timeout)
                        .ok();
                    summary.serial_number = handle
                        .read_serial_number_string(language, &descriptor, timeout)
                        .ok();
                }
            }
            Err(e) => {
                if e != rusb::Error::Access {
                    warn!(
                        "Could not open {:04x}:{:04x} to read strings: {}",
                        summary.vendor_id, summary.product_id, e
                    );
                }
            }
        }

        Ok(summary)
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}
