//! rusb transport
//!
//! Implements the transport traits on top of libusb through `rusb` and maps
//! rusb errors onto the shared error classifier.

use crate::usb::device::DeviceSummary;
use common::{DeviceIo, UsbTransport};
use protocol::ErrorKind;
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// libusb context used to open devices
pub struct RusbTransport {
    context: Context,
}

impl RusbTransport {
    pub fn new() -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        Ok(Self { context })
    }

    /// Summaries of every device currently on the bus
    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>, rusb::Error> {
        let devices = self.context.devices()?;
        let mut summaries = Vec::new();

        for device in devices.iter() {
            match DeviceSummary::from_device(&device) {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(
                    "Skipping device on bus {} address {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        debug!("Enumerated {} devices", summaries.len());
        Ok(summaries)
    }
}

impl UsbTransport for RusbTransport {
    type Handle = RusbHandle;

    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<RusbHandle, ErrorKind> {
        let mut handle = self
            .context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(ErrorKind::NotFound)?;

        // Normal mode often exposes mass storage with a kernel driver bound to
        // interface 0; let libusb detach it on claim and reattach on release.
        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) => {}
            Err(rusb::Error::NotSupported) => {
                debug!("Kernel driver auto-detach not supported on this platform");
            }
            Err(e) => {
                warn!("Failed to enable kernel driver auto-detach: {}", e);
            }
        }

        debug!("Opened device {:04x}:{:04x}", vendor_id, product_id);
        Ok(RusbHandle { handle })
    }
}

/// Open rusb device handle; libusb closes it on drop
pub struct RusbHandle {
    handle: DeviceHandle<Context>,
}

impl DeviceIo for RusbHandle {
    fn claim_interface(&mut self, interface: u8) -> Result<(), ErrorKind> {
        self.handle
            .claim_interface(interface)
            .map_err(map_rusb_error)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), ErrorKind> {
        self.handle
            .release_interface(interface)
            .map_err(map_rusb_error)
    }

    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        debug!(
            "Control IN: request_type={:#x}, request={}, value={:#x}, index={}, len={}",
            request_type,
            request,
            value,
            index,
            buf.len()
        );
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        debug!(
            "Control OUT: request_type={:#x}, request={}, value={:#x}, index={}, len={}",
            request_type,
            request,
            value,
            index,
            buf.len()
        );
        self.handle
            .write_control(request_type, request, value, index, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        debug!(
            "Bulk IN: endpoint={:#x}, len={}, timeout={}ms",
            endpoint,
            buf.len(),
            timeout.as_millis()
        );
        self.handle
            .read_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        debug!(
            "Bulk OUT: endpoint={:#x}, len={}, timeout={}ms",
            endpoint,
            buf.len(),
            timeout.as_millis()
        );
        self.handle
            .write_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }
}

/// Map rusb::Error onto the shared error classifier
pub fn map_rusb_error(err: rusb::Error) -> ErrorKind {
    match err {
        rusb::Error::Io => ErrorKind::Io,
        rusb::Error::InvalidParam => ErrorKind::InvalidParameter,
        rusb::Error::Access => ErrorKind::AccessDenied,
        rusb::Error::NoDevice => ErrorKind::NoDevice,
        rusb::Error::NotFound => ErrorKind::NotFound,
        rusb::Error::Busy => ErrorKind::Busy,
        rusb::Error::Timeout => ErrorKind::Timeout,
        rusb::Error::Overflow => ErrorKind::Overflow,
        rusb::Error::Pipe => ErrorKind::Pipe,
        rusb::Error::Interrupted => ErrorKind::Interrupted,
        rusb::Error::NoMem => ErrorKind::OutOfMemory,
        rusb::Error::NotSupported => ErrorKind::NotSupported,
        // BadDescriptor is rusb's own; libusb only knows it as "other"
        _ => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), ErrorKind::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), ErrorKind::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), ErrorKind::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::NotFound), ErrorKind::NotFound);
        assert_eq!(map_rusb_error(rusb::Error::NoMem), ErrorKind::OutOfMemory);
        assert_eq!(map_rusb_error(rusb::Error::Other), ErrorKind::Other);
        assert_eq!(map_rusb_error(rusb::Error::BadDescriptor), ErrorKind::Other);
    }

    #[test]
    fn test_mapping_agrees_with_libusb_codes() {
        // rusb's variants follow libusb's error codes -1..-12
        let pairs = [
            (rusb::Error::Io, -1),
            (rusb::Error::InvalidParam, -2),
            (rusb::Error::Access, -3),
            (rusb::Error::NoDevice, -4),
            (rusb::Error::NotFound, -5),
            (rusb::Error::Busy, -6),
            (rusb::Error::Timeout, -7),
            (rusb::Error::Overflow, -8),
            (rusb::Error::Pipe, -9),
            (rusb::Error::Interrupted, -10),
            (rusb::Error::NoMem, -11),
            (rusb::Error::NotSupported, -12),
        ];
        for (err, code) in pairs {
            assert_eq!(map_rusb_error(err), ErrorKind::from_code(code));
        }
    }
}
