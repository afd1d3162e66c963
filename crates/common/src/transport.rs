//! USB transport seam
//!
//! The negotiator, descriptor inspector and session loop are written against
//! these traits. The host crate implements them on top of `rusb`; tests use
//! the scripted fake in [`crate::test_utils`].
//!
//! All operations block the calling thread. A timeout of [`NO_TIMEOUT`]
//! waits forever, matching libusb's convention of a zero timeout.

use protocol::ErrorKind;
use protocol::descriptor::DT_CONFIG;
use std::time::Duration;

/// Wait until the transfer completes or the device goes away
pub const NO_TIMEOUT: Duration = Duration::ZERO;

/// Longest timeout libusb can express; it takes milliseconds as a `u32`
pub const MAX_TIMEOUT: Duration = Duration::from_millis(u32::MAX as u64);

/// Standard GET_DESCRIPTOR request
const REQUEST_GET_DESCRIPTOR: u8 = 0x06;

/// bmRequestType: device-to-host | standard | device
const REQUEST_TYPE_STANDARD_IN: u8 = 0x80;

const DESCRIPTOR_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// An open device handle
///
/// Dropping the handle closes it. Callers release claimed interfaces first.
pub trait DeviceIo {
    fn claim_interface(&mut self, interface: u8) -> Result<(), ErrorKind>;

    fn release_interface(&mut self, interface: u8) -> Result<(), ErrorKind>;

    /// Device-to-host control transfer, returns the number of bytes received
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind>;

    /// Host-to-device control transfer, returns the number of bytes sent
    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind>;

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> Result<usize, ErrorKind>;

    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration)
    -> Result<usize, ErrorKind>;

    /// Read the raw active configuration descriptor (index 0) into `buf`
    fn read_config_descriptor(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        self.read_control(
            REQUEST_TYPE_STANDARD_IN,
            REQUEST_GET_DESCRIPTOR,
            (DT_CONFIG as u16) << 8,
            0,
            buf,
            DESCRIPTOR_READ_TIMEOUT,
        )
    }
}

/// Opens devices by vendor and product id
pub trait UsbTransport {
    type Handle: DeviceIo;

    /// Open the first device matching `vendor_id:product_id`
    ///
    /// Returns `ErrorKind::NotFound` when no such device is attached.
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<Self::Handle, ErrorKind>;
}

/// Blocking delay, injectable so polling can be tested without waiting
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Handle that keeps the default descriptor read and records control reads
    #[derive(Default)]
    struct RecordingHandle {
        reads: Vec<(u8, u8, u16, u16, usize, Duration)>,
        descriptor: Vec<u8>,
    }

    impl DeviceIo for RecordingHandle {
        fn claim_interface(&mut self, _interface: u8) -> Result<(), ErrorKind> {
            Ok(())
        }

        fn release_interface(&mut self, _interface: u8) -> Result<(), ErrorKind> {
            Ok(())
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
            self.reads
                .push((request_type, request, value, index, buf.len(), timeout));
            let len = self.descriptor.len().min(buf.len());
            buf[..len].copy_from_slice(&self.descriptor[..len]);
            Ok(len)
        }

        fn write_control(
            &mut self,
            _request_type: u8,
            _request: u8,
            _value: u16,
            _index: u16,
            _buf: &[u8],
            _timeout: Duration,
        ) -> Result<usize, ErrorKind> {
            Err(ErrorKind::NotSupported)
        }

        fn read_bulk(
            &mut self,
            _endpoint: u8,
            _buf: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, ErrorKind> {
            Err(ErrorKind::NotSupported)
        }

        fn write_bulk(
            &mut self,
            _endpoint: u8,
            _buf: &[u8],
            _timeout: Duration,
        ) -> Result<usize, ErrorKind> {
            Err(ErrorKind::NotSupported)
        }
    }

    #[test]
    fn test_default_config_descriptor_read() {
        let mut handle = RecordingHandle {
            descriptor: vec![0x09, 0x02, 0x09, 0x00, 0x00, 0x01, 0x00, 0x80, 0x32],
            ..Default::default()
        };
        let mut buf = vec![0u8; 256];

        let len = handle.read_config_descriptor(&mut buf).unwrap();
        assert_eq!(len, 9);
        assert_eq!(&buf[..2], &[0x09, 0x02]);

        assert_eq!(handle.reads.len(), 1);
        let (request_type, request, value, index, buf_len, timeout) = handle.reads[0];
        assert_eq!(request_type, 0x80);
        assert_eq!(request, 6);
        assert_eq!(value, 0x0200);
        assert_eq!(index, 0);
        assert!(buf_len >= 64);
        assert_eq!(timeout, Duration::from_secs(1));
    }
}
