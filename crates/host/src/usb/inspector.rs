//! Descriptor inspector
//!
//! Reads the active configuration descriptor of an accessory-mode device and
//! finds the bulk endpoints of its claimed interface.

use crate::usb::device::DeviceSession;
use common::DeviceIo;
use protocol::descriptor::MIN_DESCRIPTOR_BUFFER;
use protocol::{ACCESSORY_INTERFACE, DescriptorError, EndpointPair, find_bulk_endpoints};
use tracing::{debug, info};

/// Default size of the buffer the configuration descriptor is read into
pub const DEFAULT_DESCRIPTOR_BUFFER: usize = 256;

/// Discover the bulk IN/OUT endpoint pair and record it on the session
///
/// `buffer_len` is raised to at least 64 bytes.
pub fn discover_endpoints<H: DeviceIo>(
    session: &mut DeviceSession<H>,
    buffer_len: usize,
) -> Result<EndpointPair, DescriptorError> {
    let mut buf = vec![0u8; buffer_len.max(MIN_DESCRIPTOR_BUFFER)];
    let len = session
        .io()
        .read_config_descriptor(&mut buf)
        .map_err(DescriptorError::Read)?;
    debug!("Read {} bytes of configuration descriptor", len);

    let interface = session.claimed_interface().unwrap_or(ACCESSORY_INTERFACE);
    let endpoints = find_bulk_endpoints(&buf[..len], interface)?;
    info!("Endpoints on interface {}: {}", interface, endpoints);

    session.set_endpoints(endpoints);
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        FakeTransport, create_accessory_config_descriptor, create_empty_config_descriptor,
        create_single_endpoint_config_descriptor,
    };
    use protocol::{ACCESSORY_PRODUCT_ID, ErrorKind, GOOGLE_VENDOR_ID};

    fn discover(transport: FakeTransport) -> Result<EndpointPair, DescriptorError> {
        let mut transport = transport;
        let mut session =
            DeviceSession::open(&mut transport, GOOGLE_VENDOR_ID, ACCESSORY_PRODUCT_ID).unwrap();
        session.claim(0).unwrap();
        discover_endpoints(&mut session, DEFAULT_DESCRIPTOR_BUFFER)
    }

    #[test]
    fn test_no_interface() {
        let transport =
            FakeTransport::new().with_config_descriptor(Ok(create_empty_config_descriptor()));
        assert_eq!(discover(transport), Err(DescriptorError::NoInterface));
    }

    #[test]
    fn test_single_endpoint() {
        let transport = FakeTransport::new()
            .with_config_descriptor(Ok(create_single_endpoint_config_descriptor()));
        assert_eq!(
            discover(transport),
            Err(DescriptorError::NoEndpoints { declared: 1 })
        );
    }

    #[test]
    fn test_endpoints_recorded_on_session() {
        let mut transport = FakeTransport::new()
            .with_config_descriptor(Ok(create_accessory_config_descriptor(0x83, 0x03)));
        let mut session =
            DeviceSession::open(&mut transport, GOOGLE_VENDOR_ID, ACCESSORY_PRODUCT_ID).unwrap();

        let pair = discover_endpoints(&mut session, 64).unwrap();
        assert_eq!(
            pair,
            EndpointPair {
                bulk_in: 0x83,
                bulk_out: 0x03
            }
        );
        assert_eq!(session.endpoints(), Some(pair));
    }

    #[test]
    fn test_read_failure() {
        let transport = FakeTransport::new().with_config_descriptor(Err(ErrorKind::NoDevice));
        assert_eq!(
            discover(transport),
            Err(DescriptorError::Read(ErrorKind::NoDevice))
        );
    }
}
