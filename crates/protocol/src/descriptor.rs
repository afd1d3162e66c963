//! Raw configuration descriptor walker
//!
//! A configuration descriptor as returned by GET_DESCRIPTOR is a flat run of
//! records, each starting with `bLength` and `bDescriptorType`. The walker
//! steps over records by their declared length, so class-specific and vendor
//! descriptors between the interface and its endpoints are skipped.
//!
//! ```text
//! [config 9][interface 9][class-specific N][endpoint 7][endpoint 7]...
//! ```

use crate::error::DescriptorError;
use crate::types::{Direction, EndpointPair};
use byteorder::{ByteOrder, LittleEndian};

pub const DT_CONFIG: u8 = 0x02;
pub const DT_INTERFACE: u8 = 0x04;
pub const DT_ENDPOINT: u8 = 0x05;

pub const CONFIG_DESCRIPTOR_SIZE: usize = 9;
pub const INTERFACE_DESCRIPTOR_SIZE: usize = 9;
pub const ENDPOINT_DESCRIPTOR_SIZE: usize = 7;

/// Smallest buffer a configuration descriptor is read into
pub const MIN_DESCRIPTOR_BUFFER: usize = 64;

const TRANSFER_TYPE_MASK: u8 = 0x03;
const TRANSFER_TYPE_BULK: u8 = 0x02;

/// One descriptor record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRecord<'a> {
    /// Byte offset of the record in the buffer
    pub offset: usize,
    pub descriptor_type: u8,
    /// The whole record, header included
    pub bytes: &'a [u8],
}

/// Iterator over descriptor records
///
/// Yields `Malformed` once and then stops if a record has a length below 2 or
/// runs past the end of the data.
#[derive(Debug, Clone)]
pub struct Descriptors<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Descriptors<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = Result<DescriptorRecord<'a>, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let offset = self.offset;
        let remaining = &self.data[offset..];
        let length = remaining[0] as usize;

        if length < 2 || length > remaining.len() {
            self.failed = true;
            return Some(Err(DescriptorError::Malformed { offset }));
        }

        self.offset += length;
        Some(Ok(DescriptorRecord {
            offset,
            descriptor_type: remaining[1],
            bytes: &remaining[..length],
        }))
    }
}

/// Locate the first bulk IN and bulk OUT endpoints of `interface_number`
///
/// Only alternate setting 0 is considered. The data may be shorter than the
/// descriptor's `wTotalLength` when it was read into a small buffer; the walk
/// stops as soon as both endpoints are known.
pub fn find_bulk_endpoints(
    data: &[u8],
    interface_number: u8,
) -> Result<EndpointPair, DescriptorError> {
    if data.len() < CONFIG_DESCRIPTOR_SIZE
        || (data[0] as usize) < CONFIG_DESCRIPTOR_SIZE
        || data[1] != DT_CONFIG
    {
        return Err(DescriptorError::Malformed { offset: 0 });
    }

    if data[4] == 0 {
        return Err(DescriptorError::NoInterface);
    }

    let total_length = LittleEndian::read_u16(&data[2..4]) as usize;
    let data = &data[..total_length.clamp(CONFIG_DESCRIPTOR_SIZE, data.len())];

    let mut in_interface = false;
    let mut bulk_in = None;
    let mut bulk_out = None;

    for record in Descriptors::new(data) {
        let record = record?;
        match record.descriptor_type {
            DT_INTERFACE => {
                if in_interface {
                    // Next interface or alternate setting: our endpoints are done
                    break;
                }
                if record.bytes.len() < INTERFACE_DESCRIPTOR_SIZE {
                    return Err(DescriptorError::Malformed {
                        offset: record.offset,
                    });
                }
                if record.bytes[2] == interface_number && record.bytes[3] == 0 {
                    let declared = record.bytes[4];
                    if declared < 2 {
                        return Err(DescriptorError::NoEndpoints { declared });
                    }
                    in_interface = true;
                }
            }
            DT_ENDPOINT if in_interface => {
                if record.bytes.len() < ENDPOINT_DESCRIPTOR_SIZE {
                    return Err(DescriptorError::Malformed {
                        offset: record.offset,
                    });
                }
                let address = record.bytes[2];
                let attributes = record.bytes[3];
                if attributes & TRANSFER_TYPE_MASK != TRANSFER_TYPE_BULK {
                    continue;
                }
                match Direction::from_address(address) {
                    Direction::In => {
                        bulk_in.get_or_insert(address);
                    }
                    Direction::Out => {
                        bulk_out.get_or_insert(address);
                    }
                }
                if let (Some(bulk_in), Some(bulk_out)) = (bulk_in, bulk_out) {
                    return Ok(EndpointPair { bulk_in, bulk_out });
                }
            }
            _ => {}
        }
    }

    if !in_interface {
        return Err(DescriptorError::NoInterface);
    }

    match (bulk_in, bulk_out) {
        (None, _) => Err(DescriptorError::MissingBulkEndpoint(Direction::In)),
        (_, None) => Err(DescriptorError::MissingBulkEndpoint(Direction::Out)),
        (Some(bulk_in), Some(bulk_out)) => Ok(EndpointPair { bulk_in, bulk_out }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_interfaces: u8, body: &[u8]) -> Vec<u8> {
        let total = (CONFIG_DESCRIPTOR_SIZE + body.len()) as u16;
        let mut data = vec![
            0x09,
            DT_CONFIG,
            (total & 0xFF) as u8,
            (total >> 8) as u8,
            num_interfaces,
            0x01,
            0x00,
            0x80,
            0x32,
        ];
        data.extend_from_slice(body);
        data
    }

    fn interface(number: u8, alt: u8, endpoints: u8) -> [u8; 9] {
        [0x09, DT_INTERFACE, number, alt, endpoints, 0xFF, 0xFF, 0x00, 0x00]
    }

    fn endpoint(address: u8, attributes: u8) -> [u8; 7] {
        [0x07, DT_ENDPOINT, address, attributes, 0x00, 0x02, 0x00]
    }

    #[test]
    fn test_descriptors_iterates_by_length() {
        let mut body = Vec::new();
        body.extend_from_slice(&interface(0, 0, 2));
        body.extend_from_slice(&endpoint(0x81, 0x02));
        let data = config(1, &body);

        let types: Vec<u8> = Descriptors::new(&data)
            .map(|r| r.unwrap().descriptor_type)
            .collect();
        assert_eq!(types, vec![DT_CONFIG, DT_INTERFACE, DT_ENDPOINT]);
    }

    #[test]
    fn test_descriptors_stops_on_zero_length() {
        let data = [0x09, DT_CONFIG, 0x09, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32, 0x00, 0x04];
        let records: Vec<_> = Descriptors::new(&data).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Err(DescriptorError::Malformed { offset: 9 }));
    }

    #[test]
    fn test_skips_non_bulk_endpoints() {
        let mut body = Vec::new();
        body.extend_from_slice(&interface(0, 0, 3));
        body.extend_from_slice(&endpoint(0x82, 0x03)); // interrupt IN
        body.extend_from_slice(&endpoint(0x81, 0x02));
        body.extend_from_slice(&endpoint(0x01, 0x02));
        let data = config(1, &body);

        assert_eq!(
            find_bulk_endpoints(&data, 0),
            Ok(EndpointPair {
                bulk_in: 0x81,
                bulk_out: 0x01
            })
        );
    }

    #[test]
    fn test_missing_out_endpoint() {
        let mut body = Vec::new();
        body.extend_from_slice(&interface(0, 0, 2));
        body.extend_from_slice(&endpoint(0x81, 0x02));
        body.extend_from_slice(&endpoint(0x82, 0x02));
        let data = config(1, &body);

        assert_eq!(
            find_bulk_endpoints(&data, 0),
            Err(DescriptorError::MissingBulkEndpoint(Direction::Out))
        );
    }

    #[test]
    fn test_rejects_non_config_header() {
        let data = [0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40, 0xD1, 0x18];
        assert_eq!(
            find_bulk_endpoints(&data, 0),
            Err(DescriptorError::Malformed { offset: 0 })
        );
        assert_eq!(
            find_bulk_endpoints(&[0x09, 0x02], 0),
            Err(DescriptorError::Malformed { offset: 0 })
        );
    }
}
