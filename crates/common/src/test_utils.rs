//! Test utilities for adk-host
//!
//! Provides a scripted fake USB transport that records every operation, and
//! builders for the descriptors an accessory-mode device reports.
//!
//! # Example
//!
//! ```
//! use common::test_utils::FakeTransport;
//! use common::UsbTransport;
//!
//! # fn main() {
//! let mut transport = FakeTransport::new().fail_opens(0x2D00, 2);
//! assert!(transport.open(0x18D1, 0x2D00).is_err());
//! assert!(transport.open(0x18D1, 0x2D00).is_err());
//! assert!(transport.open(0x18D1, 0x2D00).is_ok());
//! assert_eq!(transport.open_attempts(0x2D00), 3);
//! # }
//! ```

use crate::transport::{DeviceIo, Sleeper, UsbTransport};
use protocol::ErrorKind;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// One operation observed by the fake transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Open {
        vendor_id: u16,
        product_id: u16,
        ok: bool,
    },
    Claim {
        handle: u32,
        interface: u8,
    },
    Release {
        handle: u32,
        interface: u8,
    },
    ControlIn {
        handle: u32,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    ControlOut {
        handle: u32,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    BulkIn {
        handle: u32,
        endpoint: u8,
        length: usize,
        timeout: Duration,
    },
    BulkOut {
        handle: u32,
        endpoint: u8,
        data: Vec<u8>,
        timeout: Duration,
    },
    ConfigDescriptor {
        handle: u32,
    },
    Sleep(Duration),
    Close {
        handle: u32,
    },
}

#[derive(Debug)]
struct FakeState {
    events: Vec<FakeEvent>,
    next_handle: u32,
    /// Remaining failing opens per product id; `u32::MAX` never succeeds
    open_failures: HashMap<u16, u32>,
    claim_failures: HashMap<u16, ErrorKind>,
    version_response: Result<Vec<u8>, ErrorKind>,
    control_out_failures: HashMap<(u8, u16), ErrorKind>,
    config_descriptor: Result<Vec<u8>, ErrorKind>,
    bulk_in: VecDeque<Result<Vec<u8>, ErrorKind>>,
    bulk_out_failure: Option<ErrorKind>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            next_handle: 1,
            open_failures: HashMap::new(),
            claim_failures: HashMap::new(),
            version_response: Ok(vec![0x02, 0x00]),
            control_out_failures: HashMap::new(),
            config_descriptor: Ok(create_accessory_config_descriptor(0x81, 0x01)),
            bulk_in: VecDeque::new(),
            bulk_out_failure: None,
        }
    }
}

/// Scripted USB transport
///
/// By default every open succeeds, the device reports protocol version 2,
/// every control and bulk OUT transfer succeeds and the configuration
/// descriptor is a plain accessory layout with endpoints 0x81/0x01. Bulk IN
/// reads are served from a queue; an empty queue times out.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Rc<RefCell<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` opens of `product_id`
    pub fn fail_opens(self, product_id: u16, count: u32) -> Self {
        self.state
            .borrow_mut()
            .open_failures
            .insert(product_id, count);
        self
    }

    /// Never find a device with `product_id`
    pub fn never_opens(self, product_id: u16) -> Self {
        self.fail_opens(product_id, u32::MAX)
    }

    pub fn fail_claim(self, product_id: u16, kind: ErrorKind) -> Self {
        self.state
            .borrow_mut()
            .claim_failures
            .insert(product_id, kind);
        self
    }

    /// Response to any vendor control IN request
    pub fn with_version_response(self, response: Result<Vec<u8>, ErrorKind>) -> Self {
        self.state.borrow_mut().version_response = response;
        self
    }

    /// Fail control OUT transfers carrying `request` at `index`
    pub fn fail_control_out(self, request: u8, index: u16, kind: ErrorKind) -> Self {
        self.state
            .borrow_mut()
            .control_out_failures
            .insert((request, index), kind);
        self
    }

    pub fn with_config_descriptor(self, descriptor: Result<Vec<u8>, ErrorKind>) -> Self {
        self.state.borrow_mut().config_descriptor = descriptor;
        self
    }

    /// Queue the result of the next bulk IN read
    pub fn push_bulk_in(self, result: Result<Vec<u8>, ErrorKind>) -> Self {
        self.state.borrow_mut().bulk_in.push_back(result);
        self
    }

    pub fn fail_bulk_out(self, kind: ErrorKind) -> Self {
        self.state.borrow_mut().bulk_out_failure = Some(kind);
        self
    }

    /// Sleeper that records into this transport's event log
    pub fn sleeper(&self) -> FakeSleeper {
        FakeSleeper {
            state: Rc::clone(&self.state),
        }
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state.borrow().events.clone()
    }

    pub fn open_attempts(&self, product_id: u16) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, FakeEvent::Open { product_id: p, .. } if *p == product_id))
            .count()
    }

    /// Control OUT transfers as (request, index, data)
    pub fn control_out_requests(&self) -> Vec<(u8, u16, Vec<u8>)> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                FakeEvent::ControlOut {
                    request,
                    index,
                    data,
                    ..
                } => Some((*request, *index, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Sleep(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Bulk IN reads as (endpoint, requested length)
    pub fn bulk_reads(&self) -> Vec<(u8, usize)> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                FakeEvent::BulkIn {
                    endpoint, length, ..
                } => Some((*endpoint, *length)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: FakeEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

impl UsbTransport for FakeTransport {
    type Handle = FakeHandle;

    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<FakeHandle, ErrorKind> {
        let failing = {
            let mut state = self.state.borrow_mut();
            match state.open_failures.get_mut(&product_id) {
                Some(remaining) if *remaining > 0 => {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    true
                }
                _ => false,
            }
        };

        self.record(FakeEvent::Open {
            vendor_id,
            product_id,
            ok: !failing,
        });

        if failing {
            return Err(ErrorKind::NotFound);
        }

        let mut state = self.state.borrow_mut();
        let id = state.next_handle;
        state.next_handle += 1;

        Ok(FakeHandle {
            id,
            product_id,
            state: Rc::clone(&self.state),
        })
    }
}

/// Handle returned by [`FakeTransport::open`]; records a close on drop
#[derive(Debug)]
pub struct FakeHandle {
    id: u32,
    product_id: u16,
    state: Rc<RefCell<FakeState>>,
}

impl FakeHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    fn record(&self, event: FakeEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

impl DeviceIo for FakeHandle {
    fn claim_interface(&mut self, interface: u8) -> Result<(), ErrorKind> {
        self.record(FakeEvent::Claim {
            handle: self.id,
            interface,
        });
        match self.state.borrow().claim_failures.get(&self.product_id) {
            Some(kind) => Err(*kind),
            None => Ok(()),
        }
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), ErrorKind> {
        self.record(FakeEvent::Release {
            handle: self.id,
            interface,
        });
        Ok(())
    }

    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        self.record(FakeEvent::ControlIn {
            handle: self.id,
            request_type,
            request,
            value,
            index,
            length: buf.len(),
        });
        let response = self.state.borrow().version_response.clone()?;
        let len = response.len().min(buf.len());
        buf[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        self.record(FakeEvent::ControlOut {
            handle: self.id,
            request_type,
            request,
            value,
            index,
            data: buf.to_vec(),
        });
        match self.state.borrow().control_out_failures.get(&(request, index)) {
            Some(kind) => Err(*kind),
            None => Ok(buf.len()),
        }
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        self.record(FakeEvent::BulkIn {
            handle: self.id,
            endpoint,
            length: buf.len(),
            timeout,
        });
        let next = self
            .state
            .borrow_mut()
            .bulk_in
            .pop_front()
            .unwrap_or(Err(ErrorKind::Timeout))?;
        if next.len() > buf.len() {
            return Err(ErrorKind::Overflow);
        }
        buf[..next.len()].copy_from_slice(&next);
        Ok(next.len())
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, ErrorKind> {
        self.record(FakeEvent::BulkOut {
            handle: self.id,
            endpoint,
            data: buf.to_vec(),
            timeout,
        });
        match self.state.borrow().bulk_out_failure {
            Some(kind) => Err(kind),
            None => Ok(buf.len()),
        }
    }

    fn read_config_descriptor(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        self.record(FakeEvent::ConfigDescriptor { handle: self.id });
        let descriptor = self.state.borrow().config_descriptor.clone()?;
        let len = descriptor.len().min(buf.len());
        buf[..len].copy_from_slice(&descriptor[..len]);
        Ok(len)
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.record(FakeEvent::Close { handle: self.id });
    }
}

/// Sleeper that records instead of sleeping
#[derive(Debug, Clone)]
pub struct FakeSleeper {
    state: Rc<RefCell<FakeState>>,
}

impl Sleeper for FakeSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.state
            .borrow_mut()
            .events
            .push(FakeEvent::Sleep(duration));
    }
}

/// Create a configuration descriptor for one vendor interface with two bulk
/// endpoints, the layout a device reports in accessory mode
pub fn create_accessory_config_descriptor(bulk_in: u8, bulk_out: u8) -> Vec<u8> {
    vec![
        // Configuration descriptor
        0x09, // bLength
        0x02, // bDescriptorType (Configuration)
        0x20, 0x00, // wTotalLength (32 bytes)
        0x01, // bNumInterfaces
        0x01, // bConfigurationValue
        0x00, // iConfiguration
        0x80, // bmAttributes (Bus-powered)
        0xFA, // bMaxPower (500mA)
        // Interface descriptor
        0x09, // bLength
        0x04, // bDescriptorType (Interface)
        0x00, // bInterfaceNumber
        0x00, // bAlternateSetting
        0x02, // bNumEndpoints
        0xFF, // bInterfaceClass (Vendor-specific)
        0xFF, // bInterfaceSubClass
        0x00, // bInterfaceProtocol
        0x00, // iInterface
        // Endpoint descriptor
        0x07, // bLength
        0x05, // bDescriptorType (Endpoint)
        bulk_in, // bEndpointAddress
        0x02, // bmAttributes (Bulk)
        0x00, 0x02, // wMaxPacketSize (512 bytes)
        0x00, // bInterval
        // Endpoint descriptor
        0x07, // bLength
        0x05, // bDescriptorType (Endpoint)
        bulk_out, // bEndpointAddress
        0x02, // bmAttributes (Bulk)
        0x00, 0x02, // wMaxPacketSize (512 bytes)
        0x00, // bInterval
    ]
}

/// Create a configuration descriptor reporting no interfaces
pub fn create_empty_config_descriptor() -> Vec<u8> {
    vec![0x09, 0x02, 0x09, 0x00, 0x00, 0x01, 0x00, 0x80, 0x32]
}

/// Create a configuration descriptor whose interface has a single endpoint
pub fn create_single_endpoint_config_descriptor() -> Vec<u8> {
    let mut descriptor = create_accessory_config_descriptor(0x81, 0x01);
    descriptor.truncate(25);
    descriptor[2] = 25; // wTotalLength
    descriptor[13] = 1; // bNumEndpoints
    descriptor
}
