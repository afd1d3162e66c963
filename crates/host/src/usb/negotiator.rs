//! Accessory negotiator
//!
//! Drives the AOA v1 handshake on a device in its normal mode:
//!
//! 1. Query the protocol version (request 51)
//! 2. Give the device a moment to settle
//! 3. Send the six identification strings in index order (request 52)
//! 4. Ask the device to start accessory mode (request 53)
//! 5. Release and close the current handle
//! 6. Poll until the device re-enumerates under the accessory product id
//! 7. Claim interface 0 on the new handle
//!
//! Any failure aborts the remaining steps. Firmware on the device side tracks
//! these requests as a state machine, so the order is fixed.

use crate::usb::device::DeviceSession;
use common::{DeviceIo, NO_TIMEOUT, Sleeper, UsbTransport};
use protocol::{
    ACCESSORY_GET_PROTOCOL, ACCESSORY_INTERFACE, ACCESSORY_PRODUCT_ID, ACCESSORY_SEND_STRING,
    ACCESSORY_START, AccessoryIdentification, AoaVersion, GOOGLE_VENDOR_ID, IdentityField,
    NegotiationError, REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT, VersionQueryFailure,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handshake tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSettings {
    /// Vendor id the accessory re-enumerates under
    pub vendor_id: u16,
    /// Product id the accessory re-enumerates under
    pub accessory_product_id: u16,
    /// Pause between the version query and the first identification string
    pub settle_delay: Duration,
    /// Total open attempts while waiting for re-enumeration
    pub reenumeration_attempts: u32,
    /// Pause between failed open attempts
    pub reenumeration_interval: Duration,
    /// Timeout for each control transfer, [`NO_TIMEOUT`] to wait forever
    pub control_timeout: Duration,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            vendor_id: GOOGLE_VENDOR_ID,
            accessory_product_id: ACCESSORY_PRODUCT_ID,
            settle_delay: Duration::from_millis(1),
            reenumeration_attempts: 5,
            reenumeration_interval: Duration::from_secs(1),
            control_timeout: NO_TIMEOUT,
        }
    }
}

/// AOA handshake driver
pub struct Negotiator<'a, T: UsbTransport, S: Sleeper> {
    transport: &'a mut T,
    sleeper: &'a mut S,
    settings: NegotiationSettings,
}

impl<'a, T: UsbTransport, S: Sleeper> Negotiator<'a, T, S> {
    pub fn new(transport: &'a mut T, sleeper: &'a mut S, settings: NegotiationSettings) -> Self {
        Self {
            transport,
            sleeper,
            settings,
        }
    }

    /// Run the full handshake
    ///
    /// Consumes the normal-mode session and returns the accessory-mode one,
    /// with interface 0 claimed. On failure the session passed in is dropped,
    /// which releases and closes it.
    pub fn negotiate(
        &mut self,
        mut session: DeviceSession<T::Handle>,
        identification: &AccessoryIdentification,
    ) -> Result<(AoaVersion, DeviceSession<T::Handle>), NegotiationError> {
        identification.validate()?;

        let version = self.query_version(&mut session)?;
        info!("Version Code Device: {}", version);
        if !version.supports_accessory() {
            warn!("Device reports protocol version 0, continuing anyway");
        }

        self.sleeper.sleep(self.settings.settle_delay);

        self.send_identification(&mut session, identification)?;
        info!("Accessory identification sent");

        self.start_accessory(&mut session)?;
        info!("Attempted to put device into accessory mode");

        // The device drops off the bus now; the old handle must be gone
        // before the accessory is opened.
        debug!("Closing the current handle");
        session.close();

        let mut accessory = self.await_accessory()?;

        accessory
            .claim(ACCESSORY_INTERFACE)
            .map_err(|kind| NegotiationError::ClaimFailed {
                interface: ACCESSORY_INTERFACE,
                kind,
            })?;
        info!("Interface claimed, ready to transfer data");

        Ok((version, accessory))
    }

    /// Step 1: read the 2-byte little-endian protocol version
    pub fn query_version(
        &mut self,
        session: &mut DeviceSession<T::Handle>,
    ) -> Result<AoaVersion, NegotiationError> {
        let mut response = [0u8; AoaVersion::RESPONSE_LEN];
        let received = session
            .io()
            .read_control(
                REQUEST_TYPE_VENDOR_IN,
                ACCESSORY_GET_PROTOCOL,
                0,
                0,
                &mut response,
                self.settings.control_timeout,
            )
            .map_err(|kind| {
                NegotiationError::VersionQueryFailed(VersionQueryFailure::Transport(kind))
            })?;

        AoaVersion::decode(&response[..received]).ok_or(NegotiationError::VersionQueryFailed(
            VersionQueryFailure::ShortResponse { received },
        ))
    }

    /// Step 3: send all six identification strings, index 0 through 5
    pub fn send_identification(
        &mut self,
        session: &mut DeviceSession<T::Handle>,
        identification: &AccessoryIdentification,
    ) -> Result<(), NegotiationError> {
        for (field, payload) in identification.payloads() {
            self.send_string(session, field, &payload)?;
        }
        Ok(())
    }

    fn send_string(
        &mut self,
        session: &mut DeviceSession<T::Handle>,
        field: IdentityField,
        payload: &[u8],
    ) -> Result<(), NegotiationError> {
        debug!("Sending {}: {} bytes", field, payload.len());
        session
            .io()
            .write_control(
                REQUEST_TYPE_VENDOR_OUT,
                ACCESSORY_SEND_STRING,
                0,
                field.index(),
                payload,
                self.settings.control_timeout,
            )
            .map_err(|kind| NegotiationError::IdentificationFailed { field, kind })?;
        Ok(())
    }

    /// Step 4: request 53 with no data stage
    pub fn start_accessory(
        &mut self,
        session: &mut DeviceSession<T::Handle>,
    ) -> Result<(), NegotiationError> {
        session
            .io()
            .write_control(
                REQUEST_TYPE_VENDOR_OUT,
                ACCESSORY_START,
                0,
                0,
                &[],
                self.settings.control_timeout,
            )
            .map_err(NegotiationError::ModeSwitchFailed)?;
        Ok(())
    }

    /// Step 6: poll for the accessory product id at a fixed interval
    pub fn await_accessory(&mut self) -> Result<DeviceSession<T::Handle>, NegotiationError> {
        let attempts = self.settings.reenumeration_attempts.max(1);
        let vendor_id = self.settings.vendor_id;
        let product_id = self.settings.accessory_product_id;

        for attempt in 1..=attempts {
            match DeviceSession::open(&mut *self.transport, vendor_id, product_id) {
                Ok(session) => {
                    info!(
                        "Accessory {:04x}:{:04x} opened on attempt {}",
                        vendor_id, product_id, attempt
                    );
                    return Ok(session);
                }
                Err(kind) => {
                    debug!(
                        "Accessory not present (attempt {}/{}): {}",
                        attempt, attempts, kind
                    );
                    if attempt < attempts {
                        self.sleeper.sleep(self.settings.reenumeration_interval);
                    }
                }
            }
        }

        Err(NegotiationError::ReenumerationTimeout { attempts })
    }
}
