//! Session transfer loop
//!
//! Bulk transfers over the endpoints found by the inspector. Every transfer
//! checks the cancellation token and the session deadline first, and its
//! timeout is clipped to whatever is left of the deadline.

use crate::usb::device::DeviceSession;
use common::{DeviceIo, MAX_TIMEOUT, NO_TIMEOUT};
use protocol::{EndpointPair, ErrorKind, TransferError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Smallest timeout handed to libusb; anything shorter would round to 0,
/// which libusb reads as "wait forever".
const MIN_TRANSFER_TIMEOUT: Duration = Duration::from_millis(1);

/// Transfer loop tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Timeout for each bulk read or write, `None` blocks until it completes
    pub transfer_timeout: Option<Duration>,
    /// Bound on the whole session, measured from loop creation
    pub deadline: Option<Duration>,
    pub short_read_len: usize,
    pub long_read_len: usize,
    pub loopback_packet_len: usize,
    pub loopback_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transfer_timeout: None,
            deadline: None,
            short_read_len: 16 * 1024,
            long_read_len: 500_000,
            loopback_packet_len: 64,
            loopback_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared flag to stop a session between transfers
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One completed read, borrowed for the duration of the callback
#[derive(Debug, Clone, Copy)]
pub struct ReadReport<'a> {
    pub step: &'static str,
    pub bytes: &'a [u8],
}

impl ReadReport<'_> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Receives each completed diagnostic read
pub trait ReadSink {
    fn on_read(&mut self, report: ReadReport<'_>);
}

impl<F> ReadSink for F
where
    F: FnMut(ReadReport<'_>),
{
    fn on_read(&mut self, report: ReadReport<'_>) {
        self(report)
    }
}

/// Byte counts of the diagnostic reads, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticSummary {
    pub reads: Vec<usize>,
}

impl DiagnosticSummary {
    pub fn total_bytes(&self) -> usize {
        self.reads.iter().sum()
    }
}

/// Result of the loopback test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackReport {
    /// (sent, received) for every byte of the packet
    pub pairs: Vec<(u8, u8)>,
    pub mismatches: usize,
}

impl LoopbackReport {
    fn from_exchange(sent: &[u8], received: &[u8]) -> Self {
        let pairs: Vec<(u8, u8)> = sent
            .iter()
            .copied()
            .zip(received.iter().copied())
            .collect();
        let mismatches = pairs.iter().filter(|(s, r)| s != r).count();
        Self { pairs, mismatches }
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches == 0
    }
}

impl fmt::Display for LoopbackReport {
    /// Rows of eight `sent:received` pairs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.pairs.chunks(8) {
            let cells: Vec<String> = row
                .iter()
                .map(|(sent, received)| format!("{:02x}:{:02x}", sent, received))
                .collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        write!(f, "{} mismatches", self.mismatches)
    }
}

/// Bulk transfer driver for a claimed accessory session
pub struct TransferLoop<'s, H: DeviceIo> {
    session: &'s mut DeviceSession<H>,
    endpoints: EndpointPair,
    settings: SessionSettings,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl<'s, H: DeviceIo> TransferLoop<'s, H> {
    /// Start the session clock; the deadline, if any, runs from here
    pub fn new(
        session: &'s mut DeviceSession<H>,
        endpoints: EndpointPair,
        settings: SessionSettings,
    ) -> Self {
        let deadline = settings.deadline.and_then(|d| {
            let deadline = Instant::now().checked_add(d);
            if deadline.is_none() {
                debug!("Deadline of {:?} is beyond the clock, running without one", d);
            }
            deadline
        });
        Self {
            session,
            endpoints,
            settings,
            deadline,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Read from bulk-IN into a caller buffer using the session transfer timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        self.read_step("read", buf, self.settings.transfer_timeout)
    }

    /// Write a caller buffer to bulk-OUT using the session transfer timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
        self.write_step("write", buf, self.settings.transfer_timeout)
    }

    /// Short read then long read, each reported to `sink`
    ///
    /// A zero-length read is still a successful read and the loop carries on.
    pub fn run_diagnostic<K: ReadSink>(
        &mut self,
        sink: &mut K,
    ) -> Result<DiagnosticSummary, TransferError> {
        let plan = [
            ("short", self.settings.short_read_len),
            ("long", self.settings.long_read_len),
        ];
        let mut buf = vec![0u8; self.settings.short_read_len.max(self.settings.long_read_len)];
        let mut summary = DiagnosticSummary::default();

        for (step, len) in plan {
            let timeout = self.settings.transfer_timeout;
            let received = self.read_step(step, &mut buf[..len], timeout)?;
            info!("read {} bytes", received);
            sink.on_read(ReadReport {
                step,
                bytes: &buf[..received],
            });
            summary.reads.push(received);
        }

        Ok(summary)
    }

    /// Send a counting pattern and compare what comes back
    pub fn run_loopback(&mut self) -> Result<LoopbackReport, TransferError> {
        let len = self.settings.loopback_packet_len;
        let timeout = Some(self.settings.loopback_timeout);
        let pattern: Vec<u8> = (0..len).map(|i| i as u8).collect();

        let written = self.write_step("loopback", &pattern, timeout)?;
        if written < len {
            warn!("Loopback wrote {} of {} bytes", written, len);
        }

        let mut buf = vec![0u8; len];
        let received = self.read_step("loopback", &mut buf, timeout)?;
        if received < len {
            return Err(TransferError::ShortRead {
                expected: len,
                actual: received,
            });
        }

        let report = LoopbackReport::from_exchange(&pattern, &buf);
        info!(
            "Loopback of {} bytes finished with {} mismatches",
            len, report.mismatches
        );
        Ok(report)
    }

    fn read_step(
        &mut self,
        step: &'static str,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransferError> {
        let timeout = self.transfer_timeout(timeout)?;
        let endpoint = self.endpoints.bulk_in;
        debug!("{} read of {} bytes from {:#04x}", step, buf.len(), endpoint);
        self.session
            .io()
            .read_bulk(endpoint, buf, timeout)
            .map_err(|kind| self.classify(kind, |kind| TransferError::Read { step, kind }))
    }

    fn write_step(
        &mut self,
        step: &'static str,
        buf: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransferError> {
        let timeout = self.transfer_timeout(timeout)?;
        let endpoint = self.endpoints.bulk_out;
        debug!("{} write of {} bytes to {:#04x}", step, buf.len(), endpoint);
        self.session
            .io()
            .write_bulk(endpoint, buf, timeout)
            .map_err(|kind| self.classify(kind, |kind| TransferError::Write { step, kind }))
    }

    /// Timeout for the next transfer, or why it must not start
    fn transfer_timeout(&self, requested: Option<Duration>) -> Result<Duration, TransferError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            info!("Session cancelled");
            return Err(TransferError::Cancelled);
        }

        let Some(deadline) = self.deadline else {
            return Ok(requested.map_or(NO_TIMEOUT, |timeout| timeout.min(MAX_TIMEOUT)));
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining < MIN_TRANSFER_TIMEOUT {
            return Err(TransferError::DeadlineExceeded);
        }
        let timeout = match requested {
            Some(timeout) => timeout.min(remaining),
            None => remaining,
        };
        Ok(timeout.min(MAX_TIMEOUT))
    }

    fn classify(
        &self,
        kind: ErrorKind,
        wrap: impl FnOnce(ErrorKind) -> TransferError,
    ) -> TransferError {
        let expired = self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        if kind == ErrorKind::Timeout && expired {
            TransferError::DeadlineExceeded
        } else {
            wrap(kind)
        }
    }
}
