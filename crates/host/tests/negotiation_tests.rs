//! Integration tests for the accessory handshake
//!
//! Drives the negotiator and the full run against the scripted transport:
//! - identification strings, order and lengths
//! - re-enumeration polling
//! - handle lifecycle across the mode switch
//! - end-to-end success and failure scenarios

use common::test_utils::{FakeEvent, FakeTransport};
use host::usb::{DeviceSession, NegotiationSettings, Negotiator, ReadReport};
use host::{HostConfig, RunError, RunOptions, run};
use protocol::{
    ACCESSORY_PRODUCT_ID, ACCESSORY_SEND_STRING, ACCESSORY_START, AccessoryIdentification,
    AoaVersion, DEFAULT_PRODUCT_ID, ErrorKind, GOOGLE_VENDOR_ID, IdentityField, NegotiationError,
};
use std::time::Duration;

fn discard(_: ReadReport<'_>) {}

fn negotiate(
    transport: &mut FakeTransport,
    identification: &AccessoryIdentification,
) -> Result<AoaVersion, NegotiationError> {
    let mut sleeper = transport.sleeper();
    let session = DeviceSession::open(transport, GOOGLE_VENDOR_ID, DEFAULT_PRODUCT_ID).unwrap();
    let mut negotiator = Negotiator::new(transport, &mut sleeper, NegotiationSettings::default());
    negotiator
        .negotiate(session, identification)
        .map(|(version, _)| version)
}

mod identification {
    use super::*;

    #[test]
    fn test_six_strings_in_index_order() {
        let mut transport = FakeTransport::new();
        let identification = AccessoryIdentification {
            manufacturer: "Acme".to_string(),
            model: "Widget".to_string(),
            description: "Test accessory".to_string(),
            version: "2.0".to_string(),
            uri: "https://example.com".to_string(),
            serial: "42".to_string(),
        };

        negotiate(&mut transport, &identification).unwrap();

        let strings: Vec<(u16, Vec<u8>)> = transport
            .control_out_requests()
            .into_iter()
            .filter(|(request, _, _)| *request == ACCESSORY_SEND_STRING)
            .map(|(_, index, data)| (index, data))
            .collect();

        assert_eq!(strings.len(), 6);
        for (position, (index, _)) in strings.iter().enumerate() {
            assert_eq!(*index as usize, position);
        }

        // Manufacturer goes without a terminator, the rest carry one
        assert_eq!(strings[0].1, b"Acme".to_vec());
        assert_eq!(strings[1].1, b"Widget\0".to_vec());
        assert_eq!(strings[2].1.len(), "Test accessory".len() + 1);
        assert_eq!(strings[3].1, b"2.0\0".to_vec());
        assert_eq!(strings[4].1.len(), "https://example.com".len() + 1);
        assert_eq!(strings[5].1, b"42\0".to_vec());
    }

    #[test]
    fn test_start_follows_last_string() {
        let mut transport = FakeTransport::new();
        negotiate(&mut transport, &AccessoryIdentification::default()).unwrap();

        let requests = transport.control_out_requests();
        assert_eq!(requests.len(), 7);
        assert_eq!(requests[5].1, IdentityField::Serial.index());
        assert_eq!(requests[6], (ACCESSORY_START, 0, Vec::new()));
    }

    #[test]
    fn test_identification_failure_stops_handshake() {
        let mut transport =
            FakeTransport::new().fail_control_out(ACCESSORY_SEND_STRING, 3, ErrorKind::Pipe);

        let err = negotiate(&mut transport, &AccessoryIdentification::default()).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::IdentificationFailed {
                field: IdentityField::Version,
                kind: ErrorKind::Pipe
            }
        );
        assert_eq!(err.kind(), Some(ErrorKind::Pipe));

        let indices: Vec<u16> = transport
            .control_out_requests()
            .iter()
            .map(|(_, index, _)| *index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(transport.open_attempts(ACCESSORY_PRODUCT_ID), 0);
    }
}

mod polling {
    use super::*;

    #[test]
    fn test_success_at_each_attempt() {
        for attempt in 1..=5u32 {
            let mut transport = FakeTransport::new().fail_opens(ACCESSORY_PRODUCT_ID, attempt - 1);

            negotiate(&mut transport, &AccessoryIdentification::default())
                .unwrap_or_else(|e| panic!("attempt {}: {}", attempt, e));

            assert_eq!(
                transport.open_attempts(ACCESSORY_PRODUCT_ID),
                attempt as usize
            );
            let waits: Vec<Duration> = transport
                .sleeps()
                .into_iter()
                .filter(|d| *d >= Duration::from_secs(1))
                .collect();
            assert_eq!(waits.len(), (attempt - 1) as usize);
        }
    }

    #[test]
    fn test_timeout_after_five_attempts() {
        let mut transport = FakeTransport::new().fail_opens(ACCESSORY_PRODUCT_ID, 5);

        let err = negotiate(&mut transport, &AccessoryIdentification::default()).unwrap_err();
        assert_eq!(err, NegotiationError::ReenumerationTimeout { attempts: 5 });
        assert_eq!(transport.open_attempts(ACCESSORY_PRODUCT_ID), 5);
    }

    #[test]
    fn test_configured_attempts_and_interval() {
        let mut transport = FakeTransport::new().never_opens(ACCESSORY_PRODUCT_ID);
        let mut sleeper = transport.sleeper();
        let settings = NegotiationSettings {
            reenumeration_attempts: 3,
            reenumeration_interval: Duration::from_millis(250),
            ..Default::default()
        };
        let mut negotiator = Negotiator::new(&mut transport, &mut sleeper, settings);

        let err = negotiator.await_accessory().err();
        assert_eq!(err, Some(NegotiationError::ReenumerationTimeout { attempts: 3 }));
        assert_eq!(
            transport.sleeps(),
            vec![Duration::from_millis(250), Duration::from_millis(250)]
        );
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_old_handle_closed_before_accessory_open() {
        let mut transport = FakeTransport::new();
        negotiate(&mut transport, &AccessoryIdentification::default()).unwrap();

        let events = transport.events();
        let closed = events
            .iter()
            .position(|e| *e == FakeEvent::Close { handle: 1 })
            .unwrap();
        let reopened = events
            .iter()
            .position(|e| {
                matches!(e, FakeEvent::Open { product_id, .. } if *product_id == ACCESSORY_PRODUCT_ID)
            })
            .unwrap();
        assert!(closed < reopened);
    }

    #[test]
    fn test_claim_failure_is_fatal() {
        let mut transport = FakeTransport::new().fail_claim(ACCESSORY_PRODUCT_ID, ErrorKind::Busy);

        let err = negotiate(&mut transport, &AccessoryIdentification::default()).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::ClaimFailed {
                interface: 0,
                kind: ErrorKind::Busy
            }
        );
        // The accessory handle is closed on the way out
        assert_eq!(transport.events().last(), Some(&FakeEvent::Close { handle: 2 }));
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn test_full_run_reports_version_and_claims_interface() {
        let mut transport = FakeTransport::new()
            .with_version_response(Ok(vec![0x00, 0x01]))
            .push_bulk_in(Ok(b"hello".to_vec()))
            .push_bulk_in(Ok(b"world".to_vec()));
        let mut sleeper = transport.sleeper();

        let summary = run(
            &mut transport,
            &mut sleeper,
            &HostConfig::default(),
            RunOptions::default(),
            &mut discard,
        )
        .unwrap();

        assert_eq!(summary.version, Some(AoaVersion(256)));
        assert!(transport.events().contains(&FakeEvent::Claim {
            handle: 2,
            interface: 0
        }));
        assert_eq!(summary.diagnostic.unwrap().reads, vec![5, 5]);

        // Teardown releases before closing
        let events = transport.events();
        let tail = &events[events.len() - 2..];
        assert_eq!(
            tail,
            &[
                FakeEvent::Release {
                    handle: 2,
                    interface: 0
                },
                FakeEvent::Close { handle: 2 }
            ]
        );
    }

    #[test]
    fn test_run_fails_on_identification_error() {
        let mut transport =
            FakeTransport::new().fail_control_out(ACCESSORY_SEND_STRING, 3, ErrorKind::Pipe);
        let mut sleeper = transport.sleeper();

        let err = run(
            &mut transport,
            &mut sleeper,
            &HostConfig::default(),
            RunOptions::default(),
            &mut discard,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RunError::Negotiation(NegotiationError::IdentificationFailed {
                field: IdentityField::Version,
                ..
            })
        ));
        assert!(
            !transport
                .control_out_requests()
                .iter()
                .any(|(request, index, _)| *request == ACCESSORY_START || *index > 3)
        );
    }

    #[test]
    fn test_version_zero_still_negotiates() {
        let mut transport = FakeTransport::new().with_version_response(Ok(vec![0x00, 0x00]));

        let version = negotiate(&mut transport, &AccessoryIdentification::default()).unwrap();
        assert_eq!(version, AoaVersion(0));
        assert!(!version.supports_accessory());
    }

    #[test]
    fn test_pre_negotiation_claim_failure_is_tolerated() {
        let mut transport = FakeTransport::new()
            .fail_claim(DEFAULT_PRODUCT_ID, ErrorKind::Busy)
            .push_bulk_in(Ok(vec![]))
            .push_bulk_in(Ok(vec![]));
        let mut sleeper = transport.sleeper();

        let summary = run(
            &mut transport,
            &mut sleeper,
            &HostConfig::default(),
            RunOptions::default(),
            &mut discard,
        )
        .unwrap();
        assert_eq!(summary.version, Some(AoaVersion(2)));
    }
}
