//! SHDLC transaction engine (C3): drives one request/response
//! transaction over a [`Transport`], cross-checking the response
//! against the command just sent and mapping the device's state byte to
//! a success/error outcome.

use thiserror::Error;
use tracing::{debug, warn};

use crate::shdlc::{self, DecodedFrame};
use crate::transport::{Transport, TransportError, READ_TIMEOUT};

const EXPECTED_ADDR: u8 = 0x00;
const KNOWN_STATES: [u8; 7] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x28, 0x43];

/// A well-formed frame that violates transaction expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("response address {got:#04x} is not the sensor address {expected:#04x}")]
    Address { expected: u8, got: u8 },
    #[error("response cmd {got:#04x} does not match the request cmd {expected:#04x}")]
    CommandMismatch { expected: u8, got: u8 },
    #[error("response state byte {got:#04x} is not a documented state code")]
    UnknownState { got: u8 },
}

/// A well-formed response whose state byte is one of the six documented
/// device error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("wrong data length for this command")]
    WrongDataLength,
    #[error("unknown command")]
    UnknownCommand,
    #[error("no access right for command")]
    NoAccessRight,
    #[error("illegal command parameter or out of allowed range")]
    IllegalParameter,
    #[error("internal function argument out of range")]
    InternalArgumentOutOfRange,
    #[error("command not allowed in current state")]
    NotAllowedInCurrentState,
}

impl DeviceError {
    /// The numeric device state code this variant was decoded from.
    pub fn code(self) -> u8 {
        match self {
            DeviceError::WrongDataLength => 0x01,
            DeviceError::UnknownCommand => 0x02,
            DeviceError::NoAccessRight => 0x03,
            DeviceError::IllegalParameter => 0x04,
            DeviceError::InternalArgumentOutOfRange => 0x28,
            DeviceError::NotAllowedInCurrentState => 0x43,
        }
    }

    /// Builds a `DeviceError` from one of the six documented state codes.
    /// Only called once [`ProtocolError::UnknownState`] has already ruled
    /// out anything else, so this never needs a fallback arm.
    fn from_known_state(state: u8) -> Self {
        match state {
            0x01 => DeviceError::WrongDataLength,
            0x02 => DeviceError::UnknownCommand,
            0x03 => DeviceError::NoAccessRight,
            0x04 => DeviceError::IllegalParameter,
            0x28 => DeviceError::InternalArgumentOutOfRange,
            0x43 => DeviceError::NotAllowedInCurrentState,
            _ => unreachable!("state already validated against KNOWN_STATES"),
        }
    }
}

/// Everything that can go wrong driving one SHDLC transaction.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Encode(#[from] shdlc::EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Frame(#[from] shdlc::FrameError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Drives request/response transactions over one [`Transport`]. Not
/// reentrant: callers must serialise their own access, matching the
/// sensor's half-duplex, single-outstanding-request link.
pub struct Engine<T> {
    transport: T,
    last_cmd: Option<u8>,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            last_cmd: None,
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Encodes, sends, and reads back one command, validating the
    /// response in the order spec'd: address, command match, known
    /// state, then device error mapping. Returns the response payload on
    /// success.
    pub fn transact(&mut self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let frame = shdlc::encode(cmd, payload)?;
        self.transport.write_all(&frame)?;
        self.last_cmd = Some(cmd);

        let raw = self.transport.read_until_sentinel(READ_TIMEOUT)?;
        let DecodedFrame {
            addr,
            cmd: resp_cmd,
            state,
            payload,
        } = shdlc::decode(&raw)?;

        if addr != EXPECTED_ADDR {
            return Err(ProtocolError::Address {
                expected: EXPECTED_ADDR,
                got: addr,
            }
            .into());
        }

        let expected_cmd = self.last_cmd.expect("just set above");
        if resp_cmd != expected_cmd {
            warn!(expected_cmd, resp_cmd, "SHDLC command mismatch");
            return Err(ProtocolError::CommandMismatch {
                expected: expected_cmd,
                got: resp_cmd,
            }
            .into());
        }

        if !KNOWN_STATES.contains(&state) {
            return Err(ProtocolError::UnknownState { got: state }.into());
        }

        if state != 0x00 {
            let device_err = DeviceError::from_known_state(state);
            warn!(cmd, state, %device_err, "device reported error state");
            return Err(device_err.into());
        }

        debug!(cmd, len = payload.len(), "transaction succeeded");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn engine_with(responses: Vec<Vec<u8>>) -> Engine<MockTransport> {
        Engine::new(MockTransport::new(responses))
    }

    #[test]
    fn successful_transaction_returns_payload() {
        // stop_measurement: cmd=0x01, empty payload, state=0
        let response = shdlc::encode(0x01, &[]).unwrap();
        let mut engine = engine_with(vec![response]);
        let payload = engine.transact(0x01, &[]).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn command_mismatch_is_detected() {
        // engine sends cmd 0x01 but the frame on the wire reports cmd 0x03
        let mismatched = shdlc::encode(0x03, &[]).unwrap();
        let mut engine = engine_with(vec![mismatched]);
        let err = engine.transact(0x01, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::CommandMismatch {
                expected: 0x01,
                got: 0x03
            })
        ));
    }

    #[test]
    fn wrong_address_is_detected() {
        // hand-build a frame with addr=0x01 instead of 0x00
        let body = [0x01u8, 0x01, 0x00, 0x00];
        let cksum = !body.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        let frame = [&[0x7E][..], &body, &[cksum], &[0x7E]].concat();
        let mut engine = engine_with(vec![frame]);
        let err = engine.transact(0x01, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::Address {
                expected: 0x00,
                got: 0x01
            })
        ));
    }

    #[test]
    fn state_to_error_mapping_covers_every_documented_code() {
        let cases: [(u8, fn(DeviceError) -> bool); 6] = [
            (0x01, |e| matches!(e, DeviceError::WrongDataLength)),
            (0x02, |e| matches!(e, DeviceError::UnknownCommand)),
            (0x03, |e| matches!(e, DeviceError::NoAccessRight)),
            (0x04, |e| matches!(e, DeviceError::IllegalParameter)),
            (0x28, |e| {
                matches!(e, DeviceError::InternalArgumentOutOfRange)
            }),
            (0x43, |e| matches!(e, DeviceError::NotAllowedInCurrentState)),
        ];
        for (state, matches_variant) in cases {
            // cmd=0x80, given state, empty payload
            let body = [0x00u8, 0x80, state, 0x00];
            let cksum = !body.iter().fold(0u8, |a, &b| a.wrapping_add(b));
            let frame = [&[0x7E][..], &body, &[cksum], &[0x7E]].concat();
            let mut engine = engine_with(vec![frame]);
            let err = engine.transact(0x80, &[0x00]).unwrap_err();
            let Error::Device(device_err) = err else {
                panic!("expected Device error for state {state:#04x}, got {err:?}");
            };
            assert_eq!(device_err.code(), state);
            assert!(matches_variant(device_err));
        }
    }

    #[test]
    fn unknown_state_is_a_protocol_error() {
        let body = [0x00u8, 0x80, 0x99, 0x00];
        let cksum = !body.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        let frame = [&[0x7E][..], &body, &[cksum], &[0x7E]].concat();
        let mut engine = engine_with(vec![frame]);
        let err = engine.transact(0x80, &[0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnknownState { got: 0x99 })
        ));
    }

    #[test]
    fn documented_scenario_s2_wrong_data_length() {
        // decode(7E 00 80 01 00 7D 5E 7E) with last_cmd=0x80 must report
        // DeviceError::WrongDataLength because state=0x01.
        let frame = vec![0x7E, 0x00, 0x80, 0x01, 0x00, 0x7D, 0x5E, 0x7E];
        let mut engine = engine_with(vec![frame]);
        let err = engine.transact(0x80, &[0x00]).unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::WrongDataLength)));
    }

    #[test]
    fn timeout_propagates_as_transport_error() {
        let mut engine = Engine::new(MockTransport::with_results(vec![Err(
            TransportError::Timeout(vec![0x7E, 0x00]),
        )]));
        let err = engine.transact(0x03, &[]).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
    }
}
