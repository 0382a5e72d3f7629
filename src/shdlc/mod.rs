//! SHDLC frame codec (C1): byte-stuffing, checksum and structural
//! validation of the wire format used by the SPS30's UART interface.
//!
//! These functions are pure and total on their inputs; all I/O lives in
//! [`crate::transport`].

mod error;
pub use error::{EncodeError, FrameError};

const ADDR: u8 = 0x00;
pub(crate) const FRAME_BOUNDARY: u8 = 0x7E;
const ESCAPE_MARKER: u8 = 0x7D;
const MAX_PAYLOAD_LEN: usize = 255;
/// Header fields preceding the payload in a decoded body: addr, cmd, state, len.
const HEADER_LEN: usize = 4;

/// A structurally valid, checksum-verified response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub addr: u8,
    pub cmd: u8,
    pub state: u8,
    pub payload: Vec<u8>,
}

/// Checksum as per the datasheet's SHDLC frame layer section: the
/// one's complement of the truncated sum of every byte in `data`.
fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte));
    !sum
}

fn needs_escape(byte: u8) -> bool {
    matches!(byte, FRAME_BOUNDARY | ESCAPE_MARKER | 0x11 | 0x13)
}

fn escape(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    for &byte in body {
        if needs_escape(byte) {
            out.push(ESCAPE_MARKER);
            out.push(byte ^ 0x20);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Reverses [`escape`]. Exposed directly because callers (and the test
/// suite) need to unstuff a raw read independently of full frame decoding.
pub fn unescape(stream: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(stream.len());
    let mut iter = stream.iter();
    while let Some(&byte) = iter.next() {
        if byte == ESCAPE_MARKER {
            let &next = iter.next().ok_or(FrameError::DanglingEscape)?;
            out.push(next ^ 0x20);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Encodes a `(cmd, payload)` request tuple into wire bytes: builds the
/// unescaped body, appends the checksum, byte-stuffs the body and frames
/// it with sentinels. Fails if `payload` cannot fit the one-byte length
/// field.
pub fn encode(cmd: u8, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError { len: payload.len() });
    }

    let mut body = Vec::with_capacity(HEADER_LEN - 1 + payload.len() + 1);
    body.push(ADDR);
    body.push(cmd);
    body.push(payload.len() as u8);
    body.extend_from_slice(payload);
    body.push(checksum(&body));

    let mut frame = Vec::with_capacity(2 + body.len() * 2);
    frame.push(FRAME_BOUNDARY);
    frame.extend(escape(&body));
    frame.push(FRAME_BOUNDARY);
    Ok(frame)
}

/// Decodes and validates a response frame: sentinels, byte-unstuffing,
/// positional field parsing and checksum verification.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame, FrameError> {
    if frame.len() < 2 {
        return Err(FrameError::Truncated {
            declared: 0,
            available: frame.len(),
        });
    }
    let last = frame.len() - 1;
    if frame[0] != FRAME_BOUNDARY {
        return Err(FrameError::Sentinel {
            position: 0,
            expected: FRAME_BOUNDARY,
            got: frame[0],
        });
    }
    if frame[last] != FRAME_BOUNDARY {
        return Err(FrameError::Sentinel {
            position: last,
            expected: FRAME_BOUNDARY,
            got: frame[last],
        });
    }

    let body = unescape(&frame[1..last])?;
    if body.len() < HEADER_LEN {
        return Err(FrameError::Truncated {
            declared: 0,
            available: body.len(),
        });
    }

    let addr = body[0];
    let cmd = body[1];
    let state = body[2];
    let len = body[3] as usize;

    let cksum_index = HEADER_LEN + len;
    if body.len() <= cksum_index || body.len() != cksum_index + 1 {
        return Err(FrameError::Truncated {
            declared: len,
            available: body.len().saturating_sub(HEADER_LEN),
        });
    }

    let payload = body[HEADER_LEN..cksum_index].to_vec();
    let got = body[cksum_index];
    let expected = checksum(&body[..cksum_index]);
    if got != expected {
        return Err(FrameError::Checksum { expected, got });
    }

    Ok(DecodedFrame {
        addr,
        cmd,
        state,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[&str]) -> Vec<u8> {
        bytes
            .iter()
            .map(|b| u8::from_str_radix(b.trim_start_matches("0x"), 16).unwrap())
            .collect()
    }

    #[test]
    fn encode_start_measurement() {
        let got = encode(0x00, &[0x01, 0x03]).unwrap();
        assert_eq!(got, hex(&["7E", "00", "00", "02", "01", "03", "F9", "7E"]));
    }

    #[test]
    fn encode_stop_measurement() {
        let got = encode(0x01, &[]).unwrap();
        assert_eq!(got, hex(&["7E", "00", "01", "00", "FE", "7E"]));
    }

    #[test]
    fn encode_read_values() {
        let got = encode(0x03, &[]).unwrap();
        assert_eq!(got, hex(&["7E", "00", "03", "00", "FC", "7E"]));
    }

    #[test]
    fn encode_read_auto_cleaning_interval() {
        let got = encode(0x80, &[0x00]).unwrap();
        assert_eq!(got, hex(&["7E", "00", "80", "01", "00", "7D", "5E", "7E"]));
    }

    #[test]
    fn encode_write_auto_cleaning_interval() {
        let got = encode(0x80, &[0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(
            got,
            hex(&[
                "7E", "00", "80", "05", "00", "00", "00", "00", "00", "7A", "7E"
            ])
        );
    }

    #[test]
    fn encode_start_fan_cleaning() {
        let got = encode(0x56, &[]).unwrap();
        assert_eq!(got, hex(&["7E", "00", "56", "00", "A9", "7E"]));
    }

    #[test]
    fn encode_device_info_variants() {
        assert_eq!(
            encode(0xD0, &[0x01]).unwrap(),
            hex(&["7E", "00", "D0", "01", "01", "2D", "7E"])
        );
        assert_eq!(
            encode(0xD0, &[0x02]).unwrap(),
            hex(&["7E", "00", "D0", "01", "02", "2C", "7E"])
        );
        assert_eq!(
            encode(0xD0, &[0x03]).unwrap(),
            hex(&["7E", "00", "D0", "01", "03", "2B", "7E"])
        );
    }

    #[test]
    fn encode_device_reset() {
        let got = encode(0xD3, &[]).unwrap();
        assert_eq!(got, hex(&["7E", "00", "D3", "00", "2C", "7E"]));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; 256];
        let err = encode(0x00, &payload).unwrap_err();
        assert_eq!(err, EncodeError { len: 256 });
    }

    #[test]
    fn encode_accepts_max_payload() {
        let payload = vec![0x7Eu8; 255];
        let frame = encode(0x00, &payload).unwrap();
        // every payload byte needed stuffing, plus header/footer.
        assert!(frame.len() <= 6 + 255 + 255);
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn round_trip_arbitrary_payload() {
        for payload in [
            vec![],
            vec![0x00],
            vec![0x01, 0x02, 0x03, 0xFF],
            (0u8..=250).collect::<Vec<_>>(),
        ] {
            let cmd = 0x42;
            let frame = encode(cmd, &payload).unwrap();
            let decoded = decode(&frame).unwrap();
            assert_eq!(decoded.cmd, cmd);
            assert_eq!(decoded.addr, 0);
            assert_eq!(decoded.payload, payload);
        }
    }

    #[test]
    fn unescape_every_escape_triggering_byte() {
        let stuffed = hex(&["7D", "5E", "7D", "5D", "7D", "31", "7D", "33", "00", "7E", "7E"]);
        let got = unescape(&stuffed).unwrap();
        assert_eq!(got, hex(&["7E", "7D", "11", "13", "00", "7E", "7E"]));
    }

    #[test]
    fn unescape_dangling_escape_is_an_error() {
        let err = unescape(&[0x00, ESCAPE_MARKER]).unwrap_err();
        assert_eq!(err, FrameError::DanglingEscape);
    }

    #[test]
    fn decode_wrong_leading_sentinel() {
        let frame = hex(&["7F", "00", "80", "01", "00", "7D", "5E", "7E"]);
        let err = decode(&frame).unwrap_err();
        assert_eq!(
            err,
            FrameError::Sentinel {
                position: 0,
                expected: 0x7E,
                got: 0x7F
            }
        );
    }

    #[test]
    fn decode_with_device_error_state() {
        // cmd=0x80, state=0x01 (wrong data length), len=0x00 -> empty payload
        let frame = hex(&["7E", "00", "80", "01", "00", "7D", "5E", "7E"]);
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.cmd, 0x80);
        assert_eq!(decoded.state, 0x01);
        assert_eq!(decoded.payload, Vec::<u8>::new());
    }

    #[test]
    fn decode_ambiguous_length_produces_one_well_defined_error() {
        // S6: length field says 1 byte of payload but only enough unescaped
        // bytes remain for the checksum to be missing.
        let frame = hex(&["7E", "00", "80", "01", "01", "7D", "5E", "7E"]);
        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
    }

    #[test]
    fn checksum_sensitivity_bit_flip() {
        let mut frame = encode(0x00, &[0x01, 0x03]).unwrap();
        // flip a bit inside the body, not a sentinel.
        let target = 2; // the cmd byte
        frame[target] ^= 0x01;
        let err = decode(&frame).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Checksum { .. } | FrameError::Truncated { .. }
        ));
    }

    #[test]
    fn empty_payload_checksum_is_over_addr_cmd_len_only() {
        let frame = encode(0x01, &[]).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.payload, Vec::<u8>::new());
    }
}
