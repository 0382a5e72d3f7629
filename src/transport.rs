//! Serial transport (C2): scoped acquisition of the UART plus
//! write-all / read-until-frame-boundary operations bounded by a
//! timeout.

use std::io::{self, Read as _, Write as _};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::trace;

use crate::shdlc::FRAME_BOUNDARY;

/// Fixed line configuration for the SPS30's UART, per the datasheet.
pub const BAUD_RATE: u32 = 115_200;
/// Read timeout applied to a whole `read_until_sentinel` call.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1_500);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port:?}: {source}")]
    OpenFailed {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
    /// The read deadline elapsed before a full frame was observed. Carries
    /// whatever bytes had been read so far, for diagnostics.
    #[error("read timed out after {0:?} bytes read so far", .0.len())]
    Timeout(Vec<u8>),
}

/// Anything C3 (the transaction engine) needs from the serial line.
/// Implemented by [`SerialTransport`]; mocked in tests.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn read_until_sentinel(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// Owns the open UART handle. Exclusive: only one engine may hold a
/// `SerialTransport` at a time. Closing is automatic on drop, so every
/// exit path (normal return, `?`, panic unwind) releases the OS handle.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Opens `port_name` at the sensor's fixed line configuration
    /// (115200 8N1, no flow control, 1.5s read timeout). Since a
    /// `SerialTransport` owns its handle exclusively and is dropped before
    /// a new one is opened, there is never a stale handle from a crashed
    /// predecessor to close first: open is always on a fresh OS handle.
    pub fn open(port_name: &str) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| TransportError::OpenFailed {
                port: port_name.to_owned(),
                source,
            })?;
        trace!(port = port_name, "serial port opened");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        trace!(len = bytes.len(), "wrote request frame");
        Ok(())
    }

    /// Reads bytes until a second [`FRAME_BOUNDARY`] is observed (the
    /// first bounds the frame's start, the second its end) or `timeout`
    /// elapses, whichever comes first.
    fn read_until_sentinel(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut frame = Vec::new();
        let mut boundaries_seen = 0usize;
        let mut byte = [0u8; 1];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(frame));
            }

            match self.port.read(&mut byte) {
                Ok(0) => continue,
                Ok(_) => {
                    frame.push(byte[0]);
                    if byte[0] == FRAME_BOUNDARY {
                        boundaries_seen += 1;
                        if boundaries_seen == 2 {
                            trace!(len = frame.len(), "read response frame");
                            return Ok(frame);
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout(frame));
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        trace!("serial port closed");
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// A canned `Transport` for engine/command-layer tests: returns one
    /// queued response per `read_until_sentinel` call and records every
    /// write it is given.
    pub(crate) struct MockTransport {
        pub writes: Vec<Vec<u8>>,
        responses: VecDeque<Result<Vec<u8>, TransportError>>,
    }

    impl MockTransport {
        pub(crate) fn new(responses: Vec<Vec<u8>>) -> Self {
            Self {
                writes: Vec::new(),
                responses: responses.into_iter().map(Ok).collect(),
            }
        }

        pub(crate) fn with_results(results: Vec<Result<Vec<u8>, TransportError>>) -> Self {
            Self {
                writes: Vec::new(),
                responses: results.into(),
            }
        }
    }

    impl Transport for MockTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn read_until_sentinel(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Timeout(Vec::new())))
        }
    }
}
