//! A host-side driver for the Sensirion SPS30 (UART Particulate Matter
//! Sensor), speaking the SHDLC framing layer described in section 4.1 of
//! the datasheet.
//!
//! The crate is layered bottom to top:
//!
//! - [`shdlc`] — the frame codec (C1): encode/decode/unescape, pure and
//!   total on their inputs.
//! - [`transport`] — the serial transport (C2): scoped acquisition of the
//!   UART plus write/read-until-frame-boundary.
//! - [`engine`] — the transaction engine (C3): one request/response
//!   round trip, with device-state decoding.
//! - [`sps30`] — the typed command layer (C4): one method per datasheet
//!   command, used as [`Sps30`].
//! - [`sink`] — the sample sink adapter (C5): the contract toward an
//!   external time-series store, specified only by interface.
//!
//! # References
//!
//! - [SPS30 data sheet][1]
//!
//! [1]: https://www.sensirion.com/fileadmin/user_upload/customers/sensirion/Dokumente/0_Datasheets/Particulate_Matter/Sensirion_PM_Sensors_SPS30_Datasheet.pdf

pub mod config;
pub mod engine;
pub mod shdlc;
pub mod sink;
pub mod sps30;
pub mod transport;

pub use engine::Engine;
pub use shdlc::{decode, encode, unescape, DecodedFrame};
pub use sink::{Sample, SampleSink, SinkError};
pub use sps30::{DeviceInfoKind, Error, Measurement, Sps30};
pub use transport::{SerialTransport, Transport, TransportError};
