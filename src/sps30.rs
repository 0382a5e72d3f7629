//! SPS30 command layer (C4): one operation per datasheet command.
//! Encodes argument tuples, parses payloads, and returns domain values.

use std::collections::BTreeMap;
use std::mem::size_of;
use std::thread::sleep;
use std::time::Duration;

use thiserror::Error;

use crate::engine::{Engine, Error as EngineError};
use crate::transport::Transport;

mod command {
    pub const START_MEASUREMENT: u8 = 0x00;
    pub const STOP_MEASUREMENT: u8 = 0x01;
    pub const READ_VALUES: u8 = 0x03;
    pub const START_FAN_CLEANING: u8 = 0x56;
    pub const AUTO_CLEANING_INTERVAL: u8 = 0x80;
    pub const DEVICE_INFO: u8 = 0xD0;
    pub const RESET: u8 = 0xD3;
}

/// Measurement output format requested by `start_measurement`: IEEE754 float.
const START_SUBCOMMAND: u8 = 0x01;
const START_FORMAT_FLOAT: u8 = 0x03;
/// Sub-command byte shared by the read and write shapes of `0x80`.
const AUTO_CLEANING_SUBCOMMAND: u8 = 0x00;

const MEASUREMENT_FIELD_COUNT: usize = 10;
const MEASUREMENT_PAYLOAD_LEN: usize = MEASUREMENT_FIELD_COUNT * size_of::<f32>();

/// Minimum time the fan must run after [`Sps30::start_measurement`]
/// before readings are considered valid. A documented policy, not
/// enforced by `start_measurement` itself (spec.md §4.4).
pub const WARM_UP: Duration = Duration::from_secs(10);

/// Factory-default auto-cleaning interval: one week, in seconds.
pub const AUTO_CLEANING_INTERVAL_DEFAULT: u32 = 604_800;

/// Which device-information sub-command to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInfoKind {
    ProductName,
    ArticleCode,
    SerialNumber,
}

impl DeviceInfoKind {
    fn subcommand(self) -> u8 {
        match self {
            DeviceInfoKind::ProductName => 1,
            DeviceInfoKind::ArticleCode => 2,
            DeviceInfoKind::SerialNumber => 3,
        }
    }
}

/// The ten-field measurement sample read by `read_measured_values`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub mass_concentration_pm1_0: f32,
    pub mass_concentration_pm2_5: f32,
    pub mass_concentration_pm4_0: f32,
    pub mass_concentration_pm10: f32,
    pub number_concentration_pm0_5: f32,
    pub number_concentration_pm1_0: f32,
    pub number_concentration_pm2_5: f32,
    pub number_concentration_pm4_0: f32,
    pub number_concentration_pm10: f32,
    pub typical_particle_size: f32,
}

impl Measurement {
    /// Field names exactly as the datasheet and downstream sinks expect
    /// them, in on-wire order.
    pub const FIELD_NAMES: [&'static str; MEASUREMENT_FIELD_COUNT] = [
        "mass_concentration_PM1_0",
        "mass_concentration_PM2_5",
        "mass_concentration_PM4_0",
        "mass_concentration_PM10",
        "number_concentration_PM0_5",
        "number_concentration_PM1_0",
        "number_concentration_PM2_5",
        "number_concentration_PM4_0",
        "number_concentration_PM10",
        "typical_particle_size",
    ];

    fn from_payload(data: &[u8]) -> Result<Self, Error> {
        if data.len() != MEASUREMENT_PAYLOAD_LEN {
            return Err(Error::MeasurementPayloadLength {
                expected: MEASUREMENT_PAYLOAD_LEN,
                got: data.len(),
            });
        }
        let mut floats = data
            .chunks_exact(size_of::<f32>())
            .map(|chunk| f32::from_be_bytes(chunk.try_into().expect("chunks_exact(4)")));

        Ok(Self {
            mass_concentration_pm1_0: floats.next().expect("length checked above"),
            mass_concentration_pm2_5: floats.next().expect("length checked above"),
            mass_concentration_pm4_0: floats.next().expect("length checked above"),
            mass_concentration_pm10: floats.next().expect("length checked above"),
            number_concentration_pm0_5: floats.next().expect("length checked above"),
            number_concentration_pm1_0: floats.next().expect("length checked above"),
            number_concentration_pm2_5: floats.next().expect("length checked above"),
            number_concentration_pm4_0: floats.next().expect("length checked above"),
            number_concentration_pm10: floats.next().expect("length checked above"),
            typical_particle_size: floats.next().expect("length checked above"),
        })
    }

    fn as_values(&self) -> [f32; MEASUREMENT_FIELD_COUNT] {
        [
            self.mass_concentration_pm1_0,
            self.mass_concentration_pm2_5,
            self.mass_concentration_pm4_0,
            self.mass_concentration_pm10,
            self.number_concentration_pm0_5,
            self.number_concentration_pm1_0,
            self.number_concentration_pm2_5,
            self.number_concentration_pm4_0,
            self.number_concentration_pm10,
            self.typical_particle_size,
        ]
    }

    fn from_values(values: [f32; MEASUREMENT_FIELD_COUNT]) -> Self {
        Self {
            mass_concentration_pm1_0: values[0],
            mass_concentration_pm2_5: values[1],
            mass_concentration_pm4_0: values[2],
            mass_concentration_pm10: values[3],
            number_concentration_pm0_5: values[4],
            number_concentration_pm1_0: values[5],
            number_concentration_pm2_5: values[6],
            number_concentration_pm4_0: values[7],
            number_concentration_pm10: values[8],
            typical_particle_size: values[9],
        }
    }

    /// Maps this sample onto the field -> value mapping the sink
    /// interface (C5) expects, using the datasheet's field names.
    pub fn to_fields(self) -> BTreeMap<&'static str, f64> {
        Self::FIELD_NAMES
            .into_iter()
            .zip(self.as_values())
            .map(|(name, value)| (name, value as f64))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("measurement payload was {got} bytes, expected {expected}")]
    MeasurementPayloadLength { expected: usize, got: usize },
    #[error("auto-cleaning interval payload was {got} bytes, expected 4")]
    IntervalPayloadLength { got: usize },
    #[error("device information string was not valid UTF-8")]
    DeviceInfoNotUtf8(#[source] std::string::FromUtf8Error),
}

/// Typed facade over the SHDLC engine: one method per datasheet command.
pub struct Sps30<T> {
    engine: Engine<T>,
}

impl<T: Transport> Sps30<T> {
    pub fn new(transport: T) -> Self {
        Self {
            engine: Engine::new(transport),
        }
    }

    pub fn into_transport(self) -> T {
        self.engine.into_transport()
    }

    /// Starts measurement mode, requesting IEEE754 float output. After
    /// this returns, wait at least [`WARM_UP`] before trusting values
    /// from [`Self::read_measured_values`]; this function does not wait
    /// for you.
    pub fn start_measurement(&mut self) -> Result<(), Error> {
        self.engine
            .transact(
                command::START_MEASUREMENT,
                &[START_SUBCOMMAND, START_FORMAT_FLOAT],
            )
            .map(drop)
            .map_err(Error::from)
    }

    pub fn stop_measurement(&mut self) -> Result<(), Error> {
        self.engine
            .transact(command::STOP_MEASUREMENT, &[])
            .map(drop)
            .map_err(Error::from)
    }

    pub fn read_measured_values(&mut self) -> Result<Measurement, Error> {
        let payload = self.engine.transact(command::READ_VALUES, &[])?;
        Measurement::from_payload(&payload)
    }

    pub fn read_auto_cleaning_interval(&mut self) -> Result<u32, Error> {
        let payload = self
            .engine
            .transact(command::AUTO_CLEANING_INTERVAL, &[AUTO_CLEANING_SUBCOMMAND])?;
        let bytes: [u8; 4] = payload
            .as_slice()
            .try_into()
            .map_err(|_| Error::IntervalPayloadLength { got: payload.len() })?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn write_auto_cleaning_interval(&mut self, seconds: u32) -> Result<(), Error> {
        let mut payload = Vec::with_capacity(5);
        payload.push(AUTO_CLEANING_SUBCOMMAND);
        payload.extend_from_slice(&seconds.to_be_bytes());
        self.engine
            .transact(command::AUTO_CLEANING_INTERVAL, &payload)
            .map(drop)
            .map_err(Error::from)
    }

    pub fn start_fan_cleaning(&mut self) -> Result<(), Error> {
        self.engine
            .transact(command::START_FAN_CLEANING, &[])
            .map(drop)
            .map_err(Error::from)
    }

    /// Reads one of the device-information strings. The trailing NUL
    /// terminator (and anything a device may pad after it) is stripped
    /// by truncating at the first NUL, not the last byte.
    pub fn device_info(&mut self, kind: DeviceInfoKind) -> Result<String, Error> {
        let payload = self
            .engine
            .transact(command::DEVICE_INFO, &[kind.subcommand()])?;
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        String::from_utf8(payload[..end].to_vec()).map_err(Error::DeviceInfoNotUtf8)
    }

    pub fn reset(&mut self) -> Result<(), Error> {
        self.engine
            .transact(command::RESET, &[])
            .map(drop)
            .map_err(Error::from)
    }

    /// Takes `n` consecutive samples spaced `interval` apart and returns
    /// their element-wise arithmetic mean. Any sub-read failure fails
    /// the whole average.
    pub fn sample_average(&mut self, n: usize, interval: Duration) -> Result<Measurement, Error> {
        assert!(n > 0, "sample_average requires at least one sample");
        let mut sums = [0f64; MEASUREMENT_FIELD_COUNT];
        for i in 0..n {
            let sample = self.read_measured_values()?;
            for (sum, value) in sums.iter_mut().zip(sample.as_values()) {
                *sum += value as f64;
            }
            if i + 1 < n {
                sleep(interval);
            }
        }
        let mut means = [0f32; MEASUREMENT_FIELD_COUNT];
        for (mean, sum) in means.iter_mut().zip(sums) {
            *mean = (sum / n as f64) as f32;
        }
        Ok(Measurement::from_values(means))
    }
}
