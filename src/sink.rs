//! Sample sink adapter (C5): the contract toward the external
//! time-series store. Specified only by interface — the core never
//! implements a concrete database client; see spec.md §4.5 and §2.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A labelled, timestamped mapping of field name to value, ready to hand
/// to a [`SampleSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub measurement_name: String,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(
        measurement_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        fields: BTreeMap<&'static str, f64>,
    ) -> Self {
        Self {
            measurement_name: measurement_name.into(),
            timestamp,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
    }
}

/// The adapter surfaces a single documented error kind for connectivity
/// problems. Anything else a sink implementation hits is fatal and is
/// carried as an opaque, non-retryable error instead of being folded into
/// the taxonomy of `Error` (see spec.md §7).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sample sink unreachable: {0}")]
    Unreachable(String),
    #[error("fatal sink error: {0}")]
    Fatal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Best-effort persistence of measurement samples. The core performs no
/// retries; a caller may retry on `SinkError::Unreachable` at its
/// discretion.
pub trait SampleSink {
    fn write(&mut self, sample: &Sample) -> Result<(), SinkError>;
}

/// Discards every sample. Useful for dry runs and as a default when no
/// real sink is configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl SampleSink for NullSink {
    fn write(&mut self, _sample: &Sample) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Logs every sample via `tracing` instead of persisting it anywhere.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl SampleSink for LoggingSink {
    fn write(&mut self, sample: &Sample) -> Result<(), SinkError> {
        tracing::info!(
            measurement = %sample.measurement_name,
            timestamp = %sample.timestamp.to_rfc3339(),
            fields = ?sample.fields,
            "sample"
        );
        Ok(())
    }
}
