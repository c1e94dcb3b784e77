//! Common data types shared across components
//!
//! This module defines the core data structures for event-batch transfer
//! between the driver callback thread and the measurement loop.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod cli;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod state;
pub mod stop;

pub use error::{PipelineError, PipelineResult};
pub use metrics::{CounterSnapshot, PipelineCounters};
pub use state::LoopState;
pub use stop::StopHandle;

/// Payload field names
///
/// Field sets are fixed per acquisition mode; see [`AcquisitionMode`].
pub mod fields {
    /// Detector x position (DLD mode)
    pub const X: &str = "x";
    /// Detector y position (DLD mode)
    pub const Y: &str = "y";
    /// Event time (DLD mode)
    pub const TIME: &str = "time";
    /// Measurement start counter (both modes)
    pub const START_COUNTER: &str = "start_counter";
    /// TDC channel number (raw mode)
    pub const CHANNEL: &str = "channel";
    /// Raw TDC timestamp (raw mode)
    pub const TIME_DATA: &str = "time_data";
}

/// Acquisition mode: which payload fields are requested from the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AcquisitionMode {
    /// Reconstructed delay-line detector events: x, y, time, start_counter
    #[default]
    Dld,
    /// Raw TDC events: channel, time_data, start_counter
    Raw,
}

impl AcquisitionMode {
    /// Map the driver-level `raw_mode` flag to a mode
    pub fn from_raw_flag(raw_mode: bool) -> Self {
        if raw_mode {
            AcquisitionMode::Raw
        } else {
            AcquisitionMode::Dld
        }
    }

    /// The exact field set this mode delivers
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            AcquisitionMode::Dld => &[fields::X, fields::Y, fields::TIME, fields::START_COUNTER],
            AcquisitionMode::Raw => &[fields::CHANNEL, fields::TIME_DATA, fields::START_COUNTER],
        }
    }
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionMode::Dld => write!(f, "dld"),
            AcquisitionMode::Raw => write!(f, "raw"),
        }
    }
}

/// One batch of events copied out of a driver buffer
///
/// Columns are owned deep copies taken inside the driver callback; the
/// payload is never mutated after construction, so the driver reusing its
/// buffer cannot alias data already handed to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    sequence_id: u64,
    payload: HashMap<String, Vec<f64>>,
}

impl EventBatch {
    /// Build a batch from named columns, validating that every column has
    /// the same length.
    pub fn from_columns<I, S>(sequence_id: u64, columns: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut payload = HashMap::new();
        let mut expected: Option<usize> = None;
        for (name, values) in columns {
            let name = name.into();
            match expected {
                None => expected = Some(values.len()),
                Some(len) if len != values.len() => {
                    return Err(PipelineError::ColumnMismatch {
                        field: name,
                        expected: len,
                        actual: values.len(),
                    });
                }
                Some(_) => {}
            }
            payload.insert(name, values);
        }
        Ok(Self {
            sequence_id,
            payload,
        })
    }

    /// Monotonic producer-side counter, for ordering diagnostics
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Number of events in the batch
    pub fn len(&self) -> usize {
        self.payload.values().next().map_or(0, Vec::len)
    }

    /// Check if the batch carries no events
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up one column by field name
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.payload.get(name).map(Vec::as_slice)
    }

    /// Iterate over `(field name, column)` pairs
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.payload.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Names of the fields present in this batch
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.payload.keys().map(String::as_str)
    }
}

/// Item carried by the producer → consumer queue
///
/// A closed enum instead of integer tags, so the consumer matches
/// exhaustively and cannot observe an unknown tag.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    /// A batch of copied event data
    Data(EventBatch),
    /// All data for the current measurement cycle has been enqueued
    EndOfMeasurement,
}

impl QueueItem {
    /// Check if this is the end-of-measurement sentinel
    pub fn is_sentinel(&self) -> bool {
        matches!(self, QueueItem::EndOfMeasurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_raw_flag() {
        assert_eq!(AcquisitionMode::from_raw_flag(false), AcquisitionMode::Dld);
        assert_eq!(AcquisitionMode::from_raw_flag(true), AcquisitionMode::Raw);
    }

    #[test]
    fn test_mode_field_names() {
        assert_eq!(
            AcquisitionMode::Dld.field_names(),
            &["x", "y", "time", "start_counter"]
        );
        assert_eq!(
            AcquisitionMode::Raw.field_names(),
            &["channel", "time_data", "start_counter"]
        );
    }

    #[test]
    fn test_batch_from_columns() {
        let batch = EventBatch::from_columns(
            7,
            [
                (fields::X, vec![1.0, 2.0]),
                (fields::Y, vec![3.0, 4.0]),
            ],
        )
        .unwrap();

        assert_eq!(batch.sequence_id(), 7);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.field(fields::X), Some(&[1.0, 2.0][..]));
        assert_eq!(batch.field(fields::Y), Some(&[3.0, 4.0][..]));
        assert_eq!(batch.field("nope"), None);
    }

    #[test]
    fn test_batch_rejects_mismatched_columns() {
        let result = EventBatch::from_columns(
            0,
            [(fields::X, vec![1.0, 2.0]), (fields::Y, vec![3.0])],
        );
        assert!(matches!(
            result,
            Err(PipelineError::ColumnMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_batch() {
        let batch = EventBatch::from_columns(
            0,
            [(fields::X, Vec::new()), (fields::Y, Vec::new())],
        )
        .unwrap();
        assert_eq!(batch.len(), 0);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_queue_item_sentinel() {
        let batch = EventBatch::from_columns(0, [(fields::X, vec![1.0])]).unwrap();
        assert!(!QueueItem::Data(batch).is_sentinel());
        assert!(QueueItem::EndOfMeasurement.is_sentinel());
    }
}
