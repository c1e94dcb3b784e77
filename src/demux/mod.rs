//! Demultiplexer - fans event batches out to per-field sinks
//!
//! Each named field array of a drained batch is appended to the sink
//! registered for that field, so independent downstream consumers (one per
//! physical quantity) advance at their own pace without blocking each
//! other.
//!
//! The sink registry is validated once at construction against the field
//! set fixed by the acquisition mode; an incomplete or over-full registry
//! is a configuration error there, not at runtime. A failing sink is
//! logged and skipped: losing a downstream consumer must not abort
//! hardware acquisition.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::common::queue::{self, Consumer, Producer};
use crate::common::{AcquisitionMode, EventBatch, PipelineCounters, PipelineError};

/// Sink append failure
#[derive(Debug, Error)]
pub enum SinkError {
    /// The downstream consumer is gone
    #[error("sink disconnected")]
    Disconnected,

    /// Any other sink-specific failure
    #[error("{0}")]
    Other(String),
}

/// Downstream sink for one field's values
///
/// Called from the consumer thread only. Implementations must not block
/// indefinitely, or they stall the whole pipeline.
pub trait FieldSink: Send + Sync {
    /// Append a column of values for this sink's field
    fn append(&self, values: &[f64]) -> Result<(), SinkError>;
}

/// Routes batches to per-field sinks
pub struct Demultiplexer {
    mode: AcquisitionMode,
    sinks: HashMap<String, Box<dyn FieldSink>>,
    counters: Arc<PipelineCounters>,
}

impl Demultiplexer {
    /// Build a demultiplexer for the given mode.
    ///
    /// The registry must cover the mode's field set exactly: a missing
    /// sink or a sink for an unknown field is a configuration error.
    pub fn new(
        mode: AcquisitionMode,
        sinks: HashMap<String, Box<dyn FieldSink>>,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self, PipelineError> {
        for field in mode.field_names() {
            if !sinks.contains_key(*field) {
                return Err(PipelineError::config(format!(
                    "no sink registered for field '{}' ({} mode)",
                    field, mode
                )));
            }
        }
        for name in sinks.keys() {
            if !mode.field_names().contains(&name.as_str()) {
                return Err(PipelineError::config(format!(
                    "sink registered for unknown field '{}' ({} mode)",
                    name, mode
                )));
            }
        }
        Ok(Self {
            mode,
            sinks,
            counters,
        })
    }

    /// The mode this demultiplexer was built for
    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Append every field column of `batch` to its registered sink.
    ///
    /// The batch is borrowed immutably and never modified, so routing the
    /// same batch twice appends the same values twice.
    pub fn route(&self, batch: &EventBatch) {
        for (field, column) in batch.columns() {
            match self.sinks.get(field) {
                Some(sink) => {
                    if let Err(e) = sink.append(column) {
                        warn!(field, error = %e, "sink append failed, dropping column");
                        self.counters.inc_sink_errors();
                    }
                }
                None => {
                    // Registry was validated at startup; a stray field here
                    // means the producer delivered outside its contract.
                    warn!(field, "batch carries a field with no registered sink");
                    self.counters.inc_sink_errors();
                }
            }
        }
        self.counters.inc_batches_routed();
        self.counters.add_events_routed(batch.len() as u64);
    }
}

/// In-memory sink backed by a shared growable buffer
///
/// Suitable for tests and for consumers that snapshot the accumulated
/// values (live display, end-of-run statistics).
#[derive(Debug, Default)]
pub struct MemorySink {
    values: Mutex<Vec<f64>>,
}

impl MemorySink {
    /// Create an empty shared sink
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of values accumulated so far
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Check if the sink is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the accumulated values
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.lock().clone()
    }
}

impl FieldSink for Arc<MemorySink> {
    fn append(&self, values: &[f64]) -> Result<(), SinkError> {
        self.values.lock().extend_from_slice(values);
        Ok(())
    }
}

/// Queue-backed sink: each appended column becomes one item in a per-field
/// handoff queue, consumed by an independently-paced downstream thread
pub struct QueueSink {
    tx: Producer<Vec<f64>>,
}

impl FieldSink for QueueSink {
    fn append(&self, values: &[f64]) -> Result<(), SinkError> {
        self.tx
            .put(values.to_vec())
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Create a queue-backed sink and the consumer handle for its field.
///
/// `capacity` bounds the per-field queue; `None` = unbounded.
pub fn queue_sink(capacity: Option<usize>) -> (QueueSink, Consumer<Vec<f64>>) {
    let (tx, rx) = match capacity {
        Some(n) => queue::bounded(n),
        None => queue::unbounded(),
    };
    (QueueSink { tx }, rx)
}

/// Build a registry of memory sinks covering `mode`'s field set.
///
/// Returns the registry plus the shared handles, keyed by field name, for
/// inspection by the caller.
pub fn memory_sinks(
    mode: AcquisitionMode,
) -> (
    HashMap<String, Box<dyn FieldSink>>,
    HashMap<String, Arc<MemorySink>>,
) {
    let mut sinks: HashMap<String, Box<dyn FieldSink>> = HashMap::new();
    let mut handles = HashMap::new();
    for field in mode.field_names() {
        let sink = MemorySink::new();
        handles.insert(field.to_string(), sink.clone());
        sinks.insert(field.to_string(), Box::new(sink));
    }
    (sinks, handles)
}
