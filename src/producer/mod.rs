//! Callback producer - bridges the driver's push-style callbacks into the
//! pull-style event queue
//!
//! Runs entirely on the driver's callback thread. Every `on_data` call
//! deep-copies the driver-owned buffer into an [`EventBatch`] before
//! enqueueing, so the driver is free to reuse its memory the moment the
//! callback returns.
//!
//! End-of-measurement handling: the driver may deliver the final data and
//! the end-of-measurement notification on separate calls, so the sentinel
//! is latched in `on_end_of_measurement` and emitted by the *next*
//! `on_data` call, after that call's data. This flushes the remaining
//! samples ahead of the sentinel.
//!
//! Failure semantics: the driver has no recovery path mid-callback, so any
//! copy failure (mismatched column lengths, a buffer that does not match
//! the requested mode) is terminal. The producer logs it and drops its
//! queue handle, which the measurement loop observes as a disconnect.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::common::queue::Producer;
use crate::common::{
    fields, AcquisitionMode, EventBatch, PipelineCounters, PipelineError, QueueItem,
};
use crate::driver::{EventBuffer, PipeCallbacks};

/// Producer half of the pipeline, registered with the driver as its
/// callback sink
pub struct CallbackProducer {
    tx: Option<Producer<QueueItem>>,
    mode: AcquisitionMode,
    sequence_id: u64,
    end_of_measurement_latched: bool,
    counters: Arc<PipelineCounters>,
}

impl CallbackProducer {
    /// Create a producer feeding the given queue with the given mode's
    /// field set
    pub fn new(
        tx: Producer<QueueItem>,
        mode: AcquisitionMode,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            tx: Some(tx),
            mode,
            sequence_id: 0,
            end_of_measurement_latched: false,
            counters,
        }
    }

    /// Deep-copy a driver buffer into an owned batch
    fn copy_batch(&mut self, buffer: &EventBuffer<'_>) -> Result<EventBatch, PipelineError> {
        let columns: Vec<(&'static str, Vec<f64>)> = match (self.mode, buffer) {
            (AcquisitionMode::Dld, EventBuffer::Dld(b)) => vec![
                (fields::X, b.x.iter().map(|&v| f64::from(v)).collect()),
                (fields::Y, b.y.iter().map(|&v| f64::from(v)).collect()),
                (fields::TIME, b.time.iter().map(|&v| v as f64).collect()),
                (
                    fields::START_COUNTER,
                    b.start_counter.iter().map(|&v| f64::from(v)).collect(),
                ),
            ],
            (AcquisitionMode::Raw, EventBuffer::Raw(b)) => vec![
                (fields::CHANNEL, b.channel.iter().map(|&v| f64::from(v)).collect()),
                (fields::TIME_DATA, b.time_data.iter().map(|&v| v as f64).collect()),
                (
                    fields::START_COUNTER,
                    b.start_counter.iter().map(|&v| f64::from(v)).collect(),
                ),
            ],
            (mode, buffer) => {
                let delivered = match buffer {
                    EventBuffer::Dld(_) => "dld",
                    EventBuffer::Raw(_) => "raw",
                };
                return Err(PipelineError::protocol(format!(
                    "driver delivered a {} buffer to a pipe opened in {} mode",
                    delivered, mode
                )));
            }
        };

        let batch = EventBatch::from_columns(self.sequence_id, columns)?;
        self.sequence_id += 1;
        Ok(batch)
    }

    /// Enter the terminal failed state: no further items will be enqueued
    /// and the consumer observes a disconnect.
    fn fail(&mut self) {
        self.tx = None;
    }
}

impl PipeCallbacks for CallbackProducer {
    fn on_start_of_measurement(&mut self) {
        debug!("measurement cycle started on device");
    }

    fn on_data(&mut self, buffer: EventBuffer<'_>) {
        if self.tx.is_none() {
            // Already failed; discard until the driver winds down.
            return;
        }

        let batch = match self.copy_batch(&buffer) {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to copy driver buffer, abandoning measurement");
                self.fail();
                return;
            }
        };

        let sentinel_due = self.end_of_measurement_latched;
        self.end_of_measurement_latched = false;

        let seq = batch.sequence_id();
        let events = batch.len();
        let Some(tx) = self.tx.as_ref() else { return };

        if tx.put(QueueItem::Data(batch)).is_err() {
            warn!("event queue consumer dropped, abandoning measurement");
            self.fail();
            return;
        }
        self.counters.inc_batches_enqueued();
        debug!(seq, events, "enqueued batch");

        if sentinel_due {
            if tx.put(QueueItem::EndOfMeasurement).is_err() {
                warn!("event queue consumer dropped before sentinel");
                self.fail();
                return;
            }
            self.counters.inc_sentinels();
            debug!("enqueued end-of-measurement sentinel");
        }
    }

    fn on_end_of_measurement(&mut self) -> bool {
        self.end_of_measurement_latched = true;
        // Hardware-API contract: tell the driver to deliver the remaining
        // buffered data; the sentinel rides on that flush call.
        true
    }
}
