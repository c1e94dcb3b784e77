//! Measurement loop - drives repeated start/drain cycles
//!
//! The loop owns the device and the consumer half of the event queue. Each
//! cycle it starts one measurement on the device, routes every data batch
//! the driver callback enqueues, and on reading the end-of-measurement
//! sentinel decides whether to restart or shut down.
//!
//! The restart decision is made strictly *after* the cycle is fully
//! drained: every data batch enqueued before the sentinel has been routed
//! by the time the stop flag is consulted, so trailing samples are never
//! lost. This ordering is the core correctness property of the pipeline.
//!
//! All driver failures go through the same cleanup path (`close`,
//! `deinitialize`) before the error surfaces, so the device is always left
//! in a known state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::common::queue::{self, RecvTimeoutError};
use crate::common::{LoopState, PipelineCounters, PipelineError, QueueItem, StopHandle};
use crate::config::AcquisitionConfig;
use crate::demux::Demultiplexer;
use crate::driver::{DataPipe, DriverError, TdcDevice};
use crate::producer::CallbackProducer;

/// Acquisition error type
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Driver refused to initialize; no measurement was started
    #[error("Driver initialization failed (code {code}): {message}")]
    Init { code: i32, message: String },

    /// Driver refused to start a measurement
    #[error("start_measurement failed (code {code}): {message}")]
    StartMeasurement { code: i32, message: String },

    /// Error reported by the driver wrapper
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// The producer dropped its queue handle mid-cycle
    #[error("Event queue disconnected: producer and consumer desynchronized")]
    Desynchronized,

    /// No queue item arrived in time; the driver has stopped calling back
    #[error("No queue item within {0:?}: driver appears wedged")]
    DrainTimeout(Duration),

    /// Pipeline-level error
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Totals reported after a clean shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Fully drained measurement cycles
    pub cycles: u64,
    /// Data batches routed
    pub batches: u64,
    /// Events routed (sum of batch lengths)
    pub events: u64,
}

/// Shared, observable loop state
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<Mutex<LoopState>>,
}

impl StateHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoopState::Idle)),
        }
    }

    /// The loop's current state
    pub fn current(&self) -> LoopState {
        *self.inner.lock()
    }

    fn set(&self, next: LoopState) {
        let mut state = self.inner.lock();
        let current = *state;
        debug_assert!(
            current.can_transition_to(next),
            "invalid transition {} -> {}",
            current,
            next
        );
        debug!(from = %current, to = %next, "state transition");
        *state = next;
    }
}

/// Orchestrates repeated start-measurement / drain-queue cycles until an
/// external stop is observed
pub struct MeasurementLoop<D: TdcDevice> {
    device: D,
    config: AcquisitionConfig,
    demux: Demultiplexer,
    stop: StopHandle,
    state: StateHandle,
    counters: Arc<PipelineCounters>,
}

impl<D: TdcDevice> MeasurementLoop<D> {
    /// Create a loop over `device`.
    ///
    /// The demultiplexer must have been built for the same mode the
    /// configuration requests; a mismatch is a configuration error.
    pub fn new(
        device: D,
        config: AcquisitionConfig,
        demux: Demultiplexer,
        stop: StopHandle,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self, PipelineError> {
        if demux.mode() != config.mode() {
            return Err(PipelineError::config(format!(
                "demultiplexer built for {} mode but acquisition requests {}",
                demux.mode(),
                config.mode()
            )));
        }
        Ok(Self {
            device,
            config,
            demux,
            stop,
            state: StateHandle::new(),
            counters,
        })
    }

    /// Handle for observing the loop state from other threads
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Run until an external stop (or the configured cycle limit) is
    /// reached, or a driver failure terminates the run.
    ///
    /// Blocks the calling thread for the whole acquisition.
    pub fn run(mut self) -> Result<RunSummary, AcquisitionError> {
        let rc = self.device.initialize();
        if rc < 0 {
            let message = self.device.error_message(rc);
            error!(code = rc, error = %message, "driver initialization failed");
            self.state.set(LoopState::Error);
            return Err(AcquisitionError::Init { code: rc, message });
        }

        let (tx, rx) = match self.config.queue_capacity {
            Some(capacity) => queue::bounded(capacity),
            None => queue::unbounded(),
        };
        let producer = CallbackProducer::new(tx, self.config.mode(), self.counters.clone());

        let mut pipe = match self.device.open_pipe(Box::new(producer)) {
            Ok(pipe) => pipe,
            Err(e) => {
                error!(code = e.code, error = %e.message, "failed to open data pipe");
                self.device.deinitialize();
                self.state.set(LoopState::Error);
                return Err(e.into());
            }
        };

        let drain_timeout = Duration::from_millis(self.config.drain_timeout_ms);
        let mut summary = RunSummary::default();

        info!(
            mode = %self.config.mode(),
            duration_ms = self.config.duration_ms,
            queue_capacity = ?self.config.queue_capacity,
            "acquisition starting"
        );

        loop {
            let rc = pipe.start_measurement(self.config.duration_ms);
            if rc < 0 {
                let message = self.device.error_message(rc);
                error!(code = rc, error = %message, "start_measurement failed");
                return Err(self.fail(
                    pipe.as_mut(),
                    AcquisitionError::StartMeasurement { code: rc, message },
                ));
            }
            self.state.set(LoopState::Measuring);

            // Drain every item of this cycle up to and including the
            // sentinel.
            loop {
                match rx.get_timeout(drain_timeout) {
                    Ok(QueueItem::Data(batch)) => {
                        if self.state.current() == LoopState::Measuring {
                            self.state.set(LoopState::Draining);
                        }
                        summary.batches += 1;
                        summary.events += batch.len() as u64;
                        self.demux.route(&batch);
                    }
                    Ok(QueueItem::EndOfMeasurement) => {
                        if self.state.current() == LoopState::Measuring {
                            self.state.set(LoopState::Draining);
                        }
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        error!(timeout = ?drain_timeout, "no data from driver");
                        return Err(
                            self.fail(pipe.as_mut(), AcquisitionError::DrainTimeout(drain_timeout))
                        );
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("producer dropped its queue handle mid-cycle");
                        return Err(self.fail(pipe.as_mut(), AcquisitionError::Desynchronized));
                    }
                }
            }
            summary.cycles += 1;
            debug!(cycle = summary.cycles, batches = summary.batches, "cycle drained");

            // Stop decision, strictly after the cycle is fully drained.
            let limit_reached = self
                .config
                .max_cycles
                .is_some_and(|max| summary.cycles >= max);
            if self.stop.is_requested() || limit_reached {
                pipe.close();
                self.device.deinitialize();
                self.state.set(LoopState::Stopped);
                info!(
                    cycles = summary.cycles,
                    batches = summary.batches,
                    events = summary.events,
                    "acquisition stopped"
                );
                return Ok(summary);
            }
        }
    }

    /// Shared failure path: release the pipe and device, then surface the
    /// error.
    fn fail(&mut self, pipe: &mut dyn DataPipe, err: AcquisitionError) -> AcquisitionError {
        pipe.close();
        self.device.deinitialize();
        self.state.set(LoopState::Error);
        err
    }
}
