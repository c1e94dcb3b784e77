//! Simulated TDC device - generates dummy event data for testing
//!
//! Stands in for the vendor driver when no hardware is attached. A driver
//! thread owns the registered callbacks and serves start-measurement
//! commands exactly like the real driver: a burst of `on_data` calls,
//! `on_end_of_measurement`, then one flush `on_data` with the remaining
//! buffered data (per the callback contract in [`super::PipeCallbacks`]).
//!
//! Event data is random but physically shaped: Gaussian spot on the
//! detector, monotonic timestamps, per-cycle start counter.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    codes, DataPipe, DldBuffer, DriverError, EventBuffer, PipeCallbacks, RawBuffer, TdcDevice,
};
use crate::common::AcquisitionMode;

/// Detector coordinate range (12-bit DLD positions)
const COORD_MAX: u16 = 4095;

/// Simulated device configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimTdcConfig {
    /// Events per `on_data` call
    pub events_per_batch: usize,
    /// `on_data` calls per measurement cycle (before the flush)
    pub batches_per_measurement: u32,
    /// Pause between `on_data` calls in milliseconds (0 = full speed)
    pub batch_interval_ms: u64,
    /// Fail the (n+1)-th `start_measurement` call; absent = never fail
    pub fail_start_after: Option<u32>,
    /// RNG seed for reproducible data; absent = entropy-seeded
    pub seed: Option<u64>,
}

impl Default for SimTdcConfig {
    fn default() -> Self {
        Self {
            events_per_batch: 64,
            batches_per_measurement: 8,
            batch_interval_ms: 0,
            fail_start_after: None,
            seed: None,
        }
    }
}

/// Simulated TDC device
pub struct SimTdc {
    config: SimTdcConfig,
    mode: AcquisitionMode,
    initialized: bool,
}

impl SimTdc {
    /// Create a simulated device delivering the given mode's field set
    pub fn new(config: SimTdcConfig, mode: AcquisitionMode) -> Self {
        Self {
            config,
            mode,
            initialized: false,
        }
    }
}

impl TdcDevice for SimTdc {
    fn initialize(&mut self) -> i32 {
        self.initialized = true;
        info!(mode = %self.mode, "simulated TDC initialized");
        codes::SUCCESS
    }

    fn deinitialize(&mut self) {
        if self.initialized {
            self.initialized = false;
            info!("simulated TDC deinitialized");
        }
    }

    fn error_message(&self, code: i32) -> String {
        match code {
            codes::SUCCESS => "success".to_string(),
            codes::GENERIC_ERROR => "generic device error".to_string(),
            codes::INVALID_PARAM => "invalid parameter".to_string(),
            codes::DEVICE_NOT_FOUND => "device not found".to_string(),
            codes::NOT_INITIALIZED => "device not initialized".to_string(),
            codes::TIMEOUT => "operation timed out".to_string(),
            _ => format!("unknown error code {}", code),
        }
    }

    fn open_pipe(
        &mut self,
        callbacks: Box<dyn PipeCallbacks>,
    ) -> Result<Box<dyn DataPipe>, DriverError> {
        if !self.initialized {
            return Err(DriverError::new(
                codes::NOT_INITIALIZED,
                self.error_message(codes::NOT_INITIALIZED),
            ));
        }

        let (cmd_tx, cmd_rx) = unbounded();
        let config = self.config.clone();
        let mode = self.mode;
        let worker = thread::Builder::new()
            .name("sim-tdc-driver".to_string())
            .spawn(move || driver_thread(callbacks, cmd_rx, config, mode))
            .map_err(|e| {
                DriverError::new(codes::GENERIC_ERROR, format!("spawn failed: {}", e))
            })?;

        Ok(Box::new(SimPipe {
            cmd_tx,
            worker: Some(worker),
            starts_issued: 0,
            fail_start_after: self.config.fail_start_after,
        }))
    }
}

enum SimCommand {
    Start { duration_ms: u32 },
    Close,
}

/// Consumer-side pipe handle for the simulated device
struct SimPipe {
    cmd_tx: Sender<SimCommand>,
    worker: Option<thread::JoinHandle<()>>,
    starts_issued: u32,
    fail_start_after: Option<u32>,
}

impl DataPipe for SimPipe {
    fn start_measurement(&mut self, duration_ms: u32) -> i32 {
        if let Some(limit) = self.fail_start_after {
            if self.starts_issued >= limit {
                return codes::GENERIC_ERROR;
            }
        }
        if self.cmd_tx.send(SimCommand::Start { duration_ms }).is_err() {
            warn!("sim driver thread is gone");
            return codes::GENERIC_ERROR;
        }
        self.starts_issued += 1;
        codes::SUCCESS
    }

    fn close(&mut self) {
        let _ = self.cmd_tx.send(SimCommand::Close);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sim driver thread panicked");
            }
        }
    }
}

impl Drop for SimPipe {
    fn drop(&mut self) {
        self.close();
    }
}

/// One generated burst of events, owned by the driver thread.
///
/// Callbacks only ever see borrowed slices into this struct, and the
/// burst is dropped as soon as the callback returns. Anything the
/// callback wants to keep must be copied.
struct SimBurst {
    x: Vec<u16>,
    y: Vec<u16>,
    time: Vec<u64>,
    start_counter: Vec<u32>,
    channel: Vec<u8>,
}

impl SimBurst {
    fn as_buffer(&self, mode: AcquisitionMode) -> EventBuffer<'_> {
        match mode {
            AcquisitionMode::Dld => EventBuffer::Dld(DldBuffer {
                x: &self.x,
                y: &self.y,
                time: &self.time,
                start_counter: &self.start_counter,
            }),
            AcquisitionMode::Raw => EventBuffer::Raw(RawBuffer {
                channel: &self.channel,
                time_data: &self.time,
                start_counter: &self.start_counter,
            }),
        }
    }
}

fn driver_thread(
    mut callbacks: Box<dyn PipeCallbacks>,
    cmd_rx: Receiver<SimCommand>,
    config: SimTdcConfig,
    mode: AcquisitionMode,
) {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    // Gaussian spot centered on the detector
    let spot = Normal::new(f64::from(COORD_MAX) / 2.0, 600.0)
        .unwrap_or_else(|_| Normal::new(2048.0, 1.0).unwrap());

    let mut time_ns: u64 = 0;
    let mut cycle: u32 = 0;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            SimCommand::Close => break,
            SimCommand::Start { duration_ms } => {
                cycle += 1;
                debug!(cycle, duration_ms, "sim measurement started");
                callbacks.on_start_of_measurement();

                for _ in 0..config.batches_per_measurement {
                    let burst = generate_burst(
                        &mut rng,
                        &spot,
                        config.events_per_batch,
                        &mut time_ns,
                        cycle,
                    );
                    callbacks.on_data(burst.as_buffer(mode));
                    if config.batch_interval_ms > 0 {
                        thread::sleep(Duration::from_millis(config.batch_interval_ms));
                    }
                }

                if callbacks.on_end_of_measurement() {
                    // Flush the remaining buffered data for this cycle.
                    let burst = generate_burst(
                        &mut rng,
                        &spot,
                        config.events_per_batch / 2,
                        &mut time_ns,
                        cycle,
                    );
                    callbacks.on_data(burst.as_buffer(mode));
                }
                debug!(cycle, "sim measurement finished");
            }
        }
    }
}

fn generate_burst(
    rng: &mut StdRng,
    spot: &Normal<f64>,
    events: usize,
    time_ns: &mut u64,
    cycle: u32,
) -> SimBurst {
    let mut burst = SimBurst {
        x: Vec::with_capacity(events),
        y: Vec::with_capacity(events),
        time: Vec::with_capacity(events),
        start_counter: Vec::with_capacity(events),
        channel: Vec::with_capacity(events),
    };
    for _ in 0..events {
        burst.x.push(sample_coord(rng, spot));
        burst.y.push(sample_coord(rng, spot));
        *time_ns += rng.gen_range(100..10_000);
        burst.time.push(*time_ns);
        burst.start_counter.push(cycle);
        burst.channel.push(rng.gen_range(0..4));
    }
    burst
}

fn sample_coord(rng: &mut StdRng, spot: &Normal<f64>) -> u16 {
    spot.sample(rng).clamp(0.0, f64::from(COORD_MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records the callback sequence and copies of the delivered buffers
    struct RecordingCallbacks {
        log: Arc<Mutex<Vec<String>>>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl PipeCallbacks for RecordingCallbacks {
        fn on_start_of_measurement(&mut self) {
            self.log.lock().push("start".to_string());
        }

        fn on_data(&mut self, buffer: EventBuffer<'_>) {
            let size = match &buffer {
                EventBuffer::Dld(b) => {
                    assert_eq!(b.x.len(), b.y.len());
                    assert_eq!(b.x.len(), b.time.len());
                    assert_eq!(b.x.len(), b.start_counter.len());
                    assert!(b.x.iter().all(|&v| v <= COORD_MAX));
                    b.x.len()
                }
                EventBuffer::Raw(b) => {
                    assert_eq!(b.channel.len(), b.time_data.len());
                    assert!(b.channel.iter().all(|&c| c < 4));
                    b.channel.len()
                }
            };
            self.log.lock().push("data".to_string());
            self.batch_sizes.lock().push(size);
        }

        fn on_end_of_measurement(&mut self) -> bool {
            self.log.lock().push("end".to_string());
            true
        }
    }

    fn run_one_cycle(mode: AcquisitionMode) -> (Vec<String>, Vec<usize>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let batch_sizes = Arc::new(Mutex::new(Vec::new()));

        let mut device = SimTdc::new(
            SimTdcConfig {
                events_per_batch: 16,
                batches_per_measurement: 3,
                seed: Some(7),
                ..Default::default()
            },
            mode,
        );
        assert_eq!(device.initialize(), codes::SUCCESS);

        let mut pipe = device
            .open_pipe(Box::new(RecordingCallbacks {
                log: log.clone(),
                batch_sizes: batch_sizes.clone(),
            }))
            .unwrap();

        assert_eq!(pipe.start_measurement(10), codes::SUCCESS);
        pipe.close();
        device.deinitialize();

        let log = log.lock().clone();
        let sizes = batch_sizes.lock().clone();
        (log, sizes)
    }

    #[test]
    fn test_callback_sequence_dld() {
        let (log, sizes) = run_one_cycle(AcquisitionMode::Dld);
        // start, 3 data, end, flush data
        assert_eq!(log, vec!["start", "data", "data", "data", "end", "data"]);
        assert_eq!(sizes, vec![16, 16, 16, 8]);
    }

    #[test]
    fn test_callback_sequence_raw() {
        let (log, _) = run_one_cycle(AcquisitionMode::Raw);
        assert_eq!(log, vec!["start", "data", "data", "data", "end", "data"]);
    }

    #[test]
    fn test_open_pipe_requires_initialize() {
        let mut device = SimTdc::new(SimTdcConfig::default(), AcquisitionMode::Dld);
        let result = device.open_pipe(Box::new(RecordingCallbacks {
            log: Arc::new(Mutex::new(Vec::new())),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
        }));
        let err = result.err().expect("must fail before initialize");
        assert_eq!(err.code, codes::NOT_INITIALIZED);
        assert!(err.message.contains("not initialized"));
    }

    #[test]
    fn test_fail_start_after() {
        let mut device = SimTdc::new(
            SimTdcConfig {
                fail_start_after: Some(2),
                seed: Some(1),
                ..Default::default()
            },
            AcquisitionMode::Dld,
        );
        device.initialize();

        let mut pipe = device
            .open_pipe(Box::new(RecordingCallbacks {
                log: Arc::new(Mutex::new(Vec::new())),
                batch_sizes: Arc::new(Mutex::new(Vec::new())),
            }))
            .unwrap();

        assert_eq!(pipe.start_measurement(10), codes::SUCCESS);
        assert_eq!(pipe.start_measurement(10), codes::SUCCESS);
        assert!(pipe.start_measurement(10) < 0, "third start must fail");
        pipe.close();
    }

    #[test]
    fn test_error_messages() {
        let device = SimTdc::new(SimTdcConfig::default(), AcquisitionMode::Dld);
        assert!(device
            .error_message(codes::DEVICE_NOT_FOUND)
            .contains("not found"));
        assert!(device.error_message(-99).contains("-99"));
    }
}
