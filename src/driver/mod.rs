//! Driver interface for TDC hardware
//!
//! This module defines the capability traits through which the pipeline
//! talks to a vendor driver, and the callback interface through which the
//! driver pushes data back:
//! - [`TdcDevice`]: device lifecycle (initialize / open pipe / deinitialize)
//! - [`DataPipe`]: per-measurement control (start / close)
//! - [`PipeCallbacks`]: hooks the driver invokes from its own thread
//!
//! Vendor drivers report status as integer return codes; any negative code
//! is a failure, and [`TdcDevice::error_message`] resolves it to the
//! driver's own diagnostic text (the most specific message available).

pub mod sim;

use thiserror::Error;

/// Common driver return codes (for pattern matching)
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC_ERROR: i32 = -1;
    pub const INVALID_PARAM: i32 = -2;
    pub const DEVICE_NOT_FOUND: i32 = -4;
    pub const NOT_INITIALIZED: i32 = -7;
    pub const TIMEOUT: i32 = -11;
}

/// Driver error carrying the code and the driver's verbatim message
#[derive(Debug, Clone, Error)]
#[error("driver error {code}: {message}")]
pub struct DriverError {
    pub code: i32,
    pub message: String,
}

impl DriverError {
    /// Create a driver error from a code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Borrowed view of one reconstructed-DLD driver buffer
///
/// The slices point into driver-owned memory and are only valid until the
/// callback returns; anything kept past that point must be copied.
#[derive(Debug, Clone, Copy)]
pub struct DldBuffer<'a> {
    /// Detector x positions
    pub x: &'a [u16],
    /// Detector y positions
    pub y: &'a [u16],
    /// Event times
    pub time: &'a [u64],
    /// Measurement start counter per event
    pub start_counter: &'a [u32],
}

/// Borrowed view of one raw-TDC driver buffer
///
/// Same lifetime contract as [`DldBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer<'a> {
    /// TDC channel numbers
    pub channel: &'a [u8],
    /// Raw TDC timestamps
    pub time_data: &'a [u64],
    /// Measurement start counter per event
    pub start_counter: &'a [u32],
}

/// One driver buffer, shaped by the acquisition mode the pipe was opened in
#[derive(Debug, Clone, Copy)]
pub enum EventBuffer<'a> {
    Dld(DldBuffer<'a>),
    Raw(RawBuffer<'a>),
}

/// Hooks invoked by the driver from its callback thread
///
/// Contract (hardware API, not a design choice):
/// - `on_data` buffers are valid only for the duration of the call.
/// - `on_end_of_measurement` returning `true` tells the driver to keep
///   delivering its remaining buffered data; the driver then issues at
///   least one more `on_data` call (the flush) before going idle.
pub trait PipeCallbacks: Send {
    /// A measurement cycle has started on the device
    fn on_start_of_measurement(&mut self);

    /// Event data is ready in a driver-owned buffer
    fn on_data(&mut self, buffer: EventBuffer<'_>);

    /// The current measurement cycle has ended on the device.
    /// Return `true` to receive the remaining buffered data.
    fn on_end_of_measurement(&mut self) -> bool;
}

/// Per-measurement control handle, obtained from [`TdcDevice::open_pipe`]
pub trait DataPipe: Send {
    /// Start one measurement of `duration_ms`. Returns a driver code;
    /// negative = failure. Must not be called again before the previous
    /// cycle's end-of-measurement has been observed.
    fn start_measurement(&mut self, duration_ms: u32) -> i32;

    /// Release the pipe. No callbacks are invoked after this returns.
    fn close(&mut self);
}

/// TDC device lifecycle
pub trait TdcDevice {
    /// Initialize the device. Returns a driver code; negative = failure.
    fn initialize(&mut self) -> i32;

    /// Release the device. Safe to call regardless of state.
    fn deinitialize(&mut self);

    /// Resolve a driver return code to the driver's diagnostic message
    fn error_message(&self, code: i32) -> String;

    /// Open the data pipe, registering the callback sink the driver will
    /// invoke from its own thread.
    fn open_pipe(
        &mut self,
        callbacks: Box<dyn PipeCallbacks>,
    ) -> Result<Box<dyn DataPipe>, DriverError>;
}
