//! TDC-DAQ-RS: queue-mediated data acquisition pipeline for TDC/DLD detectors
//!
//! A driver callback producer copies timestamped event batches out of
//! transient driver buffers into a FIFO queue; a measurement loop drains
//! the queue, coordinates start/stop-of-measurement framing and restarts,
//! and a demultiplexer fans each batch's field arrays out to per-field
//! sinks.

pub mod acquisition;
pub mod common;
pub mod config;
pub mod demux;
pub mod driver;
pub mod producer;
