//! Concurrency primitives of the migration engine.
//!
//! A run is cancelled through the [`shutdown`] channel, batches are spread over concurrent
//! workers by [`fan_out`], and [`buffered`] decouples production from consumption with a
//! background task whose flow control is decided by [`hysteresis`] and [`pause`].

pub mod buffered;
pub mod fan_out;
pub mod hysteresis;
pub mod pause;
pub mod shutdown;
