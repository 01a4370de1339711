//! Helpers for testing migrations.
//!
//! - [`source`] - scripted and endless sources
//! - [`destination`] - a destination recording every consume call
//! - [`observer`] - an observer collecting snapshots, with status notifications
//! - [`notify`] - notifications failing the test on timeout

pub mod destination;
pub mod notify;
pub mod observer;
pub mod source;
