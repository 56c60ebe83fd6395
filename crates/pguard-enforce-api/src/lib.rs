//! Enforcement point trait interfaces for pguard
//!
//! This crate defines the narrow interface between the grant manager and the
//! system that actually denies traffic (a DNS resolver reading a hosts-style
//! file). It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
