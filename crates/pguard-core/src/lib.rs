//! Grant lifecycle manager for pguard
//!
//! This crate is the heart of pguard, containing:
//! - Alias resolution (`x` and `www.x` are one blockable unit)
//! - The grant table and the Blocked <-> Granted state machine
//! - Cancellable expiry timers with a stale-fire ownership check
//! - Full-snapshot sync of the blocklist to the enforcement point

mod alias;
mod events;
mod grant;
mod manager;
mod sync;
mod table;
mod timer;

pub use alias::*;
pub use events::*;
pub use grant::*;
pub use manager::*;
pub use sync::*;
pub use table::*;
pub use timer::*;
