//! dnsmasq enforcement point for pguard
//!
//! Provides:
//! - Blocklist delivery to a hosts-style file, either directly or through a
//!   privileged helper such as `sudo tee`
//! - Reload by SIGHUP (pid file) or by running a reload command
//! - Child processes killed when the caller's timeout drops the operation

mod adapter;
mod process;

pub use adapter::*;
pub use process::*;
