//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// How the blocklist reaches the DNS resolver
    #[serde(default)]
    pub enforcement: RawEnforcementConfig,

    /// Managed domains
    #[serde(default)]
    pub domains: RawDomains,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the audit store
    pub data_dir: Option<PathBuf>,
}

/// Enforcement point settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEnforcementConfig {
    /// Hosts-style file read by the resolver (default: /etc/dnsmasq.d/blocked_hosts)
    pub hosts_path: Option<PathBuf>,

    /// Privileged writer, e.g. ["sudo", "tee"]; `hosts_path` is appended as the
    /// last argument and the file content is piped to stdin. Absent means the
    /// daemon writes the file itself.
    pub write_command: Option<Vec<String>>,

    /// Command that makes the resolver re-read the file
    /// (default: ["sudo", "pkill", "-HUP", "dnsmasq"])
    pub reload_command: Option<Vec<String>>,

    /// Resolver pid file; when set, SIGHUP is sent directly instead of running
    /// `reload_command`
    pub pid_file: Option<PathBuf>,

    /// Bound on each write/reload step (default: 5)
    pub timeout_seconds: Option<u64>,
}

/// Managed domain lists
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDomains {
    /// Blocked unless a grant is active
    #[serde(default)]
    pub conditional: Vec<String>,

    /// Blocked, no exceptions
    #[serde(default)]
    pub always_blocked: Vec<String>,
}
