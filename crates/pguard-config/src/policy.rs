//! Validated policy structures

use crate::schema::{RawConfig, RawEnforcementConfig, RawServiceConfig};
use crate::validation::{ValidationError, check_disjoint};
use pguard_util::Domain;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default hosts-style file read by dnsmasq
pub const DEFAULT_HOSTS_PATH: &str = "/etc/dnsmasq.d/blocked_hosts";

/// Default bound on each enforcement step
pub const DEFAULT_ENFORCEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted `[enforcement].timeout_seconds`
pub const MAX_ENFORCEMENT_TIMEOUT_SECS: u64 = 60;

/// Validated policy ready for use by the grant manager
#[derive(Debug, Clone)]
pub struct Policy {
    pub service: ServiceConfig,
    pub enforcement: EnforcementConfig,
    pub domains: DomainSets,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let domains = DomainSets {
            conditional: raw.domains.conditional.iter().map(Domain::new).collect(),
            always_blocked: raw.domains.always_blocked.iter().map(Domain::new).collect(),
        };

        Self {
            service: ServiceConfig::from_raw(raw.service),
            enforcement: EnforcementConfig::from_raw(raw.enforcement),
            domains,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw
                .data_dir
                .unwrap_or_else(pguard_util::default_data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: pguard_util::default_data_dir(),
        }
    }
}

/// How the resolver is told to re-read the blocklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadMethod {
    /// Send SIGHUP to the pid recorded in this file
    Signal { pid_file: PathBuf },
    /// Run this command (argv)
    Command(Vec<String>),
}

/// Enforcement point configuration
#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    pub hosts_path: PathBuf,
    /// Privileged writer argv; `None` writes the file directly
    pub write_command: Option<Vec<String>>,
    pub reload: ReloadMethod,
    pub timeout: Duration,
}

impl EnforcementConfig {
    fn from_raw(raw: RawEnforcementConfig) -> Self {
        let reload = match (raw.pid_file, raw.reload_command) {
            (Some(pid_file), _) => ReloadMethod::Signal { pid_file },
            (None, Some(cmd)) => ReloadMethod::Command(cmd),
            (None, None) => ReloadMethod::Command(default_reload_command()),
        };

        Self {
            hosts_path: raw
                .hosts_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOSTS_PATH)),
            write_command: raw.write_command,
            reload,
            timeout: raw
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ENFORCEMENT_TIMEOUT),
        }
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self::from_raw(RawEnforcementConfig::default())
    }
}

fn default_reload_command() -> Vec<String> {
    ["sudo", "pkill", "-HUP", "dnsmasq"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// The configured domain universe: two disjoint sets fixed for the process
/// lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSets {
    conditional: BTreeSet<Domain>,
    always_blocked: BTreeSet<Domain>,
}

impl DomainSets {
    /// Build the universe, rejecting any domain that appears in both sets.
    pub fn new(
        conditional: impl IntoIterator<Item = Domain>,
        always_blocked: impl IntoIterator<Item = Domain>,
    ) -> Result<Self, Vec<ValidationError>> {
        let conditional: BTreeSet<Domain> = conditional.into_iter().collect();
        let always_blocked: BTreeSet<Domain> = always_blocked.into_iter().collect();

        let errors = check_disjoint(&conditional, &always_blocked);
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            conditional,
            always_blocked,
        })
    }

    pub fn conditional(&self) -> &BTreeSet<Domain> {
        &self.conditional
    }

    pub fn always_blocked(&self) -> &BTreeSet<Domain> {
        &self.always_blocked
    }

    pub fn is_conditional(&self, domain: &Domain) -> bool {
        self.conditional.contains(domain)
    }

    pub fn is_always_blocked(&self, domain: &Domain) -> bool {
        self.always_blocked.contains(domain)
    }

    /// Whether the domain is under management at all
    pub fn contains(&self, domain: &Domain) -> bool {
        self.is_conditional(domain) || self.is_always_blocked(domain)
    }

    /// Every managed domain, sorted
    pub fn universe(&self) -> impl Iterator<Item = &Domain> {
        let mut all: Vec<&Domain> = self
            .conditional
            .iter()
            .chain(self.always_blocked.iter())
            .collect();
        all.sort();
        all.into_iter()
    }

    pub fn len(&self) -> usize {
        self.conditional.len() + self.always_blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
