//! Blocklist rendering and delivery to the enforcement point

use chrono::{DateTime, Local, SecondsFormat};
use pguard_config::DomainSets;
use pguard_enforce_api::EnforcementPoint;
use pguard_util::Domain;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::GrantTable;

/// First line of every blocklist file
pub const BLOCKLIST_BANNER: &str = "# Managed by pguard - do not edit manually";

/// Address blocked domains are pointed at
pub const SINKHOLE_ADDRESS: &str = "0.0.0.0";

/// Which half of a sync failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Write,
    Reload,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStage::Write => write!(f, "write"),
            SyncStage::Reload => write!(f, "reload"),
        }
    }
}

/// A failed push to the enforcement point. In-memory state is never rolled
/// back; the next sync sends the full state again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Blocklist write failed: {0}")]
    WriteFailed(String),

    #[error("Enforcement reload failed: {0}")]
    ReloadFailed(String),

    #[error("Enforcement {stage} timed out after {after:?}")]
    Timeout { stage: SyncStage, after: Duration },
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Every configured domain that is currently blocked.
///
/// Always computed from scratch: all managed domains minus granted ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSet(BTreeSet<Domain>);

impl BlockSet {
    pub fn compute(domains: &DomainSets, table: &GrantTable) -> Self {
        Self(
            domains
                .universe()
                .filter(|d| domains.is_always_blocked(d) || !table.is_active(d))
                .cloned()
                .collect(),
        )
    }

    pub fn contains(&self, domain: &Domain) -> bool {
        self.0.contains(domain)
    }

    /// Blocked domains in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &Domain> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Domain> for BlockSet {
    fn from_iter<I: IntoIterator<Item = Domain>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Render the hosts-style file consumed by the resolver.
///
/// ```text
/// # Managed by pguard - do not edit manually
/// # Updated: 2026-10-19T14:30:00.123456+02:00
/// 0.0.0.0 a.example
/// 0.0.0.0 b.example
/// ```
pub fn render_blocklist(block_set: &BlockSet, updated_at: DateTime<Local>) -> String {
    let mut out = String::with_capacity(96 + block_set.len() * 32);
    out.push_str(BLOCKLIST_BANNER);
    out.push('\n');
    out.push_str("# Updated: ");
    out.push_str(&updated_at.to_rfc3339_opts(SecondsFormat::Micros, false));
    out.push('\n');

    for domain in block_set.iter() {
        out.push_str(SINKHOLE_ADDRESS);
        out.push(' ');
        out.push_str(domain.as_str());
        out.push('\n');
    }

    out
}

/// Pushes full blocklist snapshots to an enforcement point
pub struct EnforcementSync {
    enforcer: Arc<dyn EnforcementPoint>,
    timeout: Duration,
}

impl EnforcementSync {
    pub fn new(enforcer: Arc<dyn EnforcementPoint>, timeout: Duration) -> Self {
        Self { enforcer, timeout }
    }

    /// Write the snapshot, then trigger a reload. Each step is bounded by
    /// the configured timeout.
    pub async fn sync(&self, block_set: &BlockSet) -> SyncResult<()> {
        let contents = render_blocklist(block_set, pguard_util::now());

        match tokio::time::timeout(self.timeout, self.enforcer.write_blocklist(&contents)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.failed(SyncError::WriteFailed(e.to_string()))),
            Err(_) => {
                return Err(self.failed(SyncError::Timeout {
                    stage: SyncStage::Write,
                    after: self.timeout,
                }));
            }
        }

        match tokio::time::timeout(self.timeout, self.enforcer.reload()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.failed(SyncError::ReloadFailed(e.to_string()))),
            Err(_) => {
                return Err(self.failed(SyncError::Timeout {
                    stage: SyncStage::Reload,
                    after: self.timeout,
                }));
            }
        }

        debug!(
            enforcer = self.enforcer.name(),
            blocked = block_set.len(),
            "Blocklist synced"
        );
        Ok(())
    }

    fn failed(&self, error: SyncError) -> SyncError {
        warn!(enforcer = self.enforcer.name(), error = %error, "Blocklist sync failed");
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pguard_enforce_api::MockEnforcer;

    fn block_set(names: &[&str]) -> BlockSet {
        names.iter().map(|n| Domain::new(*n)).collect()
    }

    #[test]
    fn render_is_sorted_with_header() {
        let updated_at = Local.with_ymd_and_hms(2026, 10, 19, 14, 30, 0).unwrap();
        let rendered = render_blocklist(&block_set(&["b.example", "a.example"]), updated_at);

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], BLOCKLIST_BANNER);
        assert!(lines[1].starts_with("# Updated: 2026-10-19T14:30:00.000000"));
        assert_eq!(&lines[2..], &["0.0.0.0 a.example", "0.0.0.0 b.example"]);
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn render_empty_block_set() {
        let rendered = render_blocklist(&BlockSet::default(), pguard_util::now());
        assert_eq!(rendered.lines().count(), 2);
    }

    #[test]
    fn block_set_excludes_granted_conditional_only() {
        let domains = DomainSets::new(
            ["a.com", "b.com"].map(Domain::new),
            ["ads.net"].map(Domain::new),
        )
        .unwrap();
        let table = GrantTable::new();

        let all = BlockSet::compute(&domains, &table);
        assert_eq!(all.len(), 3);
        assert!(all.contains(&Domain::new("ads.net")));
    }

    #[tokio::test]
    async fn sync_writes_then_reloads() {
        let mock = Arc::new(MockEnforcer::new());
        let sync = EnforcementSync::new(mock.clone(), Duration::from_secs(5));

        sync.sync(&block_set(&["ads.net"])).await.unwrap();

        assert_eq!(mock.write_count(), 1);
        assert_eq!(mock.reload_count(), 1);
        assert_eq!(mock.last_blocked_domains(), vec!["ads.net"]);
    }

    #[tokio::test]
    async fn write_failure_skips_reload() {
        let mock = Arc::new(MockEnforcer::new());
        mock.set_fail_write(true);
        let sync = EnforcementSync::new(mock.clone(), Duration::from_secs(5));

        let err = sync.sync(&block_set(&["ads.net"])).await.unwrap_err();

        assert!(matches!(err, SyncError::WriteFailed(_)));
        assert_eq!(mock.reload_count(), 0);
    }

    #[tokio::test]
    async fn reload_failure_is_reported() {
        let mock = Arc::new(MockEnforcer::new());
        mock.set_fail_reload(true);
        let sync = EnforcementSync::new(mock.clone(), Duration::from_secs(5));

        let err = sync.sync(&block_set(&["ads.net"])).await.unwrap_err();

        assert!(matches!(err, SyncError::ReloadFailed(_)));
        assert_eq!(mock.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_write_times_out() {
        let mock = Arc::new(MockEnforcer::new());
        mock.set_write_delay(Some(Duration::from_secs(60)));
        let sync = EnforcementSync::new(mock.clone(), Duration::from_secs(5));

        let err = sync.sync(&block_set(&["ads.net"])).await.unwrap_err();

        assert_eq!(
            err,
            SyncError::Timeout {
                stage: SyncStage::Write,
                after: Duration::from_secs(5)
            }
        );
        assert_eq!(mock.write_count(), 0);
    }
}
