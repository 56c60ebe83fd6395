//! dnsmasq enforcement point implementation

use async_trait::async_trait;
use pguard_config::{EnforcementConfig, ReloadMethod};
use pguard_enforce_api::{EnforcementError, EnforcementPoint, EnforcementResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::process::{Step, run_helper, signal_from_pid_file};

/// Drives dnsmasq through a hosts-style override file
pub struct DnsmasqEnforcer {
    hosts_path: PathBuf,
    write_command: Option<Vec<String>>,
    reload: ReloadMethod,
}

impl DnsmasqEnforcer {
    pub fn new(
        hosts_path: impl Into<PathBuf>,
        write_command: Option<Vec<String>>,
        reload: ReloadMethod,
    ) -> Self {
        Self {
            hosts_path: hosts_path.into(),
            write_command,
            reload,
        }
    }

    pub fn from_config(config: &EnforcementConfig) -> Self {
        let enforcer = Self::new(
            config.hosts_path.clone(),
            config.write_command.clone(),
            config.reload.clone(),
        );

        info!(
            hosts_path = %enforcer.hosts_path.display(),
            privileged_write = enforcer.write_command.is_some(),
            reload = ?enforcer.reload,
            "dnsmasq enforcer configured"
        );

        enforcer
    }

    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }

    /// Write through a sibling temp file and rename, so the resolver never
    /// reads a half-written list.
    async fn write_direct(&self, contents: &str) -> EnforcementResult<()> {
        let file_name = self
            .hosts_path
            .file_name()
            .ok_or_else(|| {
                EnforcementError::WriteFailed(format!(
                    "Hosts path {} has no file name",
                    self.hosts_path.display()
                ))
            })?
            .to_string_lossy()
            .into_owned();
        let tmp_path = self.hosts_path.with_file_name(format!(".{file_name}.tmp"));

        tokio::fs::write(&tmp_path, contents).await.map_err(|e| {
            EnforcementError::WriteFailed(format!("{}: {}", tmp_path.display(), e))
        })?;
        tokio::fs::rename(&tmp_path, &self.hosts_path)
            .await
            .map_err(|e| {
                EnforcementError::WriteFailed(format!("{}: {}", self.hosts_path.display(), e))
            })?;

        Ok(())
    }
}

#[async_trait]
impl EnforcementPoint for DnsmasqEnforcer {
    async fn write_blocklist(&self, contents: &str) -> EnforcementResult<()> {
        match &self.write_command {
            Some(cmd) => {
                let mut argv = cmd.clone();
                argv.push(self.hosts_path.to_string_lossy().into_owned());
                run_helper(Step::Write, &argv, Some(contents.as_bytes())).await?;
            }
            None => self.write_direct(contents).await?,
        }

        debug!(
            hosts_path = %self.hosts_path.display(),
            bytes = contents.len(),
            "Blocklist written"
        );
        Ok(())
    }

    async fn reload(&self) -> EnforcementResult<()> {
        match &self.reload {
            ReloadMethod::Signal { pid_file } => signal_from_pid_file(pid_file).await,
            ReloadMethod::Command(cmd) => run_helper(Step::Reload, cmd, None).await,
        }
    }

    fn name(&self) -> &str {
        "dnsmasq"
    }

    fn is_healthy(&self) -> bool {
        self.hosts_path
            .parent()
            .is_some_and(|dir| dir.as_os_str().is_empty() || dir.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Managed by pguard - do not edit manually\n0.0.0.0 ads.example.com\n";

    #[tokio::test]
    async fn direct_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("blocked_hosts");
        std::fs::write(&hosts, "stale\n").unwrap();

        let enforcer =
            DnsmasqEnforcer::new(&hosts, None, ReloadMethod::Command(vec!["true".into()]));
        enforcer.write_blocklist(SAMPLE).await.unwrap();
        enforcer.reload().await.unwrap();

        assert_eq!(std::fs::read_to_string(&hosts).unwrap(), SAMPLE);
        assert!(!dir.path().join(".blocked_hosts.tmp").exists());
        assert!(enforcer.is_healthy());
    }

    #[tokio::test]
    async fn command_write_appends_hosts_path() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("blocked_hosts");

        let enforcer = DnsmasqEnforcer::new(
            &hosts,
            Some(vec!["tee".into()]),
            ReloadMethod::Command(vec!["true".into()]),
        );
        enforcer.write_blocklist(SAMPLE).await.unwrap();

        assert_eq!(std::fs::read_to_string(&hosts).unwrap(), SAMPLE);
    }

    #[tokio::test]
    async fn direct_write_into_missing_directory_fails() {
        let enforcer = DnsmasqEnforcer::new(
            "/nonexistent/pguard/blocked_hosts",
            None,
            ReloadMethod::Command(vec!["true".into()]),
        );

        let result = enforcer.write_blocklist(SAMPLE).await;
        assert!(matches!(result, Err(EnforcementError::WriteFailed(_))));
        assert!(!enforcer.is_healthy());
        assert_eq!(
            enforcer.hosts_path(),
            Path::new("/nonexistent/pguard/blocked_hosts")
        );
    }

    #[tokio::test]
    async fn failing_reload_command() {
        let enforcer = DnsmasqEnforcer::new(
            "/tmp/blocked_hosts",
            None,
            ReloadMethod::Command(vec!["false".into()]),
        );

        let result = enforcer.reload().await;
        assert!(matches!(result, Err(EnforcementError::ReloadFailed(_))));
    }
}
