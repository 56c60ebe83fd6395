//! Helper process utilities

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use pguard_enforce_api::{EnforcementError, EnforcementResult};

/// Which enforcement step a helper runs for; selects the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Write,
    Reload,
}

impl Step {
    fn error(self, msg: String) -> EnforcementError {
        match self {
            Step::Write => EnforcementError::WriteFailed(msg),
            Step::Reload => EnforcementError::ReloadFailed(msg),
        }
    }
}

/// Run `argv`, optionally feeding `input` on stdin, and fail on non-zero exit.
///
/// The child is killed if the returned future is dropped before it exits.
pub async fn run_helper(
    step: Step,
    argv: &[String],
    input: Option<&[u8]>,
) -> EnforcementResult<()> {
    let Some((program, args)) = argv.split_first() else {
        return Err(step.error("Empty argv".into()));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| step.error(format!("Failed to spawn {}: {}", program, e)))?;

    if let Some(bytes) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| step.error(format!("Failed to feed {}: {}", program, e)))?;
        // Dropping stdin closes the pipe so the helper sees EOF
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| step.error(format!("Failed to wait for {}: {}", program, e)))?;

    if output.status.success() {
        debug!(program = %program, "Helper finished");
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(step.error(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )))
    }
}

/// Send SIGHUP to the process whose pid is recorded in `pid_file`
pub async fn signal_from_pid_file(pid_file: &Path) -> EnforcementResult<()> {
    let raw = tokio::fs::read_to_string(pid_file).await.map_err(|e| {
        EnforcementError::ReloadFailed(format!(
            "Failed to read pid file {}: {}",
            pid_file.display(),
            e
        ))
    })?;

    let pid: i32 = raw.trim().parse().map_err(|_| {
        EnforcementError::ReloadFailed(format!(
            "Invalid pid '{}' in {}",
            raw.trim(),
            pid_file.display()
        ))
    })?;

    if pid <= 0 {
        return Err(EnforcementError::ReloadFailed(format!(
            "Refusing to signal pid {}",
            pid
        )));
    }

    match signal::kill(Pid::from_raw(pid), Signal::SIGHUP) {
        Ok(()) => {
            debug!(pid = pid, "Sent SIGHUP");
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => Err(EnforcementError::ReloadFailed(format!(
            "No process with pid {}",
            pid
        ))),
        Err(nix::errno::Errno::EPERM) => Err(EnforcementError::PermissionDenied(format!(
            "Not allowed to signal pid {}",
            pid
        ))),
        Err(e) => Err(EnforcementError::ReloadFailed(format!(
            "Failed to send SIGHUP: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn helper_success_and_failure() {
        run_helper(Step::Reload, &argv(&["true"]), None).await.unwrap();

        let err = run_helper(Step::Reload, &argv(&["false"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnforcementError::ReloadFailed(_)));
    }

    #[tokio::test]
    async fn helper_feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let mut cmd = argv(&["tee"]);
        cmd.push(target.to_string_lossy().into_owned());

        run_helper(Step::Write, &cmd, Some(b"0.0.0.0 a.com\n"))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(target).unwrap(), "0.0.0.0 a.com\n");
    }

    #[tokio::test]
    async fn helper_missing_program() {
        let err = run_helper(Step::Write, &argv(&["/nonexistent/pguard-helper"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnforcementError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn pid_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.pid");
        assert!(signal_from_pid_file(&missing).await.is_err());

        let garbage = dir.path().join("garbage.pid");
        std::fs::write(&garbage, "not-a-pid\n").unwrap();
        assert!(matches!(
            signal_from_pid_file(&garbage).await,
            Err(EnforcementError::ReloadFailed(_))
        ));
    }

    #[tokio::test]
    async fn pid_file_signals_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid_file = dir.path().join("sleep.pid");
        std::fs::write(&pid_file, format!("{}\n", child.id().unwrap())).unwrap();

        signal_from_pid_file(&pid_file).await.unwrap();

        // SIGHUP terminates sleep
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
