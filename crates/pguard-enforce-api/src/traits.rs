//! Enforcement point traits

use async_trait::async_trait;
use thiserror::Error;

/// Errors from enforcement point operations
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Reload failed: {0}")]
    ReloadFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EnforcementResult<T> = Result<T, EnforcementError>;

/// The external system that enforces the blocklist.
///
/// Callers always deliver the complete file; implementations never merge.
/// Timeouts are applied by the caller, so implementations must be
/// cancellation-safe at every await point.
#[async_trait]
pub trait EnforcementPoint: Send + Sync {
    /// Replace the blocklist with `contents`
    async fn write_blocklist(&self, contents: &str) -> EnforcementResult<()>;

    /// Make the enforcer pick up the last written blocklist
    async fn reload(&self) -> EnforcementResult<()>;

    /// Short name for logs
    fn name(&self) -> &str;

    /// Optional: check if the enforcement point looks usable
    fn is_healthy(&self) -> bool {
        true
    }
}
