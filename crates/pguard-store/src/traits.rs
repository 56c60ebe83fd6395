//! Store trait definitions

use crate::{AuditEvent, StoreResult};

/// Destination for audit events.
///
/// The grant manager treats this as fire-and-forget: a failed append is
/// logged and never affects grant state.
pub trait Store: Send + Sync {
    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
