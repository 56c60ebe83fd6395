//! Audit event types

use chrono::{DateTime, Local};
use pguard_util::{DeviceId, Domain, GrantId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Domain configuration loaded
    ConfigLoaded {
        conditional_count: usize,
        always_blocked_count: usize,
    },

    /// Block lifted for an alias class
    AccessGranted {
        grant_id: GrantId,
        domains: Vec<Domain>,
        device_id: DeviceId,
        device_name: Option<String>,
        scope: Option<String>,
        reason: String,
        granted_at: DateTime<Local>,
        expires_at: DateTime<Local>,
        /// An earlier grant on the same class was replaced
        superseded: bool,
        synced: bool,
    },

    /// A grant request was refused before any state change
    GrantRejected {
        domain: Domain,
        device_id: DeviceId,
        error: String,
    },

    /// Grant removed early by an explicit revoke
    AccessRevoked {
        grant_id: GrantId,
        domains: Vec<Domain>,
        device_id: DeviceId,
        device_name: Option<String>,
        reason: String,
        granted_at: DateTime<Local>,
        expires_at: DateTime<Local>,
        synced: bool,
    },

    /// Grant reached its expiry and the block was restored
    AccessExpired {
        grant_id: GrantId,
        domains: Vec<Domain>,
        device_id: DeviceId,
        device_name: Option<String>,
        reason: String,
        granted_at: DateTime<Local>,
        expires_at: DateTime<Local>,
        synced: bool,
    },

    /// Every active grant revoked at once
    AllRevoked {
        grant_count: usize,
        domains: Vec<Domain>,
        synced: bool,
    },

    /// Device barred from new grants; its active grants were revoked
    DeviceForceBlocked {
        device_id: DeviceId,
        revoked_domains: Vec<Domain>,
    },

    /// Device allowed to receive grants again
    DeviceForceUnblocked { device_id: DeviceId },
}

impl AuditEventType {
    /// Domains this event refers to (empty for service-level events)
    pub fn domains(&self) -> &[Domain] {
        match self {
            AuditEventType::AccessGranted { domains, .. }
            | AuditEventType::AccessRevoked { domains, .. }
            | AuditEventType::AccessExpired { domains, .. }
            | AuditEventType::AllRevoked { domains, .. } => domains,
            AuditEventType::DeviceForceBlocked {
                revoked_domains, ..
            } => revoked_domains,
            AuditEventType::GrantRejected { domain, .. } => std::slice::from_ref(domain),
            _ => &[],
        }
    }
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: pguard_util::now(),
            event,
        }
    }
}
