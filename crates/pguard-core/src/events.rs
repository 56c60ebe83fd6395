//! Events broadcast by the grant manager

use chrono::{DateTime, Local};
use pguard_util::{DeviceId, Domain, GrantId};

/// Outbound notifications about grant state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantEvent {
    /// A block was lifted for an alias class
    Granted {
        grant_id: GrantId,
        domains: Vec<Domain>,
        device_id: DeviceId,
        expires_at: DateTime<Local>,
        synced: bool,
    },

    /// A grant was revoked before its expiry
    Revoked {
        grant_id: GrantId,
        domains: Vec<Domain>,
        synced: bool,
    },

    /// A grant ran out and its domains are blocked again
    Expired {
        grant_id: GrantId,
        domains: Vec<Domain>,
        device_id: DeviceId,
        synced: bool,
    },

    /// Every grant was revoked at once
    AllRevoked {
        domains: Vec<Domain>,
        synced: bool,
    },

    /// A device was barred from new grants
    DeviceForceBlocked {
        device_id: DeviceId,
        revoked_domains: Vec<Domain>,
    },

    DeviceForceUnblocked {
        device_id: DeviceId,
    },
}

impl GrantEvent {
    /// Whether this event put domains back on the blocklist
    pub fn is_reblock(&self) -> bool {
        match self {
            GrantEvent::Revoked { .. }
            | GrantEvent::Expired { .. }
            | GrantEvent::AllRevoked { .. } => true,
            GrantEvent::DeviceForceBlocked {
                revoked_domains, ..
            } => !revoked_domains.is_empty(),
            GrantEvent::Granted { .. } | GrantEvent::DeviceForceUnblocked { .. } => false,
        }
    }
}
