//! Grant records

use chrono::{DateTime, Local};
use pguard_util::{DeviceId, Domain, GrantId};
use std::collections::BTreeSet;

use crate::TimerHandle;

/// Who a grant was issued to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub device_id: DeviceId,
    pub device_name: Option<String>,
}

impl Requester {
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

/// A live exception to the blocklist.
///
/// One instance is shared by every member of the granted alias class.
#[derive(Debug, Clone)]
pub struct Grant {
    pub id: GrantId,

    /// The spelling the requester asked for
    pub domain: Domain,

    /// Full alias class covered by this grant
    pub members: BTreeSet<Domain>,

    pub requester: Requester,
    pub scope: Option<String>,
    pub reason: String,

    /// Wall-clock times, for display and audit
    pub granted_at: DateTime<Local>,
    pub expires_at: DateTime<Local>,

    /// Expiry timer that owns this grant
    pub timer: TimerHandle,
}

impl Grant {
    /// Time left until expiry (zero once past)
    pub fn remaining(&self, now: DateTime<Local>) -> chrono::Duration {
        (self.expires_at - now).max(chrono::Duration::zero())
    }

    pub fn is_held_by(&self, device_id: &DeviceId) -> bool {
        &self.requester.device_id == device_id
    }

    pub fn member_list(&self) -> Vec<Domain> {
        self.members.iter().cloned().collect()
    }
}
