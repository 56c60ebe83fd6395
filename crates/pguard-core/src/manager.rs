//! Grant manager: the Blocked <-> Granted state machine

use pguard_config::{DomainSets, Policy};
use pguard_enforce_api::EnforcementPoint;
use pguard_store::{AuditEvent, AuditEventType, Store};
use pguard_util::{DeviceId, Domain, GrantId};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::{
    AliasResolver, BlockSet, EnforcementSync, Grant, GrantEvent, GrantTable, Requester,
    SyncResult, TimerHandle, TimerScheduler,
};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Reasons a grant request is refused. All are raised before any state
/// change or sync.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GrantError {
    #[error("Domain is not under management: {0}")]
    UnknownDomain(Domain),

    #[error("Domain is permanently blocked: {0}")]
    AlwaysBlocked(Domain),

    #[error("Device is force-blocked: {0}")]
    DeviceForceBlocked(DeviceId),

    #[error("Grant duration must be at least one minute")]
    InvalidDuration,

    #[error("Grant manager is shutting down")]
    ShuttingDown,
}

/// Result of a successful grant
#[derive(Debug)]
pub struct GrantOutcome {
    pub grant: Arc<Grant>,

    /// Earlier grants on the same alias class that this one replaced
    pub superseded: Vec<Arc<Grant>>,

    /// The grant stands even if this is an error
    pub sync: SyncResult<()>,
}

/// Result of a revoke; `revoked` is `None` when nothing was active
#[derive(Debug)]
pub struct RevokeOutcome {
    pub revoked: Option<Arc<Grant>>,
    pub sync: SyncResult<()>,
}

/// Result of an operation that drops several grants with one sync
#[derive(Debug)]
pub struct BulkRevokeOutcome {
    pub revoked: Vec<Arc<Grant>>,
    pub sync: SyncResult<()>,
}

/// Point-in-time view for status reporting
#[derive(Debug, Clone)]
pub struct ManagerStatus {
    /// Active grants, soonest expiry first
    pub grants: Vec<Arc<Grant>>,
    pub force_blocked_devices: Vec<DeviceId>,
    pub blocked_count: usize,
}

/// State readable without waiting on the writer
#[derive(Default)]
struct SharedState {
    table: GrantTable,
    force_blocked: BTreeSet<DeviceId>,
}

struct Inner {
    aliases: AliasResolver,
    sync: EnforcementSync,
    store: Arc<dyn Store>,
    timers: TimerScheduler,
    events: broadcast::Sender<GrantEvent>,

    /// Serializes mutations from validation through sync and audit, so
    /// exported blocklists are strictly ordered.
    writer: Mutex<()>,

    /// Held only for the in-memory part of a mutation
    state: RwLock<SharedState>,

    /// Set under the writer by `shutdown`; refuses every later grant
    shut_down: AtomicBool,
}

/// Owns the active grants and keeps the enforcement point in step with them.
///
/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct GrantManager {
    inner: Arc<Inner>,
}

impl GrantManager {
    pub fn new(
        domains: DomainSets,
        enforcer: Arc<dyn EnforcementPoint>,
        store: Arc<dyn Store>,
        sync_timeout: Duration,
    ) -> Self {
        info!(
            conditional = domains.conditional().len(),
            always_blocked = domains.always_blocked().len(),
            enforcer = enforcer.name(),
            "Grant manager initialized"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                aliases: AliasResolver::new(domains),
                sync: EnforcementSync::new(enforcer, sync_timeout),
                store,
                timers: TimerScheduler::new(),
                events,
                writer: Mutex::new(()),
                state: RwLock::new(SharedState::default()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_policy(
        policy: &Policy,
        enforcer: Arc<dyn EnforcementPoint>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self::new(
            policy.domains.clone(),
            enforcer,
            store,
            policy.enforcement.timeout,
        )
    }

    pub fn domains(&self) -> &DomainSets {
        self.inner.aliases.domains()
    }

    /// Receive a copy of every grant event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GrantEvent> {
        self.inner.events.subscribe()
    }

    /// Push the startup blocklist so the enforcement point starts consistent
    pub async fn initialize(&self) -> SyncResult<()> {
        let _writer = self.inner.writer.lock().await;
        let block_set = self.block_set();
        info!(blocked = block_set.len(), "Writing initial blocklist");
        self.inner.sync.sync(&block_set).await
    }

    /// Lift the block on `domain` and its alias class for `duration_minutes`.
    ///
    /// An existing grant on the class is replaced outright, including its
    /// expiry. A failed sync is reported on the outcome; the grant stands.
    pub async fn grant(
        &self,
        domain: &Domain,
        requester: Requester,
        scope: Option<String>,
        reason: impl Into<String>,
        duration_minutes: u32,
    ) -> Result<GrantOutcome, GrantError> {
        let _writer = self.inner.writer.lock().await;

        if let Err(e) = self.check_grantable(domain, &requester, duration_minutes) {
            info!(domain = %domain, device = %requester.device_id, error = %e, "Grant refused");
            self.audit(AuditEventType::GrantRejected {
                domain: domain.clone(),
                device_id: requester.device_id.clone(),
                error: e.to_string(),
            });
            return Err(e);
        }

        let domains = self.domains();
        let members: BTreeSet<Domain> = self
            .inner
            .aliases
            .resolve(domain)
            .into_iter()
            .filter(|m| domains.is_conditional(m))
            .collect();

        let duration = pguard_util::minutes(duration_minutes);
        let granted_at = pguard_util::now();
        let expires_at = granted_at + chrono::Duration::minutes(i64::from(duration_minutes));

        let timer = self.schedule_expiry(duration, members.clone());
        let grant = Arc::new(Grant {
            id: GrantId::new(),
            domain: domain.clone(),
            members: members.clone(),
            requester,
            scope,
            reason: reason.into(),
            granted_at,
            expires_at,
            timer,
        });

        let (superseded, block_set) = {
            let mut state = self.state_mut();
            let superseded = state.table.put(&members, Arc::clone(&grant));
            (superseded, BlockSet::compute(domains, &state.table))
        };
        for old in &superseded {
            self.inner.timers.cancel(old.timer);
        }

        let sync = self.inner.sync.sync(&block_set).await;

        info!(
            grant_id = %grant.id,
            domains = ?members,
            device = %grant.requester.device_id,
            minutes = duration_minutes,
            superseded = superseded.len(),
            synced = sync.is_ok(),
            "Access granted"
        );

        self.audit(AuditEventType::AccessGranted {
            grant_id: grant.id,
            domains: grant.member_list(),
            device_id: grant.requester.device_id.clone(),
            device_name: grant.requester.device_name.clone(),
            scope: grant.scope.clone(),
            reason: grant.reason.clone(),
            granted_at: grant.granted_at,
            expires_at: grant.expires_at,
            superseded: !superseded.is_empty(),
            synced: sync.is_ok(),
        });
        self.emit(GrantEvent::Granted {
            grant_id: grant.id,
            domains: grant.member_list(),
            device_id: grant.requester.device_id.clone(),
            expires_at: grant.expires_at,
            synced: sync.is_ok(),
        });

        Ok(GrantOutcome {
            grant,
            superseded,
            sync,
        })
    }

    /// Restore the block on `domain` and its alias class.
    ///
    /// Revoking something that is not granted is not an error. The
    /// blocklist is pushed either way, which also repairs an earlier failed
    /// sync.
    pub async fn revoke(&self, domain: &Domain) -> RevokeOutcome {
        let _writer = self.inner.writer.lock().await;

        let members = self.inner.aliases.resolve(domain);
        let (revoked, block_set) = {
            let mut state = self.state_mut();
            let revoked = state.table.remove(&members);
            (revoked, BlockSet::compute(self.domains(), &state.table))
        };
        if let Some(grant) = &revoked {
            self.inner.timers.cancel(grant.timer);
        }

        let sync = self.inner.sync.sync(&block_set).await;

        match &revoked {
            Some(grant) => {
                info!(
                    grant_id = %grant.id,
                    domains = ?grant.members,
                    synced = sync.is_ok(),
                    "Access revoked"
                );
                self.audit(AuditEventType::AccessRevoked {
                    grant_id: grant.id,
                    domains: grant.member_list(),
                    device_id: grant.requester.device_id.clone(),
                    device_name: grant.requester.device_name.clone(),
                    reason: grant.reason.clone(),
                    granted_at: grant.granted_at,
                    expires_at: grant.expires_at,
                    synced: sync.is_ok(),
                });
                self.emit(GrantEvent::Revoked {
                    grant_id: grant.id,
                    domains: grant.member_list(),
                    synced: sync.is_ok(),
                });
            }
            None => debug!(domain = %domain, "Revoke with no active grant"),
        }

        RevokeOutcome { revoked, sync }
    }

    /// Drop every active grant with a single sync
    pub async fn revoke_all(&self) -> BulkRevokeOutcome {
        let _writer = self.inner.writer.lock().await;
        self.revoke_all_locked().await
    }

    /// Body of `revoke_all`; the caller holds the writer
    async fn revoke_all_locked(&self) -> BulkRevokeOutcome {
        let (revoked, block_set) = {
            let mut state = self.state_mut();
            let revoked = state.table.clear();
            (revoked, BlockSet::compute(self.domains(), &state.table))
        };
        for grant in &revoked {
            self.inner.timers.cancel(grant.timer);
        }

        let sync = self.inner.sync.sync(&block_set).await;

        let domains: Vec<Domain> = revoked.iter().flat_map(|g| g.member_list()).collect();
        info!(
            grant_count = revoked.len(),
            synced = sync.is_ok(),
            "All access revoked"
        );

        self.audit(AuditEventType::AllRevoked {
            grant_count: revoked.len(),
            domains: domains.clone(),
            synced: sync.is_ok(),
        });
        self.emit(GrantEvent::AllRevoked {
            domains,
            synced: sync.is_ok(),
        });

        BulkRevokeOutcome { revoked, sync }
    }

    /// Bar a device from new grants and revoke the ones it holds
    pub async fn force_block_device(&self, device_id: &DeviceId) -> BulkRevokeOutcome {
        let _writer = self.inner.writer.lock().await;

        let (revoked, block_set) = {
            let mut state = self.state_mut();
            state.force_blocked.insert(device_id.clone());

            let held = state.table.grants_for_device(device_id);
            let revoked: Vec<Arc<Grant>> = held
                .iter()
                .filter_map(|g| state.table.remove(&g.members))
                .collect();
            (revoked, BlockSet::compute(self.domains(), &state.table))
        };
        for grant in &revoked {
            self.inner.timers.cancel(grant.timer);
        }

        let sync = self.inner.sync.sync(&block_set).await;

        let revoked_domains: Vec<Domain> =
            revoked.iter().flat_map(|g| g.member_list()).collect();
        warn!(
            device = %device_id,
            revoked = ?revoked_domains,
            synced = sync.is_ok(),
            "Device force-blocked"
        );

        self.audit(AuditEventType::DeviceForceBlocked {
            device_id: device_id.clone(),
            revoked_domains: revoked_domains.clone(),
        });
        self.emit(GrantEvent::DeviceForceBlocked {
            device_id: device_id.clone(),
            revoked_domains,
        });

        BulkRevokeOutcome { revoked, sync }
    }

    /// Allow a force-blocked device to receive grants again. Returns whether
    /// it was blocked.
    pub async fn force_unblock_device(&self, device_id: &DeviceId) -> bool {
        let _writer = self.inner.writer.lock().await;

        let was_blocked = self.state_mut().force_blocked.remove(device_id);
        if was_blocked {
            info!(device = %device_id, "Device force-unblocked");
            self.audit(AuditEventType::DeviceForceUnblocked {
                device_id: device_id.clone(),
            });
            self.emit(GrantEvent::DeviceForceUnblocked {
                device_id: device_id.clone(),
            });
        }
        was_blocked
    }

    /// Re-block everything and disarm all timers.
    ///
    /// The writer is held throughout, and every grant requested afterwards
    /// is refused with [`GrantError::ShuttingDown`].
    pub async fn shutdown(&self) -> BulkRevokeOutcome {
        let _writer = self.inner.writer.lock().await;
        self.inner.shut_down.store(true, Ordering::SeqCst);

        let outcome = self.revoke_all_locked().await;
        let disarmed = self.inner.timers.cancel_all();
        info!(disarmed, "Grant manager shut down");
        outcome
    }

    pub fn is_active(&self, domain: &Domain) -> bool {
        self.state().table.is_active(domain)
    }

    pub fn is_device_force_blocked(&self, device_id: &DeviceId) -> bool {
        self.state().force_blocked.contains(device_id)
    }

    pub fn get_grant(&self, domain: &Domain) -> Option<Arc<Grant>> {
        self.state().table.get(domain).cloned()
    }

    /// The blocklist as it stands in memory right now
    pub fn block_set(&self) -> BlockSet {
        BlockSet::compute(self.domains(), &self.state().table)
    }

    pub fn status(&self) -> ManagerStatus {
        let state = self.state();

        let mut grants = state.table.list_distinct();
        grants.sort_by_key(|g| g.expires_at);

        ManagerStatus {
            grants,
            force_blocked_devices: state.force_blocked.iter().cloned().collect(),
            blocked_count: BlockSet::compute(self.domains(), &state.table).len(),
        }
    }

    /// Number of armed expiry timers
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.pending()
    }

    /// Timer callback. Only the timer that still owns the grant removes it;
    /// a superseded or revoked timer finds nothing to do.
    async fn expire(&self, timer: TimerHandle, members: BTreeSet<Domain>) {
        let _writer = self.inner.writer.lock().await;

        let (expired, block_set) = {
            let mut state = self.state_mut();
            let expired = state.table.remove_owned(&members, timer);
            (expired, BlockSet::compute(self.domains(), &state.table))
        };
        let Some(grant) = expired else {
            debug!(timer = %timer, domains = ?members, "Stale expiry ignored");
            return;
        };

        let sync = self.inner.sync.sync(&block_set).await;

        info!(
            grant_id = %grant.id,
            domains = ?grant.members,
            device = %grant.requester.device_id,
            synced = sync.is_ok(),
            "Access expired"
        );

        self.audit(AuditEventType::AccessExpired {
            grant_id: grant.id,
            domains: grant.member_list(),
            device_id: grant.requester.device_id.clone(),
            device_name: grant.requester.device_name.clone(),
            reason: grant.reason.clone(),
            granted_at: grant.granted_at,
            expires_at: grant.expires_at,
            synced: sync.is_ok(),
        });
        self.emit(GrantEvent::Expired {
            grant_id: grant.id,
            domains: grant.member_list(),
            device_id: grant.requester.device_id.clone(),
            synced: sync.is_ok(),
        });
    }

    fn check_grantable(
        &self,
        domain: &Domain,
        requester: &Requester,
        duration_minutes: u32,
    ) -> Result<(), GrantError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(GrantError::ShuttingDown);
        }

        let domains = self.domains();
        if domains.is_always_blocked(domain) {
            return Err(GrantError::AlwaysBlocked(domain.clone()));
        }
        if !domains.is_conditional(domain) {
            return Err(GrantError::UnknownDomain(domain.clone()));
        }
        if self.is_device_force_blocked(&requester.device_id) {
            return Err(GrantError::DeviceForceBlocked(requester.device_id.clone()));
        }
        if duration_minutes == 0 {
            return Err(GrantError::InvalidDuration);
        }

        Ok(())
    }

    fn schedule_expiry(&self, duration: Duration, members: BTreeSet<Domain>) -> TimerHandle {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .timers
            .schedule(duration, members, move |timer, members| async move {
                if let Some(inner) = weak.upgrade() {
                    GrantManager { inner }.expire(timer, members).await;
                }
            })
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.inner.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to record audit event");
        }
    }

    fn emit(&self, event: GrantEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn state(&self) -> RwLockReadGuard<'_, SharedState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SharedState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
