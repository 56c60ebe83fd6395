//! Domain -> grant associations

use pguard_util::{DeviceId, Domain, GrantId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::{Grant, TimerHandle};

/// Which granted domain maps to which grant.
///
/// Every mutation covers a grant's whole member set, so an alias class is
/// never observed half-granted.
#[derive(Debug, Default)]
pub struct GrantTable {
    by_domain: BTreeMap<Domain, Arc<Grant>>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate every member with `grant`.
    ///
    /// Any earlier grant touching one of the members is released in full,
    /// including members outside the new set. Returns those superseded grants.
    pub fn put(&mut self, members: &BTreeSet<Domain>, grant: Arc<Grant>) -> Vec<Arc<Grant>> {
        let superseded = self.grants_on(members);
        for old in &superseded {
            self.detach(old);
        }

        for member in members {
            self.by_domain.insert(member.clone(), Arc::clone(&grant));
        }

        superseded
    }

    /// Detach the grant found on `members`, along with all of its members.
    pub fn remove(&mut self, members: &BTreeSet<Domain>) -> Option<Arc<Grant>> {
        let mut found = self.grants_on(members);
        debug_assert!(found.len() <= 1, "alias class split across grants");

        let grant = found.pop()?;
        self.detach(&grant);
        Some(grant)
    }

    /// Like [`remove`](Self::remove), but only if the grant on `members` is
    /// still owned by `timer`. A superseded timer finds a different handle
    /// and leaves the table alone.
    pub fn remove_owned(
        &mut self,
        members: &BTreeSet<Domain>,
        timer: TimerHandle,
    ) -> Option<Arc<Grant>> {
        let grant = members
            .iter()
            .find_map(|m| self.by_domain.get(m))
            .filter(|g| g.timer == timer)
            .cloned()?;

        self.detach(&grant);
        Some(grant)
    }

    /// Drop everything, returning the grants that were live
    pub fn clear(&mut self) -> Vec<Arc<Grant>> {
        let grants = self.list_distinct();
        self.by_domain.clear();
        grants
    }

    /// Live grants, one entry per grant rather than per domain
    pub fn list_distinct(&self) -> Vec<Arc<Grant>> {
        let mut seen = HashSet::new();
        self.by_domain
            .values()
            .filter(|g| seen.insert(g.id))
            .cloned()
            .collect()
    }

    pub fn grants_for_device(&self, device_id: &DeviceId) -> Vec<Arc<Grant>> {
        self.list_distinct()
            .into_iter()
            .filter(|g| g.is_held_by(device_id))
            .collect()
    }

    pub fn is_active(&self, domain: &Domain) -> bool {
        self.by_domain.contains_key(domain)
    }

    pub fn get(&self, domain: &Domain) -> Option<&Arc<Grant>> {
        self.by_domain.get(domain)
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    fn grants_on(&self, members: &BTreeSet<Domain>) -> Vec<Arc<Grant>> {
        let mut seen: HashSet<GrantId> = HashSet::new();
        members
            .iter()
            .filter_map(|m| self.by_domain.get(m))
            .filter(|g| seen.insert(g.id))
            .cloned()
            .collect()
    }

    fn detach(&mut self, grant: &Grant) {
        for member in &grant.members {
            if self
                .by_domain
                .get(member)
                .is_some_and(|g| g.id == grant.id)
            {
                self.by_domain.remove(member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Requester;

    fn class(names: &[&str]) -> BTreeSet<Domain> {
        names.iter().map(|n| Domain::new(*n)).collect()
    }

    fn grant(members: &BTreeSet<Domain>, device: &str, timer: u64) -> Arc<Grant> {
        let now = pguard_util::now();
        Arc::new(Grant {
            id: GrantId::new(),
            domain: members.iter().next().cloned().unwrap(),
            members: members.clone(),
            requester: Requester::new(device),
            scope: None,
            reason: "test".into(),
            granted_at: now,
            expires_at: now + chrono::Duration::minutes(15),
            timer: TimerHandle::from_raw(timer),
        })
    }

    #[test]
    fn put_covers_every_member() {
        let mut table = GrantTable::new();
        let members = class(&["a.com", "www.a.com"]);

        let superseded = table.put(&members, grant(&members, "d1", 1));

        assert!(superseded.is_empty());
        assert!(table.is_active(&Domain::new("a.com")));
        assert!(table.is_active(&Domain::new("www.a.com")));
        assert_eq!(table.list_distinct().len(), 1);
    }

    #[test]
    fn put_supersedes_whole_prior_grant() {
        let mut table = GrantTable::new();
        let old_members = class(&["a.com", "www.a.com"]);
        let old = grant(&old_members, "d1", 1);
        table.put(&old_members, Arc::clone(&old));

        // Narrower class: the prior grant's other member must be released too
        let new_members = class(&["a.com"]);
        let superseded = table.put(&new_members, grant(&new_members, "d2", 2));

        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].id, old.id);
        assert!(table.is_active(&Domain::new("a.com")));
        assert!(!table.is_active(&Domain::new("www.a.com")));
    }

    #[test]
    fn remove_detaches_full_class() {
        let mut table = GrantTable::new();
        let members = class(&["a.com", "www.a.com"]);
        table.put(&members, grant(&members, "d1", 1));

        let removed = table.remove(&class(&["www.a.com"]));

        assert!(removed.is_some());
        assert!(table.is_empty());
        assert!(table.remove(&members).is_none());
    }

    #[test]
    fn remove_owned_ignores_stale_timer() {
        let mut table = GrantTable::new();
        let members = class(&["a.com", "www.a.com"]);
        table.put(&members, grant(&members, "d1", 1));
        table.put(&members, grant(&members, "d1", 2));

        assert!(table.remove_owned(&members, TimerHandle::from_raw(1)).is_none());
        assert!(table.is_active(&Domain::new("a.com")));

        let removed = table.remove_owned(&members, TimerHandle::from_raw(2)).unwrap();
        assert_eq!(removed.timer, TimerHandle::from_raw(2));
        assert!(table.is_empty());
    }

    #[test]
    fn clear_and_device_lookup() {
        let mut table = GrantTable::new();
        let a = class(&["a.com", "www.a.com"]);
        let b = class(&["b.com"]);
        table.put(&a, grant(&a, "d1", 1));
        table.put(&b, grant(&b, "d2", 2));

        assert_eq!(table.grants_for_device(&DeviceId::new("d1")).len(), 1);
        for name in ["a.com", "www.a.com", "b.com"] {
            assert!(table.is_active(&Domain::new(name)));
        }

        let cleared = table.clear();
        assert_eq!(cleared.len(), 2);
        assert!(table.is_empty());
    }
}
