//! Alias resolution

use pguard_config::DomainSets;
use pguard_util::Domain;
use std::collections::BTreeSet;

/// Maps a domain to its alias class within the configured universe.
///
/// The class is the domain itself plus its `www.`-toggled spelling when that
/// spelling is also configured. Unknown domains resolve to themselves.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    domains: DomainSets,
}

impl AliasResolver {
    pub fn new(domains: DomainSets) -> Self {
        Self { domains }
    }

    pub fn domains(&self) -> &DomainSets {
        &self.domains
    }

    pub fn resolve(&self, domain: &Domain) -> BTreeSet<Domain> {
        let mut class = BTreeSet::from([domain.clone()]);

        if let Some(counterpart) = domain.www_counterpart()
            && self.domains.contains(&counterpart)
        {
            class.insert(counterpart);
        }

        class
    }
}
