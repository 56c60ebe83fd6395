//! Configuration validation

use crate::policy::MAX_ENFORCEMENT_TIMEOUT_SECS;
use crate::schema::{RawConfig, RawEnforcementConfig};
use pguard_util::Domain;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid domain '{domain}' in [domains].{list}")]
    InvalidDomain { list: String, domain: String },

    #[error("Duplicate domain '{domain}' in [domains].{list}")]
    DuplicateDomain { list: String, domain: String },

    #[error("Domain '{0}' is both conditional and always_blocked")]
    OverlappingDomain(Domain),

    #[error("[enforcement].{0} cannot be empty")]
    EmptyCommand(String),

    #[error("[enforcement].timeout_seconds = {seconds} is out of range (1 to {max})")]
    InvalidTimeout { seconds: u64, max: u64 },

    #[error("[enforcement].hosts_path cannot be empty")]
    EmptyHostsPath,
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let conditional = validate_domain_list("conditional", &config.domains.conditional, &mut errors);
    let always_blocked =
        validate_domain_list("always_blocked", &config.domains.always_blocked, &mut errors);

    errors.extend(check_disjoint(&conditional, &always_blocked));
    errors.extend(validate_enforcement(&config.enforcement));

    errors
}

fn validate_domain_list(
    list: &str,
    raw: &[String],
    errors: &mut Vec<ValidationError>,
) -> Vec<Domain> {
    let mut seen = HashSet::new();
    let mut domains = Vec::with_capacity(raw.len());

    for name in raw {
        let domain = Domain::new(name);
        if !domain.is_valid_hostname() {
            errors.push(ValidationError::InvalidDomain {
                list: list.to_string(),
                domain: name.clone(),
            });
            continue;
        }
        if !seen.insert(domain.clone()) {
            errors.push(ValidationError::DuplicateDomain {
                list: list.to_string(),
                domain: domain.to_string(),
            });
            continue;
        }
        domains.push(domain);
    }

    domains
}

/// Report every domain present in both lists
pub fn check_disjoint<'a>(
    conditional: impl IntoIterator<Item = &'a Domain>,
    always_blocked: impl IntoIterator<Item = &'a Domain>,
) -> Vec<ValidationError> {
    let always: HashSet<&Domain> = always_blocked.into_iter().collect();
    let mut overlap: Vec<&Domain> = conditional
        .into_iter()
        .filter(|d| always.contains(d))
        .collect();
    overlap.sort();
    overlap.dedup();

    overlap
        .into_iter()
        .map(|d| ValidationError::OverlappingDomain(d.clone()))
        .collect()
}

fn validate_enforcement(enforcement: &RawEnforcementConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(cmd) = &enforcement.write_command
        && cmd.first().is_none_or(|program| program.is_empty())
    {
        errors.push(ValidationError::EmptyCommand("write_command".into()));
    }

    if let Some(cmd) = &enforcement.reload_command
        && cmd.first().is_none_or(|program| program.is_empty())
    {
        errors.push(ValidationError::EmptyCommand("reload_command".into()));
    }

    if let Some(seconds) = enforcement.timeout_seconds
        && !(1..=MAX_ENFORCEMENT_TIMEOUT_SECS).contains(&seconds)
    {
        errors.push(ValidationError::InvalidTimeout {
            seconds,
            max: MAX_ENFORCEMENT_TIMEOUT_SECS,
        });
    }

    if let Some(path) = &enforcement.hosts_path
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::EmptyHostsPath);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawDomains;

    fn config_with(conditional: &[&str], always_blocked: &[&str]) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            enforcement: Default::default(),
            domains: RawDomains {
                conditional: conditional.iter().map(|s| s.to_string()).collect(),
                always_blocked: always_blocked.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        let config = config_with(&["youtube.com", "www.youtube.com"], &["ads.example.com"]);
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_overlap_detection() {
        let config = config_with(&["reddit.com", "YouTube.com"], &["youtube.com"]);
        let errors = validate_config(&config);
        assert_eq!(
            errors,
            vec![ValidationError::OverlappingDomain(Domain::new("youtube.com"))]
        );
    }

    #[test]
    fn test_duplicate_detection_after_normalization() {
        let config = config_with(&["reddit.com", "Reddit.com."], &[]);
        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateDomain { list, .. } if list == "conditional")));
    }

    #[test]
    fn test_invalid_domain() {
        let config = config_with(&["https://reddit.com/r/rust"], &[]);
        let errors = validate_config(&config);
        assert!(matches!(errors[0], ValidationError::InvalidDomain { .. }));
    }

    #[test]
    fn test_enforcement_checks() {
        let mut config = config_with(&["reddit.com"], &[]);
        config.enforcement.write_command = Some(vec![]);
        config.enforcement.reload_command = Some(vec!["".into()]);
        config.enforcement.timeout_seconds = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::InvalidTimeout { seconds: 0, max: 60 }));
        assert!(errors.contains(&ValidationError::EmptyCommand("write_command".into())));
        assert!(errors.contains(&ValidationError::EmptyCommand("reload_command".into())));
    }

    #[test]
    fn test_timeout_upper_bound() {
        let mut config = config_with(&["reddit.com"], &[]);

        config.enforcement.timeout_seconds = Some(MAX_ENFORCEMENT_TIMEOUT_SECS);
        assert!(validate_config(&config).is_empty());

        config.enforcement.timeout_seconds = Some(3600);
        assert_eq!(
            validate_config(&config),
            vec![ValidationError::InvalidTimeout { seconds: 3600, max: 60 }]
        );
    }

    #[test]
    fn test_empty_hosts_path() {
        let mut config = config_with(&["reddit.com"], &[]);
        config.enforcement.hosts_path = Some(std::path::PathBuf::new());

        let errors = validate_config(&config);
        assert_eq!(errors, vec![ValidationError::EmptyHostsPath]);
        assert_eq!(
            errors[0].to_string(),
            "[enforcement].hosts_path cannot be empty"
        );
    }
}
