//! Configuration parsing and validation for pguard
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Conditional and always-blocked domain lists (validated disjoint)
//! - Enforcement point settings (hosts file, privileged write, reload)
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    let policy = Policy::from_raw(raw);
    if policy.domains.conditional().is_empty() {
        tracing::warn!("No conditional domains configured; nothing can be granted");
    }

    Ok(policy)
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use pguard_util::Domain;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [domains]
            conditional = ["YouTube.com", "www.youtube.com"]
            always_blocked = ["ads.example.com"]
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.domains.conditional().len(), 2);
        assert!(policy.domains.is_conditional(&Domain::new("youtube.com")));
        assert!(policy.domains.is_always_blocked(&Domain::new("ads.example.com")));
        assert_eq!(policy.enforcement.timeout, DEFAULT_ENFORCEMENT_TIMEOUT);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            data_dir = "/var/lib/pguard"

            [enforcement]
            hosts_path = "/tmp/blocked_hosts"
            write_command = ["sudo", "tee"]
            reload_command = ["sudo", "systemctl", "reload", "dnsmasq"]
            timeout_seconds = 2

            [domains]
            conditional = ["reddit.com"]
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.service.data_dir, std::path::PathBuf::from("/var/lib/pguard"));
        assert_eq!(
            policy.enforcement.write_command,
            Some(vec!["sudo".to_string(), "tee".to_string()])
        );
        assert_eq!(policy.enforcement.timeout, Duration::from_secs(2));
        assert!(matches!(policy.enforcement.reload, ReloadMethod::Command(ref c) if c[2] == "reload"));
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [domains]
            conditional = ["reddit.com"]
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_overlapping_lists() {
        let config = r#"
            config_version = 1

            [domains]
            conditional = ["reddit.com", "ads.example.com"]
            always_blocked = ["ads.example.com"]
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(
                    errors,
                    vec![ValidationError::OverlappingDomain(Domain::new("ads.example.com"))]
                );
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "config_version = 1\n[domains]\nconditional = [\"reddit.com\"]"
        )
        .unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.domains.len(), 1);
    }

    #[test]
    fn load_missing_file() {
        let result = load_config("/nonexistent/pguard/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
