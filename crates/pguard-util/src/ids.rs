//! Strongly-typed identifiers for pguard

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const WWW_PREFIX: &str = "www.";

/// A normalized hostname under management.
///
/// Normalization lowercases, trims surrounding whitespace and drops a single
/// trailing root dot, so `WWW.Example.com.` and `www.example.com` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn new(name: impl AsRef<str>) -> Self {
        let trimmed = name.as_ref().trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        Self(trimmed.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `www.`-toggled spelling: `www.x` for `x`, `x` for `www.x`.
    ///
    /// Returns `None` for a bare `www.` with nothing after it.
    pub fn www_counterpart(&self) -> Option<Domain> {
        match self.0.strip_prefix(WWW_PREFIX) {
            Some("") => None,
            Some(base) => Some(Self(base.to_string())),
            None => Some(Self(format!("{WWW_PREFIX}{}", self.0))),
        }
    }

    /// Check that this is a plausible DNS hostname: dot-separated labels of
    /// 1-63 ASCII alphanumerics or hyphens, not starting or ending with a hyphen.
    pub fn is_valid_hostname(&self) -> bool {
        if self.0.is_empty() || self.0.len() > 253 {
            return false;
        }

        self.0.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.0
    }
}

/// Identifier of the device a grant was issued to (typically its LAN IP)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a single grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(Uuid);

impl GrantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
