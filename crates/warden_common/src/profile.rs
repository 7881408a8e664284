//! Capability profile: who this unit is and what it may publish.
//!
//! Loaded once at startup from YAML and owned by the scheduler for the
//! lifetime of the process.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::subjects;

/// Permission gate consulted before any publish. The trait seam exists so
/// scheduler tests can run against a denying or allowing fake without a
/// profile file.
pub trait Authorize: Send + Sync {
    fn is_allowed(&self, subject: &str, action: &str) -> bool;
}

/// Unit identity and capability rules, immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub metadata: Metadata,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub unit_id: String,
    #[serde(default)]
    pub tenant: String,
}

/// One capability rule: exact subject, allowed actions ("pub", "sub").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub subject: String,
    #[serde(default)]
    pub allow: Vec<String>,
}

impl Profile {
    /// Load and parse the profile YAML. Failure here is a startup fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let profile: Profile = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        info!(
            "profile loaded: unit={} tenant={} rules={}",
            profile.metadata.unit_id,
            profile.metadata.tenant,
            profile.capabilities.len()
        );
        Ok(profile)
    }

    /// Check whether `action` is allowed on `subject`.
    ///
    /// Exact subject match against the rule table, action matched verbatim
    /// in the allow list. The unit's own heartbeat subject is always
    /// publishable: an absent or misconfigured capability list must never
    /// silence the liveness signal, so this override stays separate from
    /// the table scan.
    pub fn is_allowed(&self, subject: &str, action: &str) -> bool {
        for cap in &self.capabilities {
            if cap.subject == subject && cap.allow.iter().any(|a| a == action) {
                return true;
            }
        }
        if action == "pub" && subject == subjects::heartbeat(&self.metadata.unit_id) {
            return true;
        }
        false
    }
}

impl Authorize for Profile {
    fn is_allowed(&self, subject: &str, action: &str) -> bool {
        Profile::is_allowed(self, subject, action)
    }
}
