//! On-disk policy documents and their matching rules.
//!
//! A policy controls three request categories: filesystem paths (with
//! per-entry `r`/`w`/`d` mode bits), environment variable reads, and
//! outbound network hosts. Every entry carries a pattern, a verdict, the
//! source that created it, and a creation timestamp.
//!
//! Two policies participate in every decision: the global policy at
//! `<home>/policy.json` (read-only from the core, and the only place
//! `protected` entries are honored) and the per-thought policy at
//! `<home>/thoughts/<name>/policy.json`. The [`crate::approval::Approver`]
//! cascades across both.
//!
//! Matching is deterministic:
//! - paths: literal prefix-directory containment — `/a/b` matches `/a/b`
//!   and `/a/b/...` but not `/a/bc`; the longest matching pattern wins;
//! - env names: literal, or a `NAME_*` suffix wildcard;
//! - hosts: literal, or a `*.domain` leading wildcard that matches any
//!   subdomain but never the bare domain.

mod store;

pub use store::{PolicyStoreError, load_policy, save_policy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy schema version for migrations.
pub const POLICY_VERSION: u32 = 1;

/// An approval verdict attached to a policy entry or default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Allow,
    Deny,
    Prompt,
}

/// How a policy entry came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Auto-generated on first run.
    Default,
    /// The user answered an approval prompt.
    Prompt,
    /// Hand-edited.
    Config,
    /// Added through the CLI.
    Cli,
}

/// The complete policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,
    pub paths: PathPolicy,
    pub env: EnvPolicy,
    pub net: NetPolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION,
            paths: PathPolicy {
                default: Approval::Prompt,
                entries: Vec::new(),
                protected: Vec::new(),
            },
            env: EnvPolicy {
                default: Approval::Prompt,
                entries: Vec::new(),
            },
            net: NetPolicy {
                hosts: HostPolicy {
                    default: Approval::Prompt,
                    entries: Vec::new(),
                },
                listen: ListenPolicy {
                    default: Approval::Deny,
                    entries: Vec::new(),
                },
            },
        }
    }
}

impl Policy {
    pub fn add_path_entry(&mut self, path: &str, mode: &str, approval: Approval, source: Source) {
        self.paths.entries.push(PathEntry {
            path: path.to_string(),
            mode: mode.to_string(),
            approval,
            source: Some(source),
            created: Some(Utc::now()),
        });
    }

    pub fn add_env_entry(&mut self, name: &str, approval: Approval, source: Source) {
        self.env.entries.push(EnvEntry {
            name: name.to_string(),
            approval,
            source: Some(source),
            created: Some(Utc::now()),
        });
    }

    pub fn add_host_entry(&mut self, host: &str, approval: Approval, source: Source) {
        self.net.hosts.entries.push(HostEntry {
            host: host.to_string(),
            approval,
            source: Some(source),
            created: Some(Utc::now()),
        });
    }
}

/// Filesystem access rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPolicy {
    pub default: Approval,
    #[serde(default)]
    pub entries: Vec<PathEntry>,
    /// Only meaningful in the global policy: entries here are consulted
    /// first and a thought policy cannot override them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected: Vec<PathEntry>,
}

impl PathPolicy {
    /// The most specific (longest pattern) entry matching `path` that
    /// carries `mode_char`.
    pub fn match_path(&self, path: &str, mode_char: char) -> Option<&PathEntry> {
        self.entries
            .iter()
            .filter(|e| e.has_mode(mode_char) && path_matches(&e.path, path))
            .max_by_key(|e| e.path.len())
    }

    /// The first protected entry matching `path` with `mode_char`.
    pub fn match_protected(&self, path: &str, mode_char: char) -> Option<&PathEntry> {
        self.protected
            .iter()
            .find(|e| e.has_mode(mode_char) && path_matches(&e.path, path))
    }
}

/// A single path permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    pub path: String,
    /// Combination of `r`, `w`, `d`.
    pub mode: String,
    pub approval: Approval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl PathEntry {
    pub fn has_mode(&self, mode_char: char) -> bool {
        self.mode.contains(mode_char)
    }

    pub fn has_read(&self) -> bool {
        self.has_mode('r')
    }

    pub fn has_write(&self) -> bool {
        self.has_mode('w')
    }

    pub fn has_delete(&self) -> bool {
        self.has_mode('d')
    }
}

/// Environment variable read rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvPolicy {
    pub default: Approval,
    #[serde(default)]
    pub entries: Vec<EnvEntry>,
}

impl EnvPolicy {
    pub fn match_env(&self, name: &str) -> Option<&EnvEntry> {
        self.entries.iter().find(|e| env_matches(&e.name, name))
    }
}

/// A single env var permission. The name supports a suffix wildcard like
/// `AWS_*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvEntry {
    pub name: String,
    pub approval: Approval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Network rules: outbound hosts and inbound listen ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetPolicy {
    pub hosts: HostPolicy,
    pub listen: ListenPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPolicy {
    pub default: Approval,
    #[serde(default)]
    pub entries: Vec<HostEntry>,
}

impl HostPolicy {
    pub fn match_host(&self, host: &str) -> Option<&HostEntry> {
        self.entries.iter().find(|e| host_matches(&e.host, host))
    }
}

/// A single host permission. Supports a leading wildcard like `*.github.com`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub host: String,
    pub approval: Approval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenPolicy {
    pub default: Approval,
    #[serde(default)]
    pub entries: Vec<ListenEntry>,
}

/// A single port permission: one port or a range like `3000-3999`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenEntry {
    pub port: String,
    pub approval: Approval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Pattern match for paths: exact, or the pattern is a directory containing
/// the path.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    path.strip_prefix(pattern)
        .is_some_and(|rest| rest.starts_with(std::path::MAIN_SEPARATOR))
}

/// Pattern match for env names: exact, or a `PREFIX_*` suffix wildcard.
pub fn env_matches(pattern: &str, name: &str) -> bool {
    if pattern == name {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => false,
    }
}

/// Pattern match for hosts: exact, or a `*.domain` wildcard that matches
/// any subdomain depth but never the bare domain.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    if pattern == host {
        return true;
    }
    match pattern.strip_prefix('*') {
        Some(suffix) if pattern.starts_with("*.") => host.ends_with(suffix),
        _ => false,
    }
}
