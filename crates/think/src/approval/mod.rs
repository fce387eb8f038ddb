//! The approval engine.
//!
//! Every sensitive operation a sandboxed script attempts — reading a path
//! outside its roots, an env var, an outbound host — funnels through the
//! [`Approver`]. It consults the global and per-thought policies, and only
//! when those are inconclusive does it prompt the user. Prompt answers can
//! be persisted back into the thought policy, which is how a thought
//! accumulates standing permissions over time.
//!
//! Decision cascade for a path request:
//!
//! 1. The thought's own `policy.json` is never writable or deletable from
//!    the sandbox, regardless of policy contents.
//! 2. `protected` entries of the **global** policy; an allow/deny verdict
//!    here is final and a thought policy cannot undo it.
//! 3. A session-wide allow-all grant (the user chose "for this session").
//! 4. The thought policy's most specific matching entry; `prompt` falls
//!    through.
//! 5. The global policy's regular entries, same rule.
//! 6. The thought default, then the global default.
//! 7. Prompt when stderr is a terminal; deny otherwise.
//!
//! Env and host requests use the same cascade minus the mode bits and the
//! policy-file guard.

mod prompt;
mod tty_lock;

pub use prompt::PromptOutcome;
pub use tty_lock::PromptLock;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::policy::{self, Approval, Policy, PolicyStoreError, Source};

/// Errors surfaced by approval checks.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// The user interrupted a prompt (Ctrl-C / Esc). Callers terminate the
    /// whole invocation with exit code 130.
    #[error("interrupted")]
    Interrupted,
    #[error("prompt i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("persisting policy: {0}")]
    Store(String),
}

/// A filesystem operation category, as seen by the policy layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOp {
    Read,
    List,
    Write,
    Delete,
}

impl PathOp {
    /// The policy mode bit this operation needs.
    pub fn mode_char(self) -> char {
        match self {
            PathOp::Read | PathOp::List => 'r',
            PathOp::Write => 'w',
            PathOp::Delete => 'd',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathOp::Read => "read",
            PathOp::List => "list",
            PathOp::Write => "write",
            PathOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for PathOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grants made for the lifetime of one invocation, never persisted.
#[derive(Debug, Default)]
struct SessionGrants {
    allow_all_paths: bool,
    env: HashSet<String>,
    hosts: HashSet<String>,
}

/// Policy-consulting mediator for all sandbox side effects.
///
/// Thread-safe: approval checks run on the sandbox's blocking thread while
/// the owner lives on the async side.
pub struct Approver {
    thought_policy_path: PathBuf,
    thought_policy: Mutex<Policy>,
    global_policy: Policy,
    locks_dir: Option<PathBuf>,
    is_tty: bool,
    session: Mutex<SessionGrants>,
}

impl std::fmt::Debug for Approver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Approver")
            .field("thought_policy_path", &self.thought_policy_path)
            .field("is_tty", &self.is_tty)
            .finish_non_exhaustive()
    }
}

impl Approver {
    /// Create an approver for a thought directory, optionally layering a
    /// global policy underneath.
    pub fn new(
        thought_dir: &Path,
        global_policy_path: Option<&Path>,
    ) -> Result<Self, PolicyStoreError> {
        // The escalation guard compares against symlink-resolved sandbox
        // paths, so resolve our side too where possible.
        let thought_policy_path = match thought_dir.canonicalize() {
            Ok(real) => real.join("policy.json"),
            Err(_) => thought_dir.join("policy.json"),
        };
        let thought_policy = policy::load_policy(&thought_policy_path)?;
        let global_policy = match global_policy_path {
            Some(path) => policy::load_policy(path)?,
            None => Policy::default(),
        };

        Ok(Self {
            thought_policy_path,
            thought_policy: Mutex::new(thought_policy),
            global_policy,
            locks_dir: None,
            is_tty: std::io::stderr().is_terminal(),
            session: Mutex::new(SessionGrants::default()),
        })
    }

    /// Serialize prompts against other invocations through lock files in
    /// `dir`.
    pub fn with_locks_dir(mut self, dir: PathBuf) -> Self {
        self.locks_dir = Some(dir);
        self
    }

    /// Override terminal detection. When false, inconclusive requests are
    /// denied instead of prompted.
    pub fn with_is_tty(mut self, is_tty: bool) -> Self {
        self.is_tty = is_tty;
        self
    }

    /// Seed the thought policy on first run: workspace and memories are
    /// fully writable, the working directory is readable, and the policy
    /// file itself is denied. Idempotent — a policy that already has path
    /// entries is left untouched.
    pub fn bootstrap_defaults(
        &self,
        workspace_dir: &Path,
        memories_dir: &Path,
        work_dir: &Path,
    ) -> Result<(), ApprovalError> {
        let mut policy = self.thought_policy.lock().expect("policy lock");
        if !policy.paths.entries.is_empty() {
            return Ok(());
        }

        let policy_file = self.thought_policy_path.display().to_string();
        policy.add_path_entry(
            &workspace_dir.display().to_string(),
            "rwd",
            Approval::Allow,
            Source::Default,
        );
        policy.add_path_entry(
            &memories_dir.display().to_string(),
            "rwd",
            Approval::Allow,
            Source::Default,
        );
        policy.add_path_entry(
            &work_dir.display().to_string(),
            "r",
            Approval::Allow,
            Source::Default,
        );
        policy.add_path_entry(&policy_file, "rwd", Approval::Deny, Source::Default);

        policy::save_policy(&self.thought_policy_path, &policy)
            .map_err(|e| ApprovalError::Store(e.to_string()))
    }

    /// Decide a filesystem request. `path` must already be resolved and
    /// absolute (the sandbox's job).
    pub fn approve_path(&self, op: PathOp, path: &Path) -> Result<bool, ApprovalError> {
        let mode = op.mode_char();
        let path_str = path.display().to_string();

        // The thought policy file is a privilege-escalation target; no
        // verdict anywhere can open it up.
        if path == self.thought_policy_path || path.starts_with(&self.thought_policy_path) {
            tracing::debug!(path = %path_str, "denied: thought policy file");
            return Ok(false);
        }

        if let Some(entry) = self.global_policy.paths.match_protected(&path_str, mode) {
            match entry.approval {
                Approval::Allow => return Ok(true),
                Approval::Deny => {
                    tracing::debug!(path = %path_str, op = %op, "denied: protected entry");
                    return Ok(false);
                }
                Approval::Prompt => {}
            }
        }

        if self.session.lock().expect("session lock").allow_all_paths {
            return Ok(true);
        }

        {
            let thought = self.thought_policy.lock().expect("policy lock");
            if let Some(entry) = thought.paths.match_path(&path_str, mode) {
                match entry.approval {
                    Approval::Allow => return Ok(true),
                    Approval::Deny => {
                        tracing::debug!(path = %path_str, op = %op, "denied: thought policy");
                        return Ok(false);
                    }
                    Approval::Prompt => {}
                }
            }
        }

        if let Some(entry) = self.global_policy.paths.match_path(&path_str, mode) {
            match entry.approval {
                Approval::Allow => return Ok(true),
                Approval::Deny => {
                    tracing::debug!(path = %path_str, op = %op, "denied: global policy");
                    return Ok(false);
                }
                Approval::Prompt => {}
            }
        }

        let thought_default = self
            .thought_policy
            .lock()
            .expect("policy lock")
            .paths
            .default;
        for default in [thought_default, self.global_policy.paths.default] {
            match default {
                Approval::Allow => return Ok(true),
                Approval::Deny => return Ok(false),
                Approval::Prompt => {}
            }
        }

        if !self.is_tty {
            tracing::debug!(path = %path_str, op = %op, "denied: no terminal to prompt");
            return Ok(false);
        }

        match prompt::ask(op.as_str(), &path_str, self.locks_dir.as_deref())? {
            PromptOutcome::Once => Ok(true),
            PromptOutcome::Session => {
                self.session.lock().expect("session lock").allow_all_paths = true;
                Ok(true)
            }
            PromptOutcome::Always => {
                self.persist_path(&path_str, mode, Approval::Allow)?;
                Ok(true)
            }
            PromptOutcome::Deny => {
                self.persist_path(&path_str, mode, Approval::Deny)?;
                Ok(false)
            }
        }
    }

    /// Decide an environment variable read.
    pub fn approve_env(&self, name: &str) -> Result<bool, ApprovalError> {
        if self.session.lock().expect("session lock").env.contains(name) {
            return Ok(true);
        }

        {
            let thought = self.thought_policy.lock().expect("policy lock");
            if let Some(entry) = thought.env.match_env(name) {
                match entry.approval {
                    Approval::Allow => return Ok(true),
                    Approval::Deny => {
                        tracing::debug!(name, "denied: thought policy");
                        return Ok(false);
                    }
                    Approval::Prompt => {}
                }
            }
        }

        if let Some(entry) = self.global_policy.env.match_env(name) {
            match entry.approval {
                Approval::Allow => return Ok(true),
                Approval::Deny => {
                    tracing::debug!(name, "denied: global policy");
                    return Ok(false);
                }
                Approval::Prompt => {}
            }
        }

        let thought_default = self.thought_policy.lock().expect("policy lock").env.default;
        for default in [thought_default, self.global_policy.env.default] {
            match default {
                Approval::Allow => return Ok(true),
                Approval::Deny => return Ok(false),
                Approval::Prompt => {}
            }
        }

        if !self.is_tty {
            return Ok(false);
        }

        match prompt::ask("env", name, self.locks_dir.as_deref())? {
            PromptOutcome::Once => Ok(true),
            PromptOutcome::Session => {
                self.session
                    .lock()
                    .expect("session lock")
                    .env
                    .insert(name.to_string());
                Ok(true)
            }
            PromptOutcome::Always => {
                self.persist_env(name, Approval::Allow)?;
                Ok(true)
            }
            PromptOutcome::Deny => {
                self.persist_env(name, Approval::Deny)?;
                Ok(false)
            }
        }
    }

    /// Decide an outbound network request to `host`.
    pub fn approve_net(&self, host: &str) -> Result<bool, ApprovalError> {
        if self
            .session
            .lock()
            .expect("session lock")
            .hosts
            .contains(host)
        {
            return Ok(true);
        }

        {
            let thought = self.thought_policy.lock().expect("policy lock");
            if let Some(entry) = thought.net.hosts.match_host(host) {
                match entry.approval {
                    Approval::Allow => return Ok(true),
                    Approval::Deny => {
                        tracing::debug!(host, "denied: thought policy");
                        return Ok(false);
                    }
                    Approval::Prompt => {}
                }
            }
        }

        if let Some(entry) = self.global_policy.net.hosts.match_host(host) {
            match entry.approval {
                Approval::Allow => return Ok(true),
                Approval::Deny => {
                    tracing::debug!(host, "denied: global policy");
                    return Ok(false);
                }
                Approval::Prompt => {}
            }
        }

        let thought_default = self
            .thought_policy
            .lock()
            .expect("policy lock")
            .net
            .hosts
            .default;
        for default in [thought_default, self.global_policy.net.hosts.default] {
            match default {
                Approval::Allow => return Ok(true),
                Approval::Deny => return Ok(false),
                Approval::Prompt => {}
            }
        }

        if !self.is_tty {
            return Ok(false);
        }

        match prompt::ask("net", host, self.locks_dir.as_deref())? {
            PromptOutcome::Once => Ok(true),
            PromptOutcome::Session => {
                self.session
                    .lock()
                    .expect("session lock")
                    .hosts
                    .insert(host.to_string());
                Ok(true)
            }
            PromptOutcome::Always => {
                self.persist_host(host, Approval::Allow)?;
                Ok(true)
            }
            PromptOutcome::Deny => {
                self.persist_host(host, Approval::Deny)?;
                Ok(false)
            }
        }
    }

    /// Sandbox-shaped closure over [`Approver::approve_path`].
    pub fn path_callback(self: &std::sync::Arc<Self>) -> crate::sandbox::PathApprovalFn {
        let approver = std::sync::Arc::clone(self);
        std::sync::Arc::new(move |op, path| approver.approve_path(op, path))
    }

    /// Sandbox-shaped closure over [`Approver::approve_env`].
    pub fn env_callback(self: &std::sync::Arc<Self>) -> crate::sandbox::EnvApprovalFn {
        let approver = std::sync::Arc::clone(self);
        std::sync::Arc::new(move |name| approver.approve_env(name))
    }

    /// Sandbox-shaped closure over [`Approver::approve_net`].
    pub fn net_callback(self: &std::sync::Arc<Self>) -> crate::sandbox::NetApprovalFn {
        let approver = std::sync::Arc::clone(self);
        std::sync::Arc::new(move |host| approver.approve_net(host))
    }

    fn persist_path(&self, path: &str, mode: char, approval: Approval) -> Result<(), ApprovalError> {
        let mut policy = self.thought_policy.lock().expect("policy lock");
        policy.add_path_entry(path, &mode.to_string(), approval, Source::Prompt);
        policy::save_policy(&self.thought_policy_path, &policy)
            .map_err(|e| ApprovalError::Store(e.to_string()))
    }

    fn persist_env(&self, name: &str, approval: Approval) -> Result<(), ApprovalError> {
        let mut policy = self.thought_policy.lock().expect("policy lock");
        policy.add_env_entry(name, approval, Source::Prompt);
        policy::save_policy(&self.thought_policy_path, &policy)
            .map_err(|e| ApprovalError::Store(e.to_string()))
    }

    fn persist_host(&self, host: &str, approval: Approval) -> Result<(), ApprovalError> {
        let mut policy = self.thought_policy.lock().expect("policy lock");
        policy.add_host_entry(host, approval, Source::Prompt);
        policy::save_policy(&self.thought_policy_path, &policy)
            .map_err(|e| ApprovalError::Store(e.to_string()))
    }
}
