//! The memory.js boot stage.
//!
//! Before any model is consulted, the interpreter tries the thought's
//! compiled artifact. A memory.js failure is never fatal: every non-success
//! outcome is classified into a resume context the agent loop can act on.
//! The three shapes are "no memory.js exists, first run", a verbatim
//! `agent.resume(...)` context, and `memory.js error: <msg>`.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::sandbox::{
    EnvApprovalFn, NetApprovalFn, PathApprovalFn, Sandbox, SandboxConfig, SandboxError,
};

/// Configuration for the boot attempt.
#[derive(Default, Clone)]
pub struct BootConfig {
    pub memory_js_path: PathBuf,
    pub work_dir: PathBuf,
    /// Readable but NOT writable: this is what keeps the thought's
    /// policy.json out of the script's reach.
    pub thought_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub memories_dir: PathBuf,
    pub args: Vec<String>,
    pub approve_path: Option<PathApprovalFn>,
    pub approve_env: Option<EnvApprovalFn>,
    pub approve_net: Option<NetApprovalFn>,
    pub cancel: CancellationToken,
}

/// How the boot attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// memory.js handled the run; the payload is its output.
    Completed(String),
    /// The agent should take over, with this context string.
    Resume(String),
    /// The user interrupted an approval prompt (or the run was cancelled);
    /// the invocation terminates instead of resuming.
    Interrupted,
}

/// Try to run memory.js if it exists.
pub fn try_memory_js(cfg: BootConfig) -> BootOutcome {
    if !cfg.memory_js_path.exists() {
        return BootOutcome::Resume("no memory.js exists, first run".to_string());
    }

    let code = match std::fs::read_to_string(&cfg.memory_js_path) {
        Ok(code) => code,
        Err(e) => return BootOutcome::Resume(format!("failed to read memory.js: {e}")),
    };

    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![
            cfg.work_dir.clone(),
            cfg.thought_dir.clone(),
            cfg.workspace_dir.clone(),
            cfg.memories_dir.clone(),
        ],
        writable_paths: vec![
            cfg.workspace_dir.clone(),
            cfg.memories_dir.clone(),
            cfg.memory_js_path.clone(),
        ],
        work_dir: cfg.work_dir.clone(),
        args: cfg.args.clone(),
        timeout: None,
        approve_path: cfg.approve_path.clone(),
        approve_env: cfg.approve_env.clone(),
        approve_net: cfg.approve_net.clone(),
        on_write: None,
        cancel: cfg.cancel.clone(),
    });
    let sandbox = match sandbox {
        Ok(sandbox) => sandbox,
        Err(e) => return BootOutcome::Resume(format!("failed to create sandbox: {e}")),
    };

    match sandbox.run(&code) {
        Ok(output) => BootOutcome::Completed(output),
        Err(SandboxError::Resume(context)) => BootOutcome::Resume(context),
        Err(SandboxError::Interrupted) | Err(SandboxError::Cancelled) => BootOutcome::Interrupted,
        Err(e) => BootOutcome::Resume(format!("memory.js error: {e}")),
    }
}
