//! The embedded JavaScript sandbox.
//!
//! A [`Sandbox`] runs one synchronous JS program to completion inside a
//! QuickJS VM and returns the last expression value as a string. The VM has
//! no ambient authority: every filesystem, network, and environment access
//! goes through a host bridge, and every bridge funnels paths through a
//! single [`resolve`](RunState::resolve) chokepoint that evaluates symlinks
//! *before* authorization and falls back to the approval callbacks for
//! anything outside the granted roots.
//!
//! Access model:
//! - `allowed_paths` — roots the script may read freely. Symlink-resolved
//!   at construction so a symlink planted later cannot widen the scope.
//! - `writable_paths` — either an exact directory (covering descendants) or
//!   an exact file. `memory.js` can be writable without its parent
//!   directory being writable, which is what keeps a sibling `policy.json`
//!   out of reach.
//! - everything else — the `approve_*` callbacks decide, or the operation
//!   fails with a JS `Error`.
//!
//! Control flow out of the VM is by tagged signal: `process.exit` and
//! `agent.resume` record a [`ControlSignal`] and unwind with an exception;
//! the runner classifies the outcome after evaluation. Cancellation and the
//! optional wall-clock timeout are wired through the QuickJS interrupt
//! handler.

mod agent;
mod console;
mod convert;
mod env;
mod fs;
mod net;
mod process;
mod require;
mod sys;

use std::cell::{Cell, RefCell};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Runtime, Value};
use tokio_util::sync::CancellationToken;

use crate::approval::{ApprovalError, PathOp};

/// Callback deciding a filesystem request that escaped the sandbox roots.
pub type PathApprovalFn = Arc<dyn Fn(PathOp, &Path) -> Result<bool, ApprovalError> + Send + Sync>;
/// Callback deciding an environment variable read.
pub type EnvApprovalFn = Arc<dyn Fn(&str) -> Result<bool, ApprovalError> + Send + Sync>;
/// Callback deciding an outbound network request.
pub type NetApprovalFn = Arc<dyn Fn(&str) -> Result<bool, ApprovalError> + Send + Sync>;
/// Observer invoked after each successful file write (UI echo).
pub type WriteObserverFn = Arc<dyn Fn(&Path, &str) + Send + Sync>;

/// Everything needed to create a [`Sandbox`].
#[derive(Default, Clone)]
pub struct SandboxConfig {
    /// Roots the script may read without approval.
    pub allowed_paths: Vec<PathBuf>,
    /// Exact directories (with descendants) or exact files the script may
    /// write and delete without approval.
    pub writable_paths: Vec<PathBuf>,
    /// Base for relative path resolution; also `process.cwd()`.
    pub work_dir: PathBuf,
    /// Script arguments, exposed as `process.args`.
    pub args: Vec<String>,
    /// Optional wall-clock limit. `None` for interactive runs, where an
    /// approval prompt must not race a timer.
    pub timeout: Option<Duration>,
    pub approve_path: Option<PathApprovalFn>,
    pub approve_env: Option<EnvApprovalFn>,
    pub approve_net: Option<NetApprovalFn>,
    pub on_write: Option<WriteObserverFn>,
    pub cancel: CancellationToken,
}

/// Errors (and cooperative signals) from a sandbox run.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A JS-level failure; carries only the script-visible message.
    #[error("{0}")]
    Js(String),
    /// `process.exit(n)` with a non-zero code.
    #[error("script exited with code {0}")]
    Exit(i32),
    /// `agent.resume(ctx)` — the script asks the agent to take over.
    #[error("agent.resume: {0}")]
    Resume(String),
    /// The user interrupted an approval prompt.
    #[error("interrupted")]
    Interrupted,
    /// Host-side cancellation (Ctrl-C).
    #[error("execution cancelled")]
    Cancelled,
    #[error("execution timed out")]
    TimedOut,
    #[error("creating sandbox: {0}")]
    Setup(String),
}

/// A cooperative signal raised by a bridge to unwind the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlSignal {
    Exit(i32),
    Resume(String),
}

/// Per-run state shared with every bridge closure.
pub(crate) struct RunState {
    allowed_paths: Vec<PathBuf>,
    writable_paths: Vec<PathBuf>,
    work_dir: PathBuf,
    args: Vec<String>,
    approve_path: Option<PathApprovalFn>,
    approve_env: Option<EnvApprovalFn>,
    approve_net: Option<NetApprovalFn>,
    on_write: Option<WriteObserverFn>,
    cancel: CancellationToken,
    interrupted: Cell<bool>,
    signal: RefCell<Option<ControlSignal>>,
}

impl RunState {
    pub(crate) fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub(crate) fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_paths
    }

    pub(crate) fn notify_write(&self, path: &Path, content: &str) {
        if let Some(observer) = &self.on_write {
            observer(path, content);
        }
    }

    pub(crate) fn set_signal(&self, signal: ControlSignal) {
        *self.signal.borrow_mut() = Some(signal);
    }

    pub(crate) fn approve_env(&self, name: &str) -> Result<bool, String> {
        match &self.approve_env {
            Some(cb) => cb(name).map_err(|e| self.map_approval_err(e)),
            None => Ok(true),
        }
    }

    pub(crate) fn approve_net(&self, host: &str) -> Result<Option<bool>, String> {
        match &self.approve_net {
            Some(cb) => cb(host).map(Some).map_err(|e| self.map_approval_err(e)),
            None => Ok(None),
        }
    }

    fn map_approval_err(&self, err: ApprovalError) -> String {
        if matches!(err, ApprovalError::Interrupted) {
            self.interrupted.set(true);
        }
        err.to_string()
    }

    /// The single path chokepoint. Resolves a user-supplied path against
    /// the work dir, evaluates symlinks (parent resolution for paths that
    /// do not exist yet), and authorizes against the sandbox scopes with
    /// the approval callback as the last resort.
    pub(crate) fn resolve(&self, op: PathOp, user_path: &str) -> Result<PathBuf, String> {
        let requested = Path::new(user_path);
        let abs = if requested.is_absolute() {
            clean_path(requested)
        } else {
            clean_path(&self.work_dir.join(requested))
        };

        let real = match abs.canonicalize() {
            Ok(real) => real,
            Err(_) => {
                // Not yet on disk: resolve the parent and re-append the
                // final component so a symlinked parent still can't lie.
                let (parent, base) = match (abs.parent(), abs.file_name()) {
                    (Some(parent), Some(base)) => (parent, base),
                    _ => return Err(format!("path not accessible: {user_path}")),
                };
                match parent.canonicalize() {
                    Ok(real_parent) => real_parent.join(base),
                    Err(_) => return Err(format!("path not accessible: {user_path}")),
                }
            }
        };

        let contained = |roots: &[PathBuf]| {
            roots
                .iter()
                .any(|root| real == *root || real.starts_with(root))
        };

        match op {
            PathOp::Write | PathOp::Delete => {
                if contained(&self.writable_paths) {
                    return Ok(real);
                }
            }
            PathOp::Read | PathOp::List => {
                if contained(&self.allowed_paths) {
                    return Ok(real);
                }
            }
        }

        if let Some(cb) = &self.approve_path {
            match cb(op, &real) {
                Ok(true) => return Ok(real),
                Ok(false) => {}
                Err(e) => return Err(self.map_approval_err(e)),
            }
        }

        Err(format!(
            "access denied: path {user_path:?} is outside the sandbox"
        ))
    }
}

/// Executes JavaScript with restricted filesystem, network, and environment
/// access.
pub struct Sandbox {
    state: Rc<RunState>,
    timeout: Option<Duration>,
}

impl Sandbox {
    /// Create a sandbox. Allowed and writable paths are symlink-resolved
    /// here, at construction, so runtime checks can't be tricked by links
    /// planted afterwards. Roots that don't exist yet pass through as
    /// absolute paths (the workspace is created on first use).
    pub fn new(cfg: SandboxConfig) -> Result<Self, SandboxError> {
        let resolve_root = |path: &PathBuf| -> PathBuf {
            let abs = if path.is_absolute() {
                clean_path(path)
            } else {
                match std::env::current_dir() {
                    Ok(cwd) => clean_path(&cwd.join(path)),
                    Err(_) => clean_path(path),
                }
            };
            match abs.canonicalize() {
                Ok(real) => real,
                Err(_) => match (abs.parent(), abs.file_name()) {
                    (Some(parent), Some(base)) => match parent.canonicalize() {
                        Ok(real_parent) => real_parent.join(base),
                        Err(_) => abs,
                    },
                    _ => abs,
                },
            }
        };

        let allowed_paths = cfg.allowed_paths.iter().map(&resolve_root).collect();
        let writable_paths = cfg.writable_paths.iter().map(&resolve_root).collect();

        // The work dir must match the resolved roots or containment checks
        // on relative paths would miss.
        let work_dir = match cfg.work_dir.canonicalize() {
            Ok(real) => real,
            Err(_) => cfg.work_dir.clone(),
        };

        Ok(Self {
            state: Rc::new(RunState {
                allowed_paths,
                writable_paths,
                work_dir,
                args: cfg.args,
                approve_path: cfg.approve_path,
                approve_env: cfg.approve_env,
                approve_net: cfg.approve_net,
                on_write: cfg.on_write,
                cancel: cfg.cancel,
                interrupted: Cell::new(false),
                signal: RefCell::new(None),
            }),
            timeout: cfg.timeout,
        })
    }

    /// Run a JS program to termination and return the last expression value
    /// as a string: raw for primitives, JSON for objects and arrays, empty
    /// for undefined/null.
    pub fn run(&self, code: &str) -> Result<String, SandboxError> {
        let runtime = Runtime::new().map_err(|e| SandboxError::Setup(e.to_string()))?;
        let context =
            Context::full(&runtime).map_err(|e| SandboxError::Setup(e.to_string()))?;

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let cancel = self.state.cancel.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d)
        })));

        let state = Rc::clone(&self.state);
        let outcome: Result<String, String> = context.with(|ctx| {
            install_bridges(&ctx, &state).map_err(|e| e.to_string())?;

            match ctx.eval::<Value, _>(code).catch(&ctx) {
                Ok(value) => Ok(last_value_string(&ctx, &value)),
                Err(caught) => Err(caught_message(caught)),
            }
        });

        // Classification order matters: an interrupted prompt and the
        // cooperative signals both surface as JS exceptions, so the flags
        // win over whatever message the unwind produced.
        if self.state.interrupted.get() {
            return Err(SandboxError::Interrupted);
        }
        if let Some(signal) = self.state.signal.borrow_mut().take() {
            return match signal {
                ControlSignal::Exit(0) => Ok(String::new()),
                ControlSignal::Exit(code) => Err(SandboxError::Exit(code)),
                ControlSignal::Resume(context) => Err(SandboxError::Resume(context)),
            };
        }
        match outcome {
            Ok(value) => Ok(value),
            Err(message) => {
                if self.state.cancel.is_cancelled() {
                    Err(SandboxError::Cancelled)
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    Err(SandboxError::TimedOut)
                } else {
                    Err(SandboxError::Js(message))
                }
            }
        }
    }
}

/// Install the host bridges: native functions on a `__host` object, then a
/// JS glue layer that shapes them into the public `fs`/`net`/`env`/`sys`/
/// `console`/`process`/`agent`/`require` globals. The glue captures the
/// host object before it is removed from the global scope.
fn install_bridges(ctx: &Ctx<'_>, state: &Rc<RunState>) -> rquickjs::Result<()> {
    let host = rquickjs::Object::new(ctx.clone())?;
    console::register(ctx, &host, state)?;
    fs::register(ctx, &host, state)?;
    net::register(ctx, &host, state)?;
    env::register(ctx, &host, state)?;
    process::register(ctx, &host, state)?;
    sys::register(ctx, &host)?;
    agent::register(ctx, &host, state)?;
    require::register(ctx, &host, state)?;
    ctx.globals().set("__host", host)?;

    for prelude in [
        console::PRELUDE,
        fs::PRELUDE,
        net::PRELUDE,
        env::PRELUDE,
        process::PRELUDE,
        sys::PRELUDE,
        agent::PRELUDE,
        require::PRELUDE,
    ] {
        ctx.eval::<(), _>(prelude)?;
    }
    ctx.eval::<(), _>("delete globalThis.__host;")?;
    Ok(())
}

/// Extract a clean, script-level message from a caught JS error. Host stack
/// traces never leak to the caller.
fn caught_message(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => {
            let message = exception.message().unwrap_or_default();
            if message.is_empty() {
                "exception".to_string()
            } else {
                message
            }
        }
        CaughtError::Value(value) => value
            .as_string()
            .and_then(|s| s.to_string().ok())
            .unwrap_or_else(|| "exception".to_string()),
        CaughtError::Error(error) => error.to_string(),
    }
}

fn last_value_string<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    if value.is_undefined() || value.is_null() {
        return String::new();
    }
    convert::stringify(ctx, value)
}

/// Lexically normalize a path: drop `.` components, fold `..` where a
/// parent exists.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` above the root stays at the root.
                if !out.pop() && out != Path::new(std::path::MAIN_SEPARATOR_STR) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests;
