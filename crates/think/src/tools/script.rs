//! The `run_script` tool.
//!
//! Each call constructs a fresh sandbox with the same allowance matrix as
//! the memory.js boot stage, so the agent's inline code and the compiled
//! artifact live under identical rules. There is no tool-level approval:
//! security is delegated entirely to the sandbox bridges.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Registry, ToolError, ToolHandler};
use crate::approval::Approver;
use crate::provider::{ToolDefinition, ToolInputSchema};
use crate::sandbox::{Sandbox, SandboxConfig, WriteObserverFn};
use crate::ui;

/// The per-thought paths and handles `run_script` wires into its sandbox.
#[derive(Clone)]
pub struct RunScriptContext {
    pub approver: Arc<Approver>,
    pub work_dir: PathBuf,
    pub thought_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub memories_dir: PathBuf,
    pub memory_js_path: PathBuf,
    pub args: Vec<String>,
    pub cancel: CancellationToken,
}

struct RunScript {
    ctx: RunScriptContext,
}

/// Echo writes under `memories/` to stderr: the moment a thought learns
/// something is worth showing.
fn memory_echo(memories_dir: PathBuf) -> WriteObserverFn {
    Arc::new(move |path, content| {
        if !path.starts_with(&memories_dir) {
            return;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        eprintln!(
            "\n  {} {}\n",
            ui::accent("\u{25b8}"),
            ui::dim(&format!("memorizing {name}"))
        );
        for line in content.trim().lines() {
            eprintln!("  {}", ui::dim(line));
        }
        eprintln!("\n  {}", ui::dim(&path.display().to_string()));
    })
}

#[async_trait]
impl ToolHandler for RunScript {
    async fn call(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let code = input
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Input {
                tool: "run_script".into(),
                message: "missing string field \"code\"".into(),
            })?
            .to_string();

        let ctx = self.ctx.clone();
        let config = SandboxConfig {
            allowed_paths: vec![
                ctx.work_dir.clone(),
                ctx.thought_dir.clone(),
                ctx.workspace_dir.clone(),
                ctx.memories_dir.clone(),
            ],
            writable_paths: vec![
                ctx.workspace_dir.clone(),
                ctx.memories_dir.clone(),
                ctx.memory_js_path.clone(),
            ],
            work_dir: ctx.work_dir.clone(),
            args: ctx.args.clone(),
            // No wall clock: the user can Ctrl-C, and an approval prompt
            // must not race a timer.
            timeout: None,
            approve_path: Some(ctx.approver.path_callback()),
            approve_env: Some(ctx.approver.env_callback()),
            approve_net: Some(ctx.approver.net_callback()),
            on_write: Some(memory_echo(ctx.memories_dir.clone())),
            cancel: ctx.cancel.clone(),
        };

        let result = tokio::task::spawn_blocking(move || {
            let sandbox = Sandbox::new(config)?;
            sandbox.run(&code)
        })
        .await
        .map_err(|e| ToolError::Failed(format!("sandbox task: {e}")))?;

        result.map_err(ToolError::from)
    }
}

/// Register `run_script`: sandboxed JavaScript with the boot allowance
/// matrix.
pub fn register_run_script(registry: &mut Registry, ctx: RunScriptContext) {
    registry.register(
        ToolDefinition {
            name: "run_script".into(),
            description: "Execute JavaScript code in a sandboxed runtime. Has access to the \
                          filesystem (current directory read-only; workspace and memories \
                          read-write; memory.js read-write; other paths require user approval), \
                          HTTP, environment variables, and system info. Use this for all tasks: \
                          file I/O, data processing, HTTP requests, and transformations."
                .into(),
            input_schema: ToolInputSchema::object(
                &[(
                    "code",
                    "JavaScript code to execute. The last expression value is returned as \
                     the result.",
                    "string",
                )],
                &["code"],
            ),
        },
        None,
        Box::new(RunScript { ctx }),
    );
}
