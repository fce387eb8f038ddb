//! The `think` binary: run a thought script.
//!
//! Data flow per invocation: parse script, derive identity, reconcile the
//! content-addressed cache, try memory.js in the sandbox, and only when
//! that can't finish the job open the agent loop. Exit codes: 0 success,
//! 1 error, 130 interrupted.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use think::agent::{Agent, AgentError, ThoughtContext};
use think::approval::Approver;
use think::boot::{BootConfig, BootOutcome, try_memory_js};
use think::config::{self, CacheMode, Home};
use think::provider::{AnthropicProvider, Provider};
use think::script;
use think::tools::{Registry, RunScriptContext, register_run_script, register_write_stdout};
use think::ui;

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "think",
    about = "A shebang interpreter for natural language scripts",
    long_about = "think runs natural language thought scripts by first executing the \
                  thought's cached memory.js in a sandbox, and only when that cannot \
                  finish the job sending the script to an LLM that uses tools to \
                  accomplish the described task."
)]
struct Cli {
    /// Script path, HTTP(S) URL, or installed thought name.
    script: String,
    /// Arguments passed through to the thought.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", ui::dim(&format!("think: {e:#}")));
            ExitCode::FAILURE
        }
    }
}

/// Removes the cache directory on drop for ephemeral/off cache modes.
struct CacheCleanup {
    dir: PathBuf,
    enabled: bool,
}

impl Drop for CacheCleanup {
    fn drop(&mut self) {
        if self.enabled {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<u8> {
    let home = Home::resolve();
    home.ensure().context("setting up home directory")?;

    let script_ref = script::resolve_ref(&home, &cli.script)?;
    let parsed = script::parse(&script_ref).await?;
    let resolved = config::resolve(&home, parsed.config.as_ref());
    let cache_mode = CacheMode::from_env();

    // Cache reconciliation. A fingerprint mismatch is not an error; it
    // means the script or the binary changed, and remembered state keyed
    // on the old identity must go.
    let cache_dir = home.cache_dir(&parsed.fingerprint);
    if cache_mode == CacheMode::Off {
        let _ = std::fs::remove_dir_all(&cache_dir);
    }
    if config::check_fingerprint(&cache_dir, &parsed.fingerprint) {
        tracing::debug!(cache_dir = %cache_dir.display(), "cache fingerprint matches");
    } else {
        let _ = std::fs::remove_dir_all(&cache_dir);
        std::fs::create_dir_all(&cache_dir).context("creating cache dir")?;
        config::write_fingerprint(&cache_dir, &parsed.fingerprint)
            .context("writing fingerprint")?;
    }
    let _cache_cleanup = CacheCleanup {
        dir: cache_dir,
        enabled: cache_mode != CacheMode::Persist,
    };

    // Piped input is read up front and becomes part of the prompt.
    let mut stdin_data = String::new();
    if !std::io::stdin().is_terminal() {
        std::io::stdin()
            .read_to_string(&mut stdin_data)
            .context("reading stdin")?;
    }

    // Sandbox geography. The thought dir (and only it) is keyed by name so
    // memories survive script edits; note the cache-off mode above never
    // touches it.
    let work_dir = std::env::current_dir().context("resolving working directory")?;
    let thought_dir = home.thought_dir(&parsed.reference);
    let workspace_dir = home.workspace_dir(&parsed.reference);
    let memories_dir = home.memories_dir(&parsed.reference);
    let memory_js_path = home.memory_js_path(&parsed.reference);
    std::fs::create_dir_all(&workspace_dir).context("creating workspace")?;
    std::fs::create_dir_all(&memories_dir).context("creating memories dir")?;

    let approver = Arc::new(
        Approver::new(&thought_dir, Some(&home.global_policy_path()))?
            .with_locks_dir(home.locks_dir()),
    );
    approver.bootstrap_defaults(&workspace_dir, &memories_dir, &work_dir)?;

    let script_name = config::thought_name(&parsed.reference);

    // Stage one: the compiled artifact.
    let resume_context = if memory_js_path.exists() {
        eprintln!(
            "{} {} {}",
            ui::accent("\u{25cf}"),
            script_name,
            ui::dim("memory.js")
        );
        let boot_cfg = BootConfig {
            memory_js_path: memory_js_path.clone(),
            work_dir: work_dir.clone(),
            thought_dir: thought_dir.clone(),
            workspace_dir: workspace_dir.clone(),
            memories_dir: memories_dir.clone(),
            args: cli.args.clone(),
            approve_path: Some(approver.path_callback()),
            approve_env: Some(approver.env_callback()),
            approve_net: Some(approver.net_callback()),
            cancel: cancel.clone(),
        };
        let outcome = tokio::task::spawn_blocking(move || try_memory_js(boot_cfg))
            .await
            .context("boot task")?;
        match outcome {
            BootOutcome::Completed(output) => {
                if !output.is_empty() {
                    print!("{output}");
                }
                return Ok(0);
            }
            BootOutcome::Interrupted => return Ok(EXIT_INTERRUPTED),
            BootOutcome::Resume(context) => context,
        }
    } else {
        "no memory.js exists, first run".to_string()
    };

    // Stage two: the agent loop.
    let mut registry = Registry::new();
    register_write_stdout(&mut registry);
    register_run_script(
        &mut registry,
        RunScriptContext {
            approver: Arc::clone(&approver),
            work_dir,
            thought_dir,
            workspace_dir: workspace_dir.clone(),
            memories_dir: memories_dir.clone(),
            memory_js_path: memory_js_path.clone(),
            args: cli.args.clone(),
            cancel: cancel.clone(),
        },
    );

    let provider = create_provider(&resolved)?;

    let agent = Agent::new(
        provider,
        registry,
        resolved.model,
        resolved.max_tokens,
        resolved.max_iterations,
        ThoughtContext {
            script_name,
            workspace_dir,
            memories_dir,
            memory_js_path,
            cache_mode,
            resume_context,
        },
    );

    let prompt = agent.initial_prompt(&parsed.prompt, &stdin_data, &cli.args);
    match agent.run(&cancel, prompt).await {
        Ok(()) => Ok(0),
        Err(AgentError::Interrupted) | Err(AgentError::Cancelled) => Ok(EXIT_INTERRUPTED),
        Err(e) => Err(e.into()),
    }
}

fn create_provider(cfg: &config::ResolvedConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match cfg.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            cfg.api_key.clone(),
            cfg.api_base.clone(),
        ))),
        other => anyhow::bail!("unsupported provider: {other}"),
    }
}
