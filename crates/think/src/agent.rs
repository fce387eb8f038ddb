//! The agent loop.
//!
//! A bounded multi-turn conversation: the model sees the thought's prompt,
//! calls tools, and the loop feeds results back until the model stops
//! calling tools, says `end_turn`, or runs out of iterations. The system
//! prompt is rebuilt every turn so the memories corpus stays fresh as the
//! model edits it mid-conversation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::CacheMode;
use crate::provider::{
    ChatParams, ContentBlock, Message, Provider, ProviderError, StopReason,
};
use crate::tools::Registry;
use crate::ui;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are think, a script interpreter that executes natural language scripts.

The user's message contains the contents of a script file. Your job is to
accomplish exactly what the script describes by using the tools available to you.
You do NOT generate code for the user — you ARE the runtime. Use tools to
produce results.

Start working IMMEDIATELY. Your very first response MUST include a tool call.
Do not narrate, plan, or deliberate before acting — just do the task. All
input you need (stdin, arguments) is already in the user message.

## Your tools

- write_stdout: Write text to the script's standard output. This is the ONLY
  way to produce output visible to the user or pipeable to other programs.
  Call this for every piece of output the script should produce.

- run_script: Execute JavaScript code in a sandboxed runtime. You MUST write
  all JavaScript as a single self-contained script passed in the "code"
  parameter. Do NOT try to run files — there is no file execution, only
  inline code. All code is synchronous — do NOT use async, await, or
  Promises. The last expression value is returned as the result.

  IMPORTANT: This is NOT Node.js. There are no Node.js built-in modules
  (no "fs", "path", "http", etc). ONLY the globals listed below exist.
  However, require() IS available for loading CommonJS modules from the
  filesystem — if you need a package, download it with net.fetch and save
  it to workspace, then require() it.

  Filesystem access to the current working directory and workspace is
  unrestricted. Accessing paths outside these directories (e.g. the home
  directory, /tmp) will prompt the user for approval.

  Available globals:
    fs.readFile(path) -> string (reads entire file contents)
    fs.writeFile(path, content)
    fs.appendFile(path, content)
    fs.readDir(path) -> [{name, isDir, size}]
    fs.stat(path) -> {name, isDir, size, modTime}
      Use fs.stat or fs.readDir for file sizes — do NOT read file contents
      just to get metadata.
    fs.exists(path) -> boolean
    fs.delete(path)
    fs.mkdir(path) (recursive, like mkdir -p)
    fs.copy(src, dst)
    fs.move(src, dst)
    fs.glob(pattern) -> [string] (supports ** for recursive matching)
      Use fs.glob to find files instead of manually recursing with
      fs.readDir.
    net.fetch(url, options?) -> {status, headers, body}
      options: {method, headers, body}
    env.get(name) -> string (prompts the user for approval)
    sys.platform() -> string (e.g. "linux", "macos")
    sys.arch() -> string (e.g. "x86_64", "aarch64")
    sys.cpus() -> number
    sys.totalmem() -> number (bytes)
    sys.freemem() -> number (bytes)
    sys.uptime() -> number (seconds)
    sys.loadavg() -> [1min, 5min, 15min]
    sys.terminal() -> {columns, rows, isTTY, color}
    console.log(...args)   (writes to stderr)
    console.error(...args) (writes to stderr)
    process.cwd() -> string
    process.args -> [string]
    process.exit(code)
    process.sleep(ms) (pause execution, respects Ctrl+C)
    process.stdout.write(text) (write directly to stdout from JS)
    require(path) -> module.exports (CommonJS module loading)

## Input data

If data was piped into the script (e.g., "cat file | think transform.thought"),
it appears in the user message after "Stdin:". If command-line arguments were
passed, they appear after "Arguments:". If neither section is present, nothing
was piped and no arguments were given — do NOT try to read stdin.

## Workspace

Your workspace directory is: {workspace}

This is YOUR private storage — it persists between runs of the same script.
You MUST use this directory for ALL files you create: caches, downloads,
temp files, intermediate results, everything. NEVER write files to the
current working directory unless the script explicitly asks you to create
output files there. The working directory belongs to the user, not to you.

## memory.js

Your compiled artifact lives at: {memory_js}

On every run, memory.js is executed BEFORE you are called; you only run when
it is missing, fails, or asks for help via agent.resume(). Whenever the task
can be handled by plain JavaScript against the globals above, write or
update memory.js (with fs.writeFile inside run_script) so the NEXT run never
needs you. memory.js receives the same process.args and may call
agent.resume("why") whenever it genuinely needs you again.{memories}

## Rules

1. ONLY use write_stdout to produce output. Any text you generate outside
   of tool calls is debug info on stderr — the user won't see it as output.
2. Be literal and precise. If the script says "print hello world", call
   write_stdout with exactly "hello world\n". Don't embellish.
3. Be efficient. Accomplish the task in as few tool calls as possible.
   Combine as much work as you can into a single run_script call.
4. If something fails (a service is down, a URL errors, a resource is
   denied), do NOT give up. Try alternative approaches. If you truly
   cannot proceed, explain what you needed and ask the user if they have
   an alternative in mind. Record failures in workspace notes so future
   runs can skip broken approaches.
5. When done, stop calling tools. Do not call write_stdout with status
   messages like "Done!" unless the script asked for that.
6. If the script is ambiguous, prefer the simplest interpretation.
7. IMPORTANT: You ARE the runtime. There is no shell access and no
   Node.js built-ins. ALL your logic MUST be inline JavaScript in
   run_script calls using the listed globals."#;

const MEMORIES_TEMPLATE: &str = r#"

## Memories

Your memories directory is: {memories_dir}

Your current memories are loaded below. To update memories, use
fs.writeFile and fs.delete on files in your memories directory.

At the END of execution, update your memories:
- ADD memories that help you accomplish your task better or faster
  (working API endpoints, successful approaches, useful parameters).
- UPDATE memories when you discover better approaches.
- DELETE memories that are wrong, outdated, or slowed you down.
  Bad memories are worse than no memories — if something led you
  astray, remove it immediately.

Keep memories short and actionable. One topic per file.
{corpus}"#;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("API call failed: {0}")]
    Provider(#[from] ProviderError),
    /// The user interrupted an approval prompt; exit 130.
    #[error("interrupted")]
    Interrupted,
    #[error("execution cancelled")]
    Cancelled,
    #[error("agent loop exceeded maximum iterations ({0})")]
    IterationLimit(u32),
}

/// Static context the loop carries about the thought being run.
#[derive(Debug, Clone)]
pub struct ThoughtContext {
    pub script_name: String,
    pub workspace_dir: PathBuf,
    pub memories_dir: PathBuf,
    pub memory_js_path: PathBuf,
    pub cache_mode: CacheMode,
    /// Why the boot stage handed over (see [`crate::boot::BootOutcome`]).
    pub resume_context: String,
}

pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Registry,
    model: String,
    max_tokens: u32,
    max_iterations: u32,
    thought: ThoughtContext,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Registry,
        model: impl Into<String>,
        max_tokens: u32,
        max_iterations: u32,
        thought: ThoughtContext,
    ) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            max_tokens,
            max_iterations,
            thought,
        }
    }

    /// The initial user message: the script prompt plus optional stdin and
    /// argument blocks, plus the resume-context appendix.
    pub fn initial_prompt(&self, script_prompt: &str, stdin: &str, args: &[String]) -> String {
        let mut prompt = script_prompt.to_string();
        if !stdin.is_empty() {
            prompt.push_str("\n\nStdin:\n");
            prompt.push_str(stdin);
        }
        if !args.is_empty() {
            prompt.push_str("\n\nArguments: ");
            prompt.push_str(&args.join(" "));
        }
        prompt.push_str(&resume_appendix(&self.thought.resume_context));
        prompt
    }

    /// Run the conversation to completion.
    pub async fn run(&self, cancel: &CancellationToken, prompt: String) -> Result<(), AgentError> {
        let mut messages = vec![Message::user(vec![ContentBlock::text(prompt)])];

        for _ in 0..self.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let response = self
                .provider
                .chat(ChatParams {
                    model: self.model.clone(),
                    system: self.system_prompt(),
                    messages: messages.clone(),
                    tools: self.registry.definitions(),
                    max_tokens: self.max_tokens,
                })
                .await?;

            let mut tool_uses = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } if !text.is_empty() => {
                        eprintln!("{}", ui::dim(text));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_uses.push((id.clone(), name.clone(), input.clone()));
                    }
                    _ => {}
                }
            }

            if tool_uses.is_empty() {
                return Ok(());
            }

            messages.push(Message::assistant(response.content.clone()));

            let mut results = Vec::new();
            for (id, name, input) in tool_uses {
                eprintln!(
                    "\n{} {} {}",
                    ui::accent("\u{25cf}"),
                    self.thought.script_name,
                    ui::dim(&name)
                );
                echo_tool_input(&name, &input);

                match self.registry.execute(&name, input).await {
                    Ok(output) => {
                        results.push(ContentBlock::tool_result(id, output, false));
                    }
                    Err(err) if err.is_fatal() => {
                        return Err(if err.is_interrupted() {
                            AgentError::Interrupted
                        } else {
                            AgentError::Cancelled
                        });
                    }
                    Err(err) => {
                        eprintln!("  {} {}", ui::dim("error:"), ui::dim(&err.to_string()));
                        results.push(ContentBlock::tool_result(id, err.to_string(), true));
                    }
                }
            }

            messages.push(Message::user(results));

            // Tools already executed; an end_turn now means the model is
            // finished, pending results and all.
            if response.stop_reason == StopReason::EndTurn {
                return Ok(());
            }
        }

        Err(AgentError::IterationLimit(self.max_iterations))
    }

    /// Rebuilt every turn: the memories corpus changes as the model edits
    /// it.
    fn system_prompt(&self) -> String {
        let memories = if self.thought.cache_mode == CacheMode::Persist {
            MEMORIES_TEMPLATE
                .replace(
                    "{memories_dir}",
                    &self.thought.memories_dir.display().to_string(),
                )
                .replace("{corpus}", &load_memories(&self.thought.memories_dir))
        } else {
            String::new()
        };

        SYSTEM_PROMPT_TEMPLATE
            .replace(
                "{workspace}",
                &self.thought.workspace_dir.display().to_string(),
            )
            .replace(
                "{memory_js}",
                &self.thought.memory_js_path.display().to_string(),
            )
            .replace("{memories}", &memories)
    }
}

/// Load the memory corpus: every file under `memories/`, name-sorted, each
/// under a `### <filename>` header.
fn load_memories(memories_dir: &Path) -> String {
    let mut names: Vec<_> = match std::fs::read_dir(memories_dir) {
        Ok(entries) => entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name())
            .collect(),
        Err(_) => return "\nNo memories yet.".to_string(),
    };
    if names.is_empty() {
        return "\nNo memories yet.".to_string();
    }
    names.sort();

    let mut corpus = String::new();
    for name in names {
        let Ok(data) = std::fs::read_to_string(memories_dir.join(&name)) else {
            continue;
        };
        corpus.push_str("\n### ");
        corpus.push_str(&name.to_string_lossy());
        corpus.push('\n');
        corpus.push_str(data.trim());
        corpus.push('\n');
    }
    corpus
}

/// Shape the boot classification into instructions for the model.
fn resume_appendix(resume_context: &str) -> String {
    if resume_context.is_empty() {
        return String::new();
    }

    let body = if resume_context == "no memory.js exists, first run" {
        "This is the first run: no memory.js exists yet. After completing the \
         task, write memory.js so future runs handle this without calling you."
            .to_string()
    } else if let Some(error) = resume_context.strip_prefix("memory.js error: ") {
        format!(
            "memory.js failed with this error:\n\n{error}\n\nRead memory.js, \
             fix the problem, and write the corrected version. Then complete \
             the task."
        )
    } else {
        format!("memory.js handed control back via agent.resume() with this context:\n\n{resume_context}")
    };

    format!("\n\n## Resume Context\n\n{body}")
}

/// Dim echo of run_script code so the user can follow along on stderr.
fn echo_tool_input(name: &str, input: &serde_json::Value) {
    if name != "run_script" {
        return;
    }
    let Some(code) = input.get("code").and_then(|v| v.as_str()) else {
        return;
    };
    for line in code.lines() {
        eprintln!("  {}", ui::dim(line));
    }
}
