//! Think: a shebang interpreter for natural-language thought scripts.
//!
//! A thought is a plain-text file whose body is a prompt, optionally
//! prefixed by a YAML frontmatter block. Execution is two-stage: a cached
//! compiled artifact (`memory.js`) is tried first in an embedded JavaScript
//! sandbox; if it is absent, fails, or asks for help, an LLM-driven agent
//! loop takes over with the same sandboxed bridges and may rewrite
//! `memory.js`. Over repeated runs a thought converges to a pure sandbox
//! execution with no model call.
//!
//! Component map, leaves first:
//!
//! - [`config`] — thought identity: home layout, fingerprints, cache dirs.
//! - [`script`] — shebang/frontmatter parsing and reference resolution.
//! - [`policy`] — on-disk policy documents and deterministic matching.
//! - [`approval`] — the decision cascade, prompts, and the TTY prompt lock.
//! - [`sandbox`] — the QuickJS VM and its mediated host bridges.
//! - [`boot`] — the memory.js attempt and its outcome classification.
//! - [`tools`] — the registry plus `write_stdout` and `run_script`.
//! - [`provider`] — the chat seam and the Anthropic client.
//! - [`agent`] — the bounded multi-turn tool-calling loop.

pub mod agent;
pub mod approval;
pub mod boot;
pub mod config;
pub mod limits;
pub mod policy;
pub mod provider;
pub mod sandbox;
pub mod script;
pub mod tools;
pub mod ui;

pub use agent::{Agent, AgentError, ThoughtContext};
pub use approval::{ApprovalError, Approver, PathOp};
pub use boot::{BootConfig, BootOutcome, try_memory_js};
pub use config::{CacheMode, Home};
pub use policy::{Approval, Policy};
pub use provider::{ChatParams, ChatResponse, ContentBlock, Message, Provider};
pub use sandbox::{Sandbox, SandboxConfig, SandboxError};
pub use script::ParsedScript;
pub use tools::Registry;
