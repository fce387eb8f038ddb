//! The tool registry.
//!
//! A registration is a (definition, optional approval gate, handler)
//! tuple. Execution is: look up, gate, run. Gates see the raw input JSON;
//! a `false` comes back to the model as `denied: <name>` in an error
//! tool_result, while interrupts and cancellations abort the whole
//! invocation.

mod script;
mod stdio;

pub use script::{RunScriptContext, register_run_script};
pub use stdio::register_write_stdout;

use async_trait::async_trait;

use crate::approval::ApprovalError;
use crate::provider::ToolDefinition;
use crate::sandbox::SandboxError;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("denied: {0}")]
    Denied(String),
    #[error("parsing {tool} input: {message}")]
    Input { tool: String, message: String },
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// True when the error must abort the agent loop instead of being
    /// reported back to the model: the user interrupted a prompt or the
    /// invocation was cancelled.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolError::Approval(ApprovalError::Interrupted)
                | ToolError::Sandbox(SandboxError::Interrupted)
                | ToolError::Sandbox(SandboxError::Cancelled)
        )
    }

    /// True when the user interrupted a prompt (exit code 130).
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            ToolError::Approval(ApprovalError::Interrupted)
                | ToolError::Sandbox(SandboxError::Interrupted)
        )
    }
}

/// Handles one tool's execution.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: serde_json::Value) -> Result<String, ToolError>;
}

/// Optional pre-execution gate over the raw input JSON.
pub type ApproveFn = Box<dyn Fn(&serde_json::Value) -> Result<bool, ApprovalError> + Send + Sync>;

struct Registration {
    definition: ToolDefinition,
    approve: Option<ApproveFn>,
    handler: Box<dyn ToolHandler>,
}

/// Named tools with schemas, gates, and handlers, in registration order.
#[derive(Default)]
pub struct Registry {
    tools: Vec<Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        definition: ToolDefinition,
        approve: Option<ApproveFn>,
        handler: Box<dyn ToolHandler>,
    ) {
        self.tools.push(Registration {
            definition,
            approve,
            handler,
        });
    }

    /// Tool definitions in registration order, for the provider.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<String, ToolError> {
        let registration = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        if let Some(approve) = &registration.approve {
            if !approve(&input)? {
                return Err(ToolError::Denied(name.to_string()));
            }
        }

        registration.handler.call(input).await
    }
}
