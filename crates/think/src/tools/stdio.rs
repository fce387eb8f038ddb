//! The `write_stdout` tool.

use std::io::Write;

use async_trait::async_trait;

use super::{Registry, ToolError, ToolHandler};
use crate::provider::{ToolDefinition, ToolInputSchema};

struct WriteStdout;

#[async_trait]
impl ToolHandler for WriteStdout {
    async fn call(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let content = input
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Input {
                tool: "write_stdout".into(),
                message: "missing string field \"content\"".into(),
            })?;

        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(content.as_bytes())
            .and_then(|_| stdout.flush())
            .map_err(|e| ToolError::Failed(format!("writing to stdout: {e}")))?;
        Ok("ok".to_string())
    }
}

/// Register `write_stdout`: the only way the agent can produce output
/// visible to the user or pipeable to other programs. No approval gate.
pub fn register_write_stdout(registry: &mut Registry) {
    registry.register(
        ToolDefinition {
            name: "write_stdout".into(),
            description: "Write text to the script's standard output. This is the ONLY way \
                          to produce output visible to the user or pipeable to other programs."
                .into(),
            input_schema: ToolInputSchema::object(
                &[("content", "The text to write to stdout", "string")],
                &["content"],
            ),
        },
        None,
        Box::new(WriteStdout),
    );
}
