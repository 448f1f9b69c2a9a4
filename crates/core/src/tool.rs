//! Tool trait: the abstraction over clinical lookup capabilities.
//!
//! Tools take a single free-text argument (whatever followed `Action Input:`)
//! and return a structured JSON value. The registry is the whitelist: a name
//! that does not resolve here is never executed.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The result of a tool invocation, as folded into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResult {
    /// Structured output (a mapping or a sequence of mappings).
    Data(serde_json::Value),
    /// The tool failed; the message is shown to the model.
    Error(String),
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    /// Serialize for an Observation message. Errors become `{"error": "..."}`.
    pub fn to_observation(&self) -> String {
        let value = match self {
            ToolResult::Data(v) => v.clone(),
            ToolResult::Error(msg) => serde_json::json!({ "error": msg }),
        };
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

impl From<Result<serde_json::Value, ToolError>> for ToolResult {
    fn from(outcome: Result<serde_json::Value, ToolError>) -> Self {
        match outcome {
            Ok(value) => ToolResult::Data(value),
            Err(e) => ToolResult::Error(e.to_string()),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The canonical name the model must write after `Action:`.
    fn name(&self) -> &str;

    /// A description of what this tool does (rendered into the system prompt).
    fn description(&self) -> &str;

    /// What the single argument should contain (e.g. "patient name").
    fn argument_hint(&self) -> &str;

    /// Execute the tool with the given argument.
    async fn execute(&self, argument: &str) -> Result<serde_json::Value, ToolError>;
}

/// A fixed set of available tools, assembled at session start.
///
/// Ordered by name so the rendered tool list is stable across runs.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Keep only the named tools. An empty whitelist keeps everything.
    pub fn restrict<S: AsRef<str>>(mut self, whitelist: &[S]) -> Self {
        if whitelist.is_empty() {
            return self;
        }
        self.tools
            .retain(|name, _| whitelist.iter().any(|w| w.as_ref() == name));
        self
    }

    /// Look up a tool by its exact name.
    pub fn resolve(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Resolve and execute. Only an unknown name is an `Err`; execution
    /// failures come back as [`ToolResult::Error`].
    pub async fn invoke(&self, name: &str, argument: &str) -> Result<ToolResult, ToolError> {
        let tool = self
            .resolve(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        Ok(tool.execute(argument).await.into())
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate over registered tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.values().map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
