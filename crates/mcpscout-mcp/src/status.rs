//! Normalized verification and tool-listing results.

use crate::error::McpError;
use crate::protocol::{InitializeResult, McpTool, ServerInfo};
use crate::server::TransportKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text used for servers switched off in config.
pub const DISABLED_REASON: &str = "disabled";

/// Outcome of verifying one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        }
    }
}

/// Normalized status of one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub name: String,
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Capabilities object from the `initialize` reply, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
}

impl ServerStatus {
    pub fn connected(name: impl Into<String>, kind: TransportKind, init: InitializeResult) -> Self {
        Self {
            name: name.into(),
            status: ConnectionStatus::Connected,
            server_info: init.server_info,
            error: None,
            capabilities: init.capabilities,
            transport: Some(kind),
        }
    }

    pub fn failed(name: impl Into<String>, kind: TransportKind, error: &McpError) -> Self {
        Self::failed_with(name, Some(kind), error.to_string())
    }

    /// Placeholder for a server that is switched off; never probed.
    pub fn disabled(name: impl Into<String>, kind: TransportKind) -> Self {
        Self::failed_with(name, Some(kind), DISABLED_REASON.to_string())
    }

    /// Placeholder for an entry that failed validation; never probed.
    pub fn invalid(
        name: impl Into<String>,
        kind: Option<TransportKind>,
        reason: impl Into<String>,
    ) -> Self {
        let error = McpError::config_invalid(reason).to_string();
        Self::failed_with(name, kind, error)
    }

    fn failed_with(name: impl Into<String>, kind: Option<TransportKind>, error: String) -> Self {
        Self {
            name: name.into(),
            status: ConnectionStatus::Failed,
            server_info: None,
            error: Some(error),
            capabilities: None,
            transport: kind,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// One tool as reported to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema; an empty object when the server sent none.
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    Value::Object(Default::default())
}

impl From<McpTool> for ToolInfo {
    fn from(tool: McpTool) -> Self {
        Self {
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema.unwrap_or_else(empty_schema),
        }
    }
}

/// Tools of one server, or the reason they could not be listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListResult {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolListResult {
    pub fn ok(name: impl Into<String>, tools: Vec<ToolInfo>) -> Self {
        Self {
            name: name.into(),
            tools,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: &McpError) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Ordered statuses for every configured server.
///
/// Enabled servers come first in descriptor order, then disabled, then
/// invalid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateReport(Vec<ServerStatus>);

impl AggregateReport {
    pub fn new(statuses: Vec<ServerStatus>) -> Self {
        Self(statuses)
    }

    pub fn statuses(&self) -> &[ServerStatus] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<ServerStatus> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServerStatus> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ServerStatus> {
        self.0.iter().find(|s| s.name == name)
    }

    pub fn connected_count(&self) -> usize {
        self.0.iter().filter(|s| s.is_connected()).count()
    }
}

impl<'a> IntoIterator for &'a AggregateReport {
    type Item = &'a ServerStatus;
    type IntoIter = std::slice::Iter<'a, ServerStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
