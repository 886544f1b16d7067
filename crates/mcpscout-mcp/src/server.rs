//! MCP server descriptors as produced by a config loader.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// How a server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Stdio,
    Http,
    StreamableHttp,
    Sse,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [
        TransportKind::Stdio,
        TransportKind::Http,
        TransportKind::StreamableHttp,
        TransportKind::Sse,
    ];

    /// Parse a config `type` value. Matching is case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Some(Self::Stdio),
            "http" => Some(Self::Http),
            "streamable-http" | "streamable_http" | "streamablehttp" => Some(Self::StreamableHttp),
            "sse" => Some(Self::Sse),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::StreamableHttp => "streamable-http",
            Self::Sse => "sse",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Launch parameters for a stdio server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Variables set on top of the filtered host environment.
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// Endpoint parameters for an HTTP or SSE server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// Transport parameters, one variant per [`TransportKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Stdio(StdioConfig),
    Http(RemoteConfig),
    StreamableHttp(RemoteConfig),
    Sse(RemoteConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Http(_) => TransportKind::Http,
            Self::StreamableHttp(_) => TransportKind::StreamableHttp,
            Self::Sse(_) => TransportKind::Sse,
        }
    }

    pub fn as_stdio(&self) -> Option<&StdioConfig> {
        match self {
            Self::Stdio(config) => Some(config),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteConfig> {
        match self {
            Self::Stdio(_) => None,
            Self::Http(config) | Self::StreamableHttp(config) | Self::Sse(config) => Some(config),
        }
    }
}

/// One configured MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    /// Server name (unique within one load).
    pub name: String,
    pub transport: TransportConfig,
    pub enabled: bool,
}

impl ServerDescriptor {
    /// Create a stdio server descriptor.
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Stdio(StdioConfig {
                command: command.into(),
                args: args.into_iter().map(Into::into).collect(),
                env: HashMap::new(),
                cwd: None,
            }),
            enabled: true,
        }
    }

    /// Create a plain HTTP server descriptor.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::remote(name, TransportKind::Http, url)
    }

    /// Create a streamable HTTP server descriptor.
    pub fn streamable_http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::remote(name, TransportKind::StreamableHttp, url)
    }

    /// Create an SSE server descriptor.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::remote(name, TransportKind::Sse, url)
    }

    /// Create a remote descriptor of the given kind.
    ///
    /// `Stdio` is treated as plain HTTP since it has no URL form.
    pub fn remote(name: impl Into<String>, kind: TransportKind, url: impl Into<String>) -> Self {
        let config = RemoteConfig {
            url: url.into(),
            headers: HashMap::new(),
        };
        let transport = match kind {
            TransportKind::StreamableHttp => TransportConfig::StreamableHttp(config),
            TransportKind::Sse => TransportConfig::Sse(config),
            TransportKind::Http | TransportKind::Stdio => TransportConfig::Http(config),
        };
        Self {
            name: name.into(),
            transport,
            enabled: true,
        }
    }

    /// Add a header (remote transports only).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self.transport {
            TransportConfig::Http(config)
            | TransportConfig::StreamableHttp(config)
            | TransportConfig::Sse(config) => {
                config.headers.insert(key.into(), value.into());
            }
            TransportConfig::Stdio(_) => {}
        }
        self
    }

    /// Add an environment variable (stdio only).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::Stdio(config) = &mut self.transport {
            config.env.insert(key.into(), value.into());
        }
        self
    }

    /// Set the working directory (stdio only).
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        if let TransportConfig::Stdio(config) = &mut self.transport {
            config.cwd = Some(cwd.into());
        }
        self
    }

    /// Disable the server.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

/// A config entry that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidServer {
    pub name: String,
    /// Transport kind, when it could be determined.
    pub kind: Option<TransportKind>,
    pub reason: String,
}

impl InvalidServer {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            reason: reason.into(),
        }
    }

    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Descriptors partitioned by the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedServers {
    pub enabled: Vec<ServerDescriptor>,
    pub disabled: Vec<ServerDescriptor>,
    pub invalid: Vec<InvalidServer>,
}

/// Where a name was found in a [`ResolvedServers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLookup<'a> {
    Enabled(&'a ServerDescriptor),
    Disabled(&'a ServerDescriptor),
    Invalid(&'a InvalidServer),
    Missing,
}

impl ResolvedServers {
    /// Partition descriptors by their `enabled` flag, keeping order.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ServerDescriptor>) -> Self {
        let (enabled, disabled): (Vec<_>, Vec<_>) =
            descriptors.into_iter().partition(|d| d.enabled);
        Self {
            enabled,
            disabled,
            invalid: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.enabled.len() + self.disabled.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, name: &str) -> ServerLookup<'_> {
        if let Some(d) = self.enabled.iter().find(|d| d.name == name) {
            return ServerLookup::Enabled(d);
        }
        if let Some(d) = self.disabled.iter().find(|d| d.name == name) {
            return ServerLookup::Disabled(d);
        }
        if let Some(i) = self.invalid.iter().find(|i| i.name == name) {
            return ServerLookup::Invalid(i);
        }
        ServerLookup::Missing
    }

    /// Every configured name, in report order.
    pub fn names(&self) -> Vec<&str> {
        self.enabled
            .iter()
            .chain(&self.disabled)
            .map(|d| d.name.as_str())
            .chain(self.invalid.iter().map(|i| i.name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!(TransportKind::parse("stdio"), Some(TransportKind::Stdio));
        assert_eq!(TransportKind::parse("SSE"), Some(TransportKind::Sse));
        assert_eq!(
            TransportKind::parse("streamable-http"),
            Some(TransportKind::StreamableHttp)
        );
        assert_eq!(TransportKind::parse("websocket"), None);
        for kind in TransportKind::ALL {
            assert_eq!(TransportKind::parse(kind.label()), Some(kind));
        }
    }

    #[test]
    fn test_transport_kind_serde() {
        let json = serde_json::to_string(&TransportKind::StreamableHttp).unwrap();
        assert_eq!(json, "\"streamable-http\"");
    }

    #[test]
    fn test_stdio_builder() {
        let server = ServerDescriptor::stdio("fs", "npx", ["-y", "server-fs"])
            .with_env("ROOT", "/tmp")
            .with_cwd("/work")
            .with_header("ignored", "x");
        let config = server.transport.as_stdio().unwrap();
        assert_eq!(config.command, "npx");
        assert_eq!(config.args, vec!["-y", "server-fs"]);
        assert_eq!(config.env.get("ROOT"), Some(&"/tmp".to_string()));
        assert_eq!(config.cwd, Some(PathBuf::from("/work")));
        assert!(server.transport.as_remote().is_none());
    }

    #[test]
    fn test_remote_builder() {
        let server = ServerDescriptor::sse("remote", "https://example.com/sse")
            .with_header("Authorization", "Bearer token")
            .disabled();
        assert_eq!(server.kind(), TransportKind::Sse);
        assert!(!server.enabled);
        let config = server.transport.as_remote().unwrap();
        assert_eq!(config.url, "https://example.com/sse");
        assert_eq!(
            config.headers.get("Authorization"),
            Some(&"Bearer token".to_string())
        );
    }

    #[test]
    fn test_resolved_lookup() {
        let mut resolved = ResolvedServers::from_descriptors([
            ServerDescriptor::http("a", "http://localhost:1"),
            ServerDescriptor::http("b", "http://localhost:2").disabled(),
        ]);
        resolved
            .invalid
            .push(InvalidServer::new("c", "missing url"));

        assert_eq!(resolved.len(), 3);
        assert!(matches!(resolved.lookup("a"), ServerLookup::Enabled(_)));
        assert!(matches!(resolved.lookup("b"), ServerLookup::Disabled(_)));
        assert!(matches!(resolved.lookup("c"), ServerLookup::Invalid(_)));
        assert_eq!(resolved.lookup("d"), ServerLookup::Missing);
        assert_eq!(resolved.names(), vec!["a", "b", "c"]);
    }
}
