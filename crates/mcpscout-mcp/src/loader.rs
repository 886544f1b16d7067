//! Load MCP server definitions from JSON config files.
//!
//! Supported sources, later ones overriding earlier ones by server name:
//! - user `~/.claude.json` (top-level `mcpServers`)
//! - project `<cwd>/.mcp.json`
//! - any extra files passed explicitly

use crate::error::{McpError, McpResult};
use crate::server::{
    InvalidServer, RemoteConfig, ResolvedServers, ServerDescriptor, StdioConfig, TransportConfig,
    TransportKind,
};
use async_trait::async_trait;
use mcpscout_util::path::{home_join, resolve_against};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

/// Supplies the partitioned server set for a working directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerSource: Send + Sync {
    async fn resolve(&self, cwd: &Path) -> McpResult<ResolvedServers>;
}

/// Project config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".mcp.json";

/// [`ServerSource`] reading Claude-style `mcpServers` JSON files.
#[derive(Debug, Clone)]
pub struct JsonServerSource {
    user_file: Option<PathBuf>,
    include_project: bool,
    extra_files: Vec<PathBuf>,
}

impl Default for JsonServerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonServerSource {
    /// Read the user file from the home directory plus the project file.
    pub fn new() -> Self {
        Self {
            user_file: home_join(&[".claude.json"]),
            include_project: true,
            extra_files: Vec::new(),
        }
    }

    /// Override the user file; `None` skips it.
    pub fn with_user_file(mut self, path: Option<PathBuf>) -> Self {
        self.user_file = path;
        self
    }

    /// Read only explicitly added files.
    pub fn without_defaults(mut self) -> Self {
        self.user_file = None;
        self.include_project = false;
        self
    }

    /// Add a file read after the defaults. Relative paths resolve against `cwd`.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_files.push(path.into());
        self
    }

    fn files(&self, cwd: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        files.extend(self.user_file.clone());
        if self.include_project {
            files.push(cwd.join(PROJECT_CONFIG_FILE));
        }
        for extra in &self.extra_files {
            files.push(resolve_against(cwd, &extra.to_string_lossy()));
        }
        files
    }
}

#[async_trait]
impl ServerSource for JsonServerSource {
    async fn resolve(&self, cwd: &Path) -> McpResult<ResolvedServers> {
        let mut entries: BTreeMap<String, Value> = BTreeMap::new();

        for file in self.files(cwd) {
            let Some(servers) = read_servers(&file).await? else {
                continue;
            };
            debug!(path = %file.display(), count = servers.len(), "Loaded MCP servers");
            for (name, entry) in servers {
                if entries.insert(name.clone(), entry).is_some() {
                    debug!(server = %name, path = %file.display(), "Server overridden");
                }
            }
        }

        let lookup = |key: &str| std::env::var(key).ok();
        let mut resolved = ResolvedServers::default();
        for (name, entry) in entries {
            match parse_entry(&name, &entry, cwd, &lookup) {
                Ok(server) if server.enabled => resolved.enabled.push(server),
                Ok(server) => resolved.disabled.push(server),
                Err(invalid) => {
                    warn!(
                        server = %invalid.name,
                        reason = %invalid.reason,
                        "Invalid MCP server config"
                    );
                    resolved.invalid.push(invalid);
                }
            }
        }
        Ok(resolved)
    }
}

/// Read the `mcpServers` table of one file; `None` when the file is absent.
async fn read_servers(path: &Path) -> McpResult<Option<Map<String, Value>>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(None);
        }
        Err(e) => {
            return Err(McpError::config_invalid(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let value: Value = serde_json::from_str(&content).map_err(|e| {
        McpError::config_invalid(format!("failed to parse {}: {e}", path.display()))
    })?;

    match value.get("mcpServers") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(servers)) => Ok(Some(servers.clone())),
        Some(_) => Err(McpError::config_invalid(format!(
            "{}: mcpServers must be an object",
            path.display()
        ))),
    }
}

/// Validate one `mcpServers` entry.
pub fn parse_entry<F>(
    name: &str,
    entry: &Value,
    cwd: &Path,
    lookup: &F,
) -> Result<ServerDescriptor, InvalidServer>
where
    F: Fn(&str) -> Option<String>,
{
    let invalid = |reason: String| InvalidServer::new(name, reason);
    let Some(def) = entry.as_object() else {
        return Err(invalid("entry is not an object".to_string()));
    };

    let kind = match def.get("type").or_else(|| def.get("transport")) {
        None | Some(Value::Null) => TransportKind::Stdio,
        Some(Value::String(s)) => TransportKind::parse(s)
            .ok_or_else(|| invalid(format!("unknown transport type: {s}")))?,
        Some(other) => return Err(invalid(format!("unknown transport type: {other}"))),
    };
    let with_kind = |reason: String| InvalidServer::new(name, reason).with_kind(kind);

    let transport = match kind {
        TransportKind::Stdio => {
            let command = optional_string(def, "command")
                .map_err(with_kind)?
                .map(|c| expand_vars(&c, lookup))
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| with_kind("missing command".to_string()))?;
            let args = string_list(def, "args")
                .map_err(with_kind)?
                .iter()
                .map(|a| expand_vars(a, lookup))
                .collect();
            let env = string_map(def, "env")
                .map_err(with_kind)?
                .into_iter()
                .map(|(k, v)| (k, expand_vars(&v, lookup)))
                .collect();
            let cwd = optional_string(def, "cwd")
                .map_err(with_kind)?
                .map(|dir| resolve_against(cwd, &expand_vars(&dir, lookup)));
            TransportConfig::Stdio(StdioConfig {
                command,
                args,
                env,
                cwd,
            })
        }
        TransportKind::Http | TransportKind::StreamableHttp | TransportKind::Sse => {
            let url = optional_string(def, "url")
                .map_err(with_kind)?
                .map(|u| expand_vars(&u, lookup))
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| with_kind("missing url".to_string()))?;
            match Url::parse(&url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => {
                    return Err(with_kind(format!(
                        "unsupported url scheme: {}",
                        parsed.scheme()
                    )))
                }
                Err(e) => return Err(with_kind(format!("invalid url {url}: {e}"))),
            }
            let headers = string_map(def, "headers")
                .map_err(with_kind)?
                .into_iter()
                .map(|(k, v)| (k, expand_vars(&v, lookup)))
                .collect();
            let config = RemoteConfig { url, headers };
            match kind {
                TransportKind::Sse => TransportConfig::Sse(config),
                TransportKind::StreamableHttp => TransportConfig::StreamableHttp(config),
                _ => TransportConfig::Http(config),
            }
        }
    };

    let enabled = def.get("enabled").and_then(Value::as_bool).unwrap_or(true)
        && !def.get("disabled").and_then(Value::as_bool).unwrap_or(false);

    Ok(ServerDescriptor {
        name: name.to_string(),
        transport,
        enabled,
    })
}

fn optional_string(def: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match def.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("{key} must be a string")),
    }
}

fn string_list(def: &Map<String, Value>, key: &str) -> Result<Vec<String>, String> {
    match def.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("{key} must be a list of strings"))
            })
            .collect(),
        Some(_) => Err(format!("{key} must be a list of strings")),
    }
}

fn string_map(def: &Map<String, Value>, key: &str) -> Result<HashMap<String, String>, String> {
    match def.get(key) {
        None | Some(Value::Null) => Ok(HashMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                Value::Number(n) => Ok((k.clone(), n.to_string())),
                Value::Bool(b) => Ok((k.clone(), b.to_string())),
                _ => Err(format!("{key}.{k} must be a string")),
            })
            .collect(),
        Some(_) => Err(format!("{key} must be an object")),
    }
}

/// Static regex for `${VAR}` and `${VAR:-default}` references.
static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Expand `${VAR}` and `${VAR:-default}` using `lookup`.
///
/// Unset variables without a default are left as written.
pub fn expand_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return input.to_string();
    }
    var_regex()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let var = &caps[1];
            match (lookup(var), caps.get(2)) {
                (Some(value), _) => value,
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => {
                    warn!(var, "Environment variable referenced in MCP config is not set");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}
