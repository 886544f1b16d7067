//! `mcpscout tools`: list the tools of one server.

use super::{truncate, SourceArgs};
use anyhow::bail;
use mcpscout_mcp::{ResolvedServers, ServerDescriptor, ServerLookup, ToolListResult};
use std::fmt::Write;

const DESCRIPTION_WIDTH: usize = 70;

/// Handle the tools command.
pub async fn handle_tools(name: &str, source: &SourceArgs, json: bool) -> anyhow::Result<()> {
    let cwd = source.cwd()?;
    let discovery = source.discovery()?;

    let resolved = discovery.load(&cwd).await?;
    let descriptor = select_server(&resolved, name)?;

    let result = discovery.server_tools(name, &descriptor).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_tools(&result));
    }

    if let Some(error) = &result.error {
        bail!("failed to list tools for '{name}': {error}");
    }
    Ok(())
}

/// Pick the enabled server called `name`.
pub fn select_server(resolved: &ResolvedServers, name: &str) -> anyhow::Result<ServerDescriptor> {
    match resolved.lookup(name) {
        ServerLookup::Enabled(descriptor) => Ok(descriptor.clone()),
        ServerLookup::Disabled(_) => bail!("MCP server '{name}' is disabled"),
        ServerLookup::Invalid(invalid) => {
            bail!("MCP server '{name}' has an invalid config: {}", invalid.reason)
        }
        ServerLookup::Missing => {
            let known = resolved.names();
            if known.is_empty() {
                bail!("MCP server '{name}' not found (no servers configured)")
            }
            bail!("MCP server '{name}' not found (known: {})", known.join(", "))
        }
    }
}

/// Render a tool list for the terminal.
pub fn render_tools(result: &ToolListResult) -> String {
    let mut out = String::new();
    if result.error.is_some() {
        return out;
    }
    if result.tools.is_empty() {
        let _ = writeln!(out, "{} exposes no tools.", result.name);
        return out;
    }

    let _ = writeln!(out, "{} ({} tools):", result.name, result.tools.len());
    for tool in &result.tools {
        let description = tool
            .description
            .as_deref()
            .and_then(|d| d.lines().next())
            .unwrap_or("");
        let _ = writeln!(
            out,
            "  {:<28} {}",
            tool.name,
            truncate(description, DESCRIPTION_WIDTH)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpscout_mcp::{InvalidServer, ToolInfo};

    fn resolved() -> ResolvedServers {
        let mut resolved = ResolvedServers::from_descriptors([
            ServerDescriptor::stdio("fs", "npx", ["server-fs"]),
            ServerDescriptor::http("off", "http://localhost:1").disabled(),
        ]);
        resolved.invalid.push(InvalidServer::new("bad", "missing url"));
        resolved
    }

    #[test]
    fn test_select_server() {
        let resolved = resolved();
        assert_eq!(select_server(&resolved, "fs").unwrap().name, "fs");

        let err = select_server(&resolved, "off").unwrap_err();
        assert_eq!(err.to_string(), "MCP server 'off' is disabled");

        let err = select_server(&resolved, "bad").unwrap_err();
        assert_eq!(
            err.to_string(),
            "MCP server 'bad' has an invalid config: missing url"
        );

        let err = select_server(&resolved, "nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "MCP server 'nope' not found (known: fs, off, bad)"
        );
    }

    #[test]
    fn test_render_tools() {
        let result = ToolListResult::ok(
            "fs",
            vec![ToolInfo {
                name: "read_file".to_string(),
                description: Some("Read a file.\nLong explanation".to_string()),
                input_schema: serde_json::json!({"type": "object"}),
            }],
        );
        let out = render_tools(&result);
        assert!(out.starts_with("fs (1 tools):"));
        assert!(out.contains("read_file"));
        assert!(out.contains("Read a file."));
        assert!(!out.contains("Long explanation"));

        assert_eq!(
            render_tools(&ToolListResult::ok("empty", Vec::new())),
            "empty exposes no tools.\n"
        );
    }
}
