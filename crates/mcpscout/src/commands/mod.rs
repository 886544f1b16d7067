//! Command handlers for the mcpscout CLI.

pub mod status;
pub mod tools;

pub use status::*;
pub use tools::*;

use clap::Args;
use mcpscout_mcp::{Discovery, JsonServerSource, ProbeSettings};
use std::path::PathBuf;
use std::sync::Arc;

/// Where to look for server definitions.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Project directory holding `.mcp.json` (defaults to the current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Additional config file with an `mcpServers` table (repeatable)
    #[arg(long = "config", value_name = "FILE")]
    pub configs: Vec<PathBuf>,
}

impl SourceArgs {
    /// The project directory.
    pub fn cwd(&self) -> anyhow::Result<PathBuf> {
        match &self.cwd {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Build the orchestrator, reading settings from the environment.
    pub fn discovery(&self) -> anyhow::Result<Discovery> {
        let source = self
            .configs
            .iter()
            .fold(JsonServerSource::new(), |source, file| source.with_file(file));
        let settings = ProbeSettings::from_env();
        tracing::debug!(?settings, "Probe settings");
        Ok(Discovery::new(Arc::new(source), settings)?)
    }
}

/// Shorten `text` to at most `max` characters, marking the cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer detail", 10), "a much ...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_cwd_override() {
        let args = SourceArgs {
            cwd: Some(PathBuf::from("/srv/project")),
            configs: Vec::new(),
        };
        assert_eq!(args.cwd().unwrap(), PathBuf::from("/srv/project"));
    }
}
