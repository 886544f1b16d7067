//! Probe budgets and limits, overridable through environment variables.

use crate::server::TransportKind;
use std::time::Duration;
use tracing::warn;

pub const ENV_STDIO_TIMEOUT: &str = "MCPSCOUT_STDIO_TIMEOUT_MS";
pub const ENV_HTTP_TIMEOUT: &str = "MCPSCOUT_HTTP_TIMEOUT_MS";
pub const ENV_SSE_TIMEOUT: &str = "MCPSCOUT_SSE_TIMEOUT_MS";
pub const ENV_SSE_TOOLS_TIMEOUT: &str = "MCPSCOUT_SSE_TOOLS_TIMEOUT_MS";
pub const ENV_TOOLS_TIMEOUT: &str = "MCPSCOUT_TOOLS_TIMEOUT_MS";
pub const ENV_MAX_LINE_LENGTH: &str = "MCPSCOUT_MAX_LINE_LENGTH";
pub const ENV_MAX_TOOL_PAYLOAD: &str = "MCPSCOUT_MAX_TOOL_PAYLOAD";
pub const ENV_MAX_CONCURRENCY: &str = "MCPSCOUT_MAX_CONCURRENCY";

/// Per-operation budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub stdio: Duration,
    pub http: Duration,
    pub sse: Duration,
    pub sse_tools: Duration,
    pub tools: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            stdio: Duration::from_millis(20_000),
            http: Duration::from_millis(6_000),
            sse: Duration::from_millis(10_000),
            sse_tools: Duration::from_millis(30_000),
            tools: Duration::from_millis(45_000),
        }
    }
}

impl Timeouts {
    /// Budget for verifying a server of `kind`.
    pub fn verify(&self, kind: TransportKind) -> Duration {
        match kind {
            TransportKind::Stdio => self.stdio,
            TransportKind::Http | TransportKind::StreamableHttp => self.http,
            TransportKind::Sse => self.sse,
        }
    }

    /// Budget for listing the tools of a server of `kind`.
    pub fn list_tools(&self, kind: TransportKind) -> Duration {
        match kind {
            TransportKind::Sse => self.sse_tools,
            _ => self.tools,
        }
    }
}

/// Everything the probes and the orchestrator can be tuned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub timeouts: Timeouts,
    /// Line cap for diagnostic text such as stderr lines.
    pub max_line_length: usize,
    /// Cap on any single JSON-RPC reply line or body.
    pub max_tool_payload: usize,
    /// Most servers verified at once.
    pub max_concurrency: usize,
    /// Most `tools/list` pages followed.
    pub max_tool_pages: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            max_line_length: 10_000,
            max_tool_payload: 1024 * 1024,
            max_concurrency: 16,
            max_tool_pages: 32,
        }
    }
}

impl ProbeSettings {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`.
    ///
    /// Values that are not positive integers are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            positive(&lookup, key)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let count = |key: &str, default: usize| {
            positive(&lookup, key)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(default)
        };

        Self {
            timeouts: Timeouts {
                stdio: millis(ENV_STDIO_TIMEOUT, defaults.timeouts.stdio),
                http: millis(ENV_HTTP_TIMEOUT, defaults.timeouts.http),
                sse: millis(ENV_SSE_TIMEOUT, defaults.timeouts.sse),
                sse_tools: millis(ENV_SSE_TOOLS_TIMEOUT, defaults.timeouts.sse_tools),
                tools: millis(ENV_TOOLS_TIMEOUT, defaults.timeouts.tools),
            },
            max_line_length: count(ENV_MAX_LINE_LENGTH, defaults.max_line_length),
            max_tool_payload: count(ENV_MAX_TOOL_PAYLOAD, defaults.max_tool_payload),
            max_concurrency: count(ENV_MAX_CONCURRENCY, defaults.max_concurrency),
            max_tool_pages: defaults.max_tool_pages,
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

fn positive<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid setting, using default");
            None
        }
        Ok(n) => Some(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = ProbeSettings::from_lookup(|_| None);
        assert_eq!(settings, ProbeSettings::default());
        assert_eq!(settings.timeouts.stdio, Duration::from_secs(20));
        assert_eq!(settings.timeouts.http, Duration::from_secs(6));
        assert_eq!(settings.max_tool_payload, 1_048_576);
        assert_eq!(settings.max_concurrency, 16);
    }

    #[test]
    fn test_overrides() {
        let settings = ProbeSettings::from_lookup(lookup(&[
            (ENV_SSE_TIMEOUT, "2500"),
            (ENV_MAX_LINE_LENGTH, " 2048 "),
            (ENV_MAX_CONCURRENCY, "4"),
        ]));
        assert_eq!(settings.timeouts.sse, Duration::from_millis(2500));
        assert_eq!(settings.max_line_length, 2048);
        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.timeouts.tools, Duration::from_secs(45));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = ProbeSettings::from_lookup(lookup(&[
            (ENV_STDIO_TIMEOUT, "soon"),
            (ENV_HTTP_TIMEOUT, "0"),
            (ENV_MAX_CONCURRENCY, "-3"),
        ]));
        assert_eq!(settings, ProbeSettings::default());
    }

    #[test]
    fn test_budgets_by_kind() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.verify(TransportKind::StreamableHttp), timeouts.http);
        assert_eq!(timeouts.verify(TransportKind::Sse), timeouts.sse);
        assert_eq!(timeouts.list_tools(TransportKind::Sse), timeouts.sse_tools);
        assert_eq!(timeouts.list_tools(TransportKind::Stdio), timeouts.tools);
        assert!(timeouts.http < timeouts.sse && timeouts.sse < timeouts.stdio);
    }
}
