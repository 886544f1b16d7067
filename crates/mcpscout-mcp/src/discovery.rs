//! Concurrent verification of every configured server.

use crate::error::{McpError, McpResult};
use crate::loader::ServerSource;
use crate::server::{ResolvedServers, ServerDescriptor, TransportKind};
use crate::settings::ProbeSettings;
use crate::status::{AggregateReport, ServerStatus, ToolListResult};
use crate::transport::{ProbeRegistry, TransportProbe};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Fans verification out over the configured servers.
///
/// Holds no state between calls; every call re-verifies.
pub struct Discovery {
    source: Arc<dyn ServerSource>,
    registry: ProbeRegistry,
    settings: ProbeSettings,
}

impl Discovery {
    /// Create an orchestrator with the default stdio, HTTP and SSE probes.
    pub fn new(source: Arc<dyn ServerSource>, settings: ProbeSettings) -> McpResult<Self> {
        let registry = ProbeRegistry::with_defaults(settings)?;
        Ok(Self::with_registry(source, registry, settings))
    }

    /// Create an orchestrator with an explicit probe table.
    pub fn with_registry(
        source: Arc<dyn ServerSource>,
        registry: ProbeRegistry,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            source,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Load the server set for `cwd`.
    pub async fn load(&self, cwd: &Path) -> McpResult<ResolvedServers> {
        self.source.resolve(cwd).await
    }

    /// Load and verify every server configured for `cwd`.
    ///
    /// A failing load yields an empty report.
    pub async fn servers_status(&self, cwd: &Path) -> AggregateReport {
        match self.load(cwd).await {
            Ok(resolved) => self.verify_servers(&resolved).await,
            Err(e) => {
                warn!(cwd = %cwd.display(), error = %e, "Failed to load MCP server config");
                AggregateReport::default()
            }
        }
    }

    /// Verify an already loaded server set.
    ///
    /// Enabled servers are verified concurrently, up to the configured
    /// ceiling, and reported in descriptor order. Disabled and invalid
    /// entries get placeholders without any I/O.
    pub async fn verify_servers(&self, resolved: &ResolvedServers) -> AggregateReport {
        let limit = self.settings.max_concurrency.max(1);
        info!(
            enabled = resolved.enabled.len(),
            disabled = resolved.disabled.len(),
            invalid = resolved.invalid.len(),
            limit,
            "Verifying MCP servers"
        );

        let mut statuses: Vec<ServerStatus> = stream::iter(resolved.enabled.iter().cloned())
            .map(|descriptor| self.verify_one(descriptor))
            .buffered(limit)
            .collect()
            .await;

        statuses.extend(
            resolved
                .disabled
                .iter()
                .map(|d| ServerStatus::disabled(&d.name, d.kind())),
        );
        statuses.extend(
            resolved
                .invalid
                .iter()
                .map(|i| ServerStatus::invalid(&i.name, i.kind, &i.reason)),
        );

        let report = AggregateReport::new(statuses);
        debug!(
            total = report.len(),
            connected = report.connected_count(),
            "Verification finished"
        );
        report
    }

    /// List the tools of one server, without verifying it first.
    pub async fn server_tools(&self, name: &str, descriptor: &ServerDescriptor) -> ToolListResult {
        let kind = descriptor.kind();
        let Some(probe) = self.registry.get(kind) else {
            return ToolListResult::failed(name, &missing_probe(kind));
        };

        let descriptor = descriptor.clone();
        let task = tokio::spawn(async move { probe.list_tools(&descriptor).await });
        let mut result = match task.await {
            Ok(result) => result,
            Err(e) => ToolListResult::failed(name, &task_failure(name, e)),
        };
        result.name = name.to_string();
        result
    }

    /// Verify one server in its own task.
    ///
    /// The returned future owns everything it needs, so a panic inside the
    /// probe stays inside that server's status.
    fn verify_one(&self, descriptor: ServerDescriptor) -> impl Future<Output = ServerStatus> {
        let probe = self.registry.get(descriptor.kind());
        async move {
            let name = descriptor.name.clone();
            let kind = descriptor.kind();
            let Some(probe) = probe else {
                return ServerStatus::failed(&name, kind, &missing_probe(kind));
            };
            let task = tokio::spawn(run_verify(probe, descriptor));
            match task.await {
                Ok(status) => status,
                Err(e) => ServerStatus::failed(&name, kind, &task_failure(&name, e)),
            }
        }
    }
}

async fn run_verify(probe: Arc<dyn TransportProbe>, descriptor: ServerDescriptor) -> ServerStatus {
    probe.verify(&descriptor).await
}

fn missing_probe(kind: TransportKind) -> McpError {
    McpError::config_invalid(format!("unsupported transport: {kind}"))
}

fn task_failure(name: &str, err: JoinError) -> McpError {
    if err.is_panic() {
        warn!(server = %name, "Probe panicked");
        McpError::transport("probe panicked")
    } else {
        McpError::transport("probe cancelled")
    }
}
