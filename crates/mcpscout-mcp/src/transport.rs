//! Probe trait and the dispatch table keyed by transport kind.

use crate::error::{McpError, McpResult};
use crate::http::HttpProbe;
use crate::server::{ServerDescriptor, TransportKind};
use crate::session::HandshakeSession;
use crate::settings::ProbeSettings;
use crate::sse::SseProbe;
use crate::status::{ServerStatus, ToolListResult};
use crate::stdio::StdioProbe;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Verifies servers and lists their tools over one transport.
///
/// Implementations never fail past this boundary: every error ends up in
/// the returned status or result.
#[async_trait]
pub trait TransportProbe: Send + Sync {
    /// Run the `initialize` handshake.
    async fn verify(&self, descriptor: &ServerDescriptor) -> ServerStatus;

    /// Run the handshake followed by `tools/list`.
    async fn list_tools(&self, descriptor: &ServerDescriptor) -> ToolListResult;
}

/// Transport kind to probe, built once per orchestrator.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: HashMap<TransportKind, Arc<dyn TransportProbe>>,
}

impl ProbeRegistry {
    /// A registry with no probes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The stdio, HTTP and SSE probes, sharing one HTTP client.
    pub fn with_defaults(settings: ProbeSettings) -> McpResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| McpError::transport(format!("failed to create HTTP client: {e}")))?;

        let http: Arc<dyn TransportProbe> = Arc::new(HttpProbe::new(client.clone(), settings));
        Ok(Self::empty()
            .with(TransportKind::Stdio, Arc::new(StdioProbe::new(settings)))
            .with(TransportKind::Http, http.clone())
            .with(TransportKind::StreamableHttp, http)
            .with(TransportKind::Sse, Arc::new(SseProbe::new(client, settings))))
    }

    /// Register `probe` for `kind`, replacing any previous one.
    pub fn with(mut self, kind: TransportKind, probe: Arc<dyn TransportProbe>) -> Self {
        self.probes.insert(kind, probe);
        self
    }

    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn TransportProbe>> {
        self.probes.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<TransportKind> {
        TransportKind::ALL
            .into_iter()
            .filter(|k| self.probes.contains_key(k))
            .collect()
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Run `fut` under the session budget.
///
/// On expiry the future is dropped, releasing whatever it owned, and the
/// error names the phase the handshake was stuck in.
pub(crate) async fn with_budget<T, F>(session: &HandshakeSession, fut: F) -> McpResult<T>
where
    F: Future<Output = McpResult<T>>,
{
    let result = match tokio::time::timeout(session.budget(), fut).await {
        Ok(result) => result,
        Err(_) => {
            let err = session.timed_out();
            warn!(
                server = %session.server(),
                transport = session.transport(),
                elapsed_ms = session.elapsed().as_millis() as u64,
                error = %err,
                "Server check ran out of time"
            );
            Err(err)
        }
    };
    session.finish(&result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HandshakePhase;
    use std::time::Duration;

    #[test]
    fn test_default_registry_covers_every_kind() {
        let registry = ProbeRegistry::with_defaults(ProbeSettings::default()).unwrap();
        assert_eq!(registry.kinds(), TransportKind::ALL.to_vec());
        assert!(ProbeRegistry::empty().get(TransportKind::Sse).is_none());
    }

    #[tokio::test]
    async fn test_with_budget_times_out_with_phase() {
        let session = HandshakeSession::new("slow", "stdio", Duration::from_millis(50));
        let inner = session.clone();
        let result: McpResult<()> = with_budget(&session, async move {
            inner.enter(HandshakePhase::AwaitingInitialize);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "timed out after 50ms awaiting initialize response"
        );
        assert_eq!(session.phase(), HandshakePhase::Failed);
    }

    #[tokio::test]
    async fn test_with_budget_passes_result_through() {
        let session = HandshakeSession::new("fast", "http", Duration::from_secs(1));
        let value = with_budget(&session, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(session.phase(), HandshakePhase::Verified);
    }
}
