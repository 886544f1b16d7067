//! SSE (Server-Sent Events) transport for remote MCP servers.
//!
//! The legacy MCP SSE transport uses:
//! - a long-lived GET stream for server→client messages, whose first
//!   `endpoint` event names the URL to POST requests to
//! - HTTP POST to that endpoint for client→server messages
//!
//! Replies arrive either in the POST body or as `message` events on the
//! stream.

use crate::error::{McpError, McpResult};
use crate::framing::{SseEvent, SseFrameParser};
use crate::http::{apply_headers, check_status, reply_from_body};
use crate::protocol::{
    decode_response, initialize_request, initialized_notification, tools_list_request,
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, METHOD_INITIALIZE,
    METHOD_TOOLS_LIST,
};
use crate::server::{RemoteConfig, ServerDescriptor, TransportConfig, TransportKind};
use crate::session::{HandshakePhase, HandshakeSession};
use crate::settings::ProbeSettings;
use crate::status::{ServerStatus, ToolInfo, ToolListResult};
use crate::transport::{with_budget, TransportProbe};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use mcpscout_util::TimingGuard;
use reqwest::Client;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};
use url::Url;

/// Incoming `text/event-stream` body, decoded into events.
pub(crate) struct EventStream {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    parser: SseFrameParser,
    max_line: usize,
    queued: VecDeque<SseEvent>,
    done: bool,
}

impl EventStream {
    pub(crate) fn new(response: reqwest::Response, max_line: usize) -> Self {
        Self {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            parser: SseFrameParser::new(max_line),
            max_line,
            queued: VecDeque::new(),
            done: false,
        }
    }

    /// Next complete event, or `None` once the stream has closed.
    pub(crate) async fn next_event(&mut self) -> McpResult<Option<SseEvent>> {
        self.pull(None).await
    }

    /// Like [`EventStream::next_event`], but fails once more than `dropped`
    /// lines have been discarded for exceeding the cap.
    async fn pull(&mut self, dropped: Option<usize>) -> McpResult<Option<SseEvent>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }
            if dropped.is_some_and(|before| self.parser.dropped() > before) {
                return Err(McpError::protocol(format!(
                    "response exceeds {} bytes",
                    self.max_line
                )));
            }
            if self.done {
                return Ok(None);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.queued.extend(self.parser.push(&chunk)),
                Some(Err(e)) => {
                    return Err(McpError::transport(format!("event stream failed: {e}")));
                }
                None => {
                    self.done = true;
                    self.queued.extend(self.parser.finish());
                }
            }
        }
    }

    /// Wait for the `message` event answering request `id`.
    pub(crate) async fn next_response(&mut self, id: u64) -> McpResult<JsonRpcResponse> {
        let dropped = Some(self.parser.dropped());
        while let Some(event) = self.pull(dropped).await? {
            if event.event != "message" {
                trace!(event = %event.event, "Skipping SSE event");
                continue;
            }
            if let Some(response) = decode_response(&event.data, id) {
                return Ok(response);
            }
        }
        Err(McpError::transport("event stream closed before response"))
    }
}

/// Probe for `sse` servers.
#[derive(Debug, Clone)]
pub struct SseProbe {
    client: Client,
    settings: ProbeSettings,
}

impl SseProbe {
    pub fn new(client: Client, settings: ProbeSettings) -> Self {
        Self { client, settings }
    }

    /// Open the stream, discover the endpoint and run `initialize`.
    pub async fn verify_server(
        &self,
        name: &str,
        config: &RemoteConfig,
    ) -> McpResult<InitializeResult> {
        let _timing = TimingGuard::probe("sse", name);
        let budget = self.settings.timeouts.verify(TransportKind::Sse);
        let session = HandshakeSession::new(name, "sse", budget);
        let max_line = self.settings.max_tool_payload;

        with_budget(&session, async {
            let mut connection =
                SseConnection::open(&self.client, config, &session, max_line).await?;
            connection.initialize().await
        })
        .await
    }

    /// Handshake, then page through `tools/list` under the SSE tools budget.
    pub async fn server_tools(
        &self,
        name: &str,
        config: &RemoteConfig,
    ) -> McpResult<Vec<ToolInfo>> {
        let _timing = TimingGuard::tools("sse", name);
        let budget = self.settings.timeouts.list_tools(TransportKind::Sse);
        let session = HandshakeSession::new(name, "sse", budget);
        let max_line = self.settings.max_tool_payload;
        let max_pages = self.settings.max_tool_pages;

        with_budget(&session, async {
            let mut connection =
                SseConnection::open(&self.client, config, &session, max_line).await?;
            connection.initialize().await?;
            connection.notify(&initialized_notification()).await;

            let mut tools = Vec::new();
            let mut cursor: Option<String> = None;
            for _ in 0..max_pages {
                let id = session.next_id();
                session.enter(HandshakePhase::AwaitingTools);
                let page: ListToolsResult = connection
                    .request(&tools_list_request(id, cursor.as_deref()), id)
                    .await?
                    .into_result(METHOD_TOOLS_LIST)?;
                tools.extend(page.tools.into_iter().map(ToolInfo::from));
                match page.next_cursor {
                    Some(next) if !next.is_empty() => cursor = Some(next),
                    _ => return Ok(tools),
                }
            }
            warn!(server = %name, max_pages, "Stopped following tools/list cursor");
            Ok(tools)
        })
        .await
    }
}

#[async_trait]
impl TransportProbe for SseProbe {
    async fn verify(&self, descriptor: &ServerDescriptor) -> ServerStatus {
        let result = match &descriptor.transport {
            TransportConfig::Sse(config) => {
                self.verify_server(&descriptor.name, config).await
            }
            _ => Err(McpError::config_invalid("not an sse server")),
        };
        match result {
            Ok(init) => ServerStatus::connected(&descriptor.name, TransportKind::Sse, init),
            Err(e) => ServerStatus::failed(&descriptor.name, TransportKind::Sse, &e),
        }
    }

    async fn list_tools(&self, descriptor: &ServerDescriptor) -> ToolListResult {
        let result = match &descriptor.transport {
            TransportConfig::Sse(config) => {
                self.server_tools(&descriptor.name, config).await
            }
            _ => Err(McpError::config_invalid("not an sse server")),
        };
        match result {
            Ok(tools) => ToolListResult::ok(&descriptor.name, tools),
            Err(e) => ToolListResult::failed(&descriptor.name, &e),
        }
    }
}

/// An open event stream plus the endpoint it advertised.
///
/// Dropping it closes the GET connection.
struct SseConnection<'a> {
    client: &'a Client,
    config: &'a RemoteConfig,
    session: HandshakeSession,
    endpoint: Url,
    events: EventStream,
    max_line: usize,
}

impl<'a> SseConnection<'a> {
    async fn open(
        client: &'a Client,
        config: &'a RemoteConfig,
        session: &HandshakeSession,
        max_line: usize,
    ) -> McpResult<Self> {
        let stream_url = Url::parse(&config.url)
            .map_err(|e| McpError::config_invalid(format!("invalid url {}: {e}", config.url)))?;

        session.enter(HandshakePhase::Connecting);
        debug!(server = %session.server(), url = %stream_url, "Opening SSE stream");
        let response = apply_headers(client.get(stream_url.clone()), &config.headers)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::from_request(e, session.phase(), session.budget()))?;
        let response = check_status(response).await?;

        session.enter(HandshakePhase::AwaitingEndpoint);
        let mut events = EventStream::new(response, max_line);
        let endpoint = loop {
            match events.next_event().await? {
                Some(event) if event.event == "endpoint" => break event.data,
                Some(event) => trace!(event = %event.event, "Skipping event before endpoint"),
                None => {
                    return Err(McpError::transport(
                        "event stream closed before endpoint event",
                    ))
                }
            }
        };

        let endpoint = resolve_endpoint(&stream_url, &endpoint)?;
        debug!(server = %session.server(), endpoint = %endpoint, "Discovered SSE endpoint");

        Ok(Self {
            client,
            config,
            session: session.clone(),
            endpoint,
            events,
            max_line,
        })
    }

    async fn initialize(&mut self) -> McpResult<InitializeResult> {
        let id = self.session.next_id();
        self.session.enter(HandshakePhase::AwaitingInitialize);
        self.request(&initialize_request(id), id)
            .await?
            .into_result(METHOD_INITIALIZE)
    }

    /// POST `message` and return its reply from the body or the stream.
    async fn request(&mut self, message: &JsonRpcRequest, id: u64) -> McpResult<JsonRpcResponse> {
        let response = self.post(message).await?;
        let response = check_status(response).await?;

        if let Some(reply) = reply_from_body(response, id, self.max_line).await? {
            return Ok(reply);
        }
        self.events.next_response(id).await
    }

    async fn notify(&mut self, message: &JsonRpcRequest) {
        match self.post(message).await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "Notification returned non-success status");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Notification failed"),
        }
    }

    async fn post(&mut self, message: &JsonRpcRequest) -> McpResult<reqwest::Response> {
        trace!(method = %message.method, id = ?message.id, "Posting to SSE endpoint");
        let session = &self.session;
        apply_headers(self.client.post(self.endpoint.clone()), &self.config.headers)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::from_request(e, session.phase(), session.budget()))
    }
}

/// Resolve endpoint event data against the stream URL.
///
/// Absolute URLs are used as-is; paths are joined onto the stream origin.
pub fn resolve_endpoint(stream_url: &Url, endpoint: &str) -> McpResult<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(McpError::protocol("empty endpoint event"));
    }
    stream_url
        .join(endpoint)
        .map_err(|e| McpError::protocol(format!("invalid endpoint {endpoint:?}: {e}")))
}
