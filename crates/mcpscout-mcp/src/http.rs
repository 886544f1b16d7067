//! Verification over direct HTTP POST (`http` and `streamable-http`).
//!
//! Each JSON-RPC message is POSTed to the configured URL. The server answers
//! with either a JSON body or a short `text/event-stream` carrying the reply.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    decode_response, decode_value, initialize_request, initialized_notification,
    tools_list_request, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    METHOD_INITIALIZE, METHOD_TOOLS_LIST,
};
use crate::server::{RemoteConfig, ServerDescriptor, TransportConfig, TransportKind};
use crate::session::{HandshakePhase, HandshakeSession};
use crate::settings::ProbeSettings;
use crate::sse::EventStream;
use crate::status::{ServerStatus, ToolInfo, ToolListResult};
use crate::transport::{with_budget, TransportProbe};
use async_trait::async_trait;
use futures::StreamExt;
use mcpscout_util::TimingGuard;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace, warn};
use url::Url;

/// Session header issued by streamable HTTP servers.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Most bytes of an error body quoted in a transport error.
const ERROR_BODY_SNIPPET: usize = 200;

/// Probe for `http` and `streamable-http` servers.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    settings: ProbeSettings,
}

impl HttpProbe {
    pub fn new(client: Client, settings: ProbeSettings) -> Self {
        Self { client, settings }
    }

    /// POST `initialize` under the HTTP budget.
    pub async fn verify_server(
        &self,
        name: &str,
        kind: TransportKind,
        config: &RemoteConfig,
    ) -> McpResult<InitializeResult> {
        let _timing = TimingGuard::probe(kind.label(), name);
        let budget = self.settings.timeouts.verify(kind);
        let session = HandshakeSession::new(name, kind.label(), budget);
        let max_line = self.settings.max_tool_payload;

        with_budget(&session, async {
            let mut exchange = HttpExchange::new(&self.client, config, max_line)?;
            exchange.initialize(&session).await
        })
        .await
    }

    /// Initialize, then page through `tools/list` under the tools budget.
    pub async fn server_tools(
        &self,
        name: &str,
        kind: TransportKind,
        config: &RemoteConfig,
    ) -> McpResult<Vec<ToolInfo>> {
        let _timing = TimingGuard::tools(kind.label(), name);
        let budget = self.settings.timeouts.list_tools(kind);
        let session = HandshakeSession::new(name, kind.label(), budget);
        let max_line = self.settings.max_tool_payload;
        let max_pages = self.settings.max_tool_pages;

        with_budget(&session, async {
            let mut exchange = HttpExchange::new(&self.client, config, max_line)?;
            exchange.initialize(&session).await?;
            exchange.notify(&session, &initialized_notification()).await;

            let mut tools = Vec::new();
            let mut cursor: Option<String> = None;
            for _ in 0..max_pages {
                let id = session.next_id();
                session.enter(HandshakePhase::AwaitingTools);
                let page: ListToolsResult = exchange
                    .request(&session, &tools_list_request(id, cursor.as_deref()), id)
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
impl TransportProbe for HttpProbe {
    async fn verify(&self, descriptor: &ServerDescriptor) -> ServerStatus {
        let kind = descriptor.kind();
        let result = match remote_http_config(descriptor) {
            Ok(config) => self.verify_server(&descriptor.name, kind, config).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(init) => ServerStatus::connected(&descriptor.name, kind, init),
            Err(e) => ServerStatus::failed(&descriptor.name, kind, &e),
        }
    }

    async fn list_tools(&self, descriptor: &ServerDescriptor) -> ToolListResult {
        let kind = descriptor.kind();
        let result = match remote_http_config(descriptor) {
            Ok(config) => self.server_tools(&descriptor.name, kind, config).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(tools) => ToolListResult::ok(&descriptor.name, tools),
            Err(e) => ToolListResult::failed(&descriptor.name, &e),
        }
    }
}

fn remote_http_config(descriptor: &ServerDescriptor) -> McpResult<&RemoteConfig> {
    match &descriptor.transport {
        TransportConfig::Http(config) | TransportConfig::StreamableHttp(config) => Ok(config),
        _ => Err(McpError::config_invalid("not an http server")),
    }
}

/// One HTTP conversation with a server, carrying its session id.
struct HttpExchange<'a> {
    client: &'a Client,
    url: Url,
    headers: &'a HashMap<String, String>,
    session_id: Option<String>,
    max_line: usize,
}

impl<'a> HttpExchange<'a> {
    fn new(client: &'a Client, config: &'a RemoteConfig, max_line: usize) -> McpResult<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| McpError::config_invalid(format!("invalid url {}: {e}", config.url)))?;
        Ok(Self {
            client,
            url,
            headers: &config.headers,
            session_id: None,
            max_line,
        })
    }

    async fn initialize(&mut self, session: &HandshakeSession) -> McpResult<InitializeResult> {
        let id = session.next_id();
        session.enter(HandshakePhase::AwaitingInitialize);
        self.request(session, &initialize_request(id), id)
            .await?
            .into_result(METHOD_INITIALIZE)
    }

    async fn request(
        &mut self,
        session: &HandshakeSession,
        message: &JsonRpcRequest,
        id: u64,
    ) -> McpResult<JsonRpcResponse> {
        let response = self.post(session, message).await?;
        let response = check_status(response).await?;
        read_reply(response, id, self.max_line).await
    }

    async fn notify(&mut self, session: &HandshakeSession, message: &JsonRpcRequest) {
        match self.post(session, message).await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "Notification returned non-success status");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Notification failed"),
        }
    }

    async fn post(
        &mut self,
        session: &HandshakeSession,
        message: &JsonRpcRequest,
    ) -> McpResult<Response> {
        trace!(
            server = %session.server(),
            method = %message.method,
            id = ?message.id,
            "Sending HTTP request"
        );

        let mut request = apply_headers(self.client.post(self.url.clone()), self.headers)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .json(message);
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| McpError::from_request(e, session.phase(), session.budget()))?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(id) {
                debug!(server = %session.server(), "Server assigned MCP session");
                self.session_id = Some(id.to_string());
            }
        }
        Ok(response)
    }
}

/// Add configured headers to a request.
pub(crate) fn apply_headers(
    mut request: RequestBuilder,
    headers: &HashMap<String, String>,
) -> RequestBuilder {
    for (key, value) in headers {
        request = request.header(key, value);
    }
    request
}

/// Turn a non-2xx response into a transport error naming the status.
pub(crate) async fn check_status(response: Response) -> McpResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.trim().chars().take(ERROR_BODY_SNIPPET).collect();
    if snippet.is_empty() {
        Err(McpError::transport(format!("HTTP {status}")))
    } else {
        Err(McpError::transport(format!("HTTP {status}: {snippet}")))
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/event-stream"))
}

/// Read the reply to `id` from a POST response body.
async fn read_reply(response: Response, id: u64, max_line: usize) -> McpResult<JsonRpcResponse> {
    if is_event_stream(&response) {
        return EventStream::new(response, max_line).next_response(id).await;
    }
    let body = read_capped_body(response, max_line).await?;
    parse_json_reply(&body, id)
}

/// Like [`read_reply`], but `None` when the body carries no reply.
///
/// SSE servers usually answer a POST with `202 Accepted` and send the reply
/// on the event stream instead.
pub(crate) async fn reply_from_body(
    response: Response,
    id: u64,
    max_line: usize,
) -> McpResult<Option<JsonRpcResponse>> {
    if is_event_stream(&response) {
        let mut events = EventStream::new(response, max_line);
        while let Some(event) = events.next_event().await? {
            if event.event == "message" {
                if let Some(reply) = decode_response(&event.data, id) {
                    return Ok(Some(reply));
                }
            }
        }
        return Ok(None);
    }
    let body = read_capped_body(response, max_line).await?;
    Ok(parse_json_reply(&body, id).ok())
}

/// Collect a response body, refusing to hold more than `max_len` bytes.
async fn read_capped_body(response: Response, max_len: usize) -> McpResult<String> {
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| McpError::transport(format!("failed to read body: {e}")))?;
        if body.len() + chunk.len() > max_len {
            return Err(McpError::protocol(format!(
                "response exceeds {max_len} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Parse a JSON body (single message or batch) into the reply to `id`.
fn parse_json_reply(body: &str, id: u64) -> McpResult<JsonRpcResponse> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| McpError::protocol(format!("malformed JSON response: {e}")))?;
    let messages = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    messages
        .into_iter()
        .find_map(|message| decode_value(message, id))
        .ok_or_else(|| McpError::protocol(format!("no response to request {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe() -> HttpProbe {
        HttpProbe::new(Client::new(), ProbeSettings::default())
    }

    fn init_reply(id: u64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "remote", "version": "3.1.0"}
            }
        })
    }

    #[tokio::test]
    async fn test_verify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(init_reply(1)))
            .mount(&server)
            .await;

        let descriptor = ServerDescriptor::http("remote", format!("{}/mcp", server.uri()))
            .with_header("Authorization", "Bearer secret");
        let status = probe().verify(&descriptor).await;

        assert!(status.is_connected(), "{:?}", status.error);
        let info = status.server_info.unwrap();
        assert_eq!(info.name, "remote");
        assert_eq!(info.version.as_deref(), Some("3.1.0"));
        assert_eq!(status.transport, Some(TransportKind::Http));
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let descriptor = ServerDescriptor::streamable_http("broken", server.uri());
        let status = probe().verify(&descriptor).await;

        assert!(!status.is_connected());
        assert_eq!(
            status.error.as_deref(),
            Some("transport error: HTTP 500 Internal Server Error: Internal Server Error")
        );
        assert_eq!(status.transport, Some(TransportKind::StreamableHttp));
    }

    #[tokio::test]
    async fn test_malformed_json_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("{\"jsonrpc\": ", "application/json"),
            )
            .mount(&server)
            .await;

        let status = probe()
            .verify(&ServerDescriptor::http("garbled", server.uri()))
            .await;
        assert!(status
            .error
            .unwrap()
            .starts_with("protocol error: malformed JSON response"));
    }

    #[tokio::test]
    async fn test_json_rpc_error_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32602, "message": "unsupported protocol version"}
            })))
            .mount(&server)
            .await;

        let status = probe()
            .verify(&ServerDescriptor::http("picky", server.uri()))
            .await;
        assert_eq!(
            status.error.as_deref(),
            Some("protocol error: initialize failed (-32602): unsupported protocol version")
        );
    }

    #[tokio::test]
    async fn test_event_stream_reply() {
        let server = MockServer::start().await;
        let body = format!(
            ": keepalive\n\nevent: message\ndata: {}\n\n",
            init_reply(1)
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let status = probe()
            .verify(&ServerDescriptor::streamable_http("streamy", server.uri()))
            .await;
        assert!(status.is_connected(), "{:?}", status.error);
    }

    #[tokio::test]
    async fn test_large_initialize_reply_is_accepted() {
        let server = MockServer::start().await;
        let mut reply = init_reply(1);
        reply["result"]["instructions"] = json!("x".repeat(12_000));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let status = probe()
            .verify(&ServerDescriptor::http("verbose", server.uri()))
            .await;
        assert!(status.is_connected(), "{:?}", status.error);
    }

    #[tokio::test]
    async fn test_oversized_body_fails() {
        let server = MockServer::start().await;
        let mut reply = init_reply(1);
        reply["result"]["padding"] = json!("x".repeat(8_000));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let mut settings = ProbeSettings::default();
        settings.max_tool_payload = 4096;
        let status = HttpProbe::new(Client::new(), settings)
            .verify(&ServerDescriptor::http("huge", server.uri()))
            .await;
        assert_eq!(
            status.error.as_deref(),
            Some("protocol error: response exceeds 4096 bytes")
        );
    }

    #[tokio::test]
    async fn test_slow_reply_times_out_awaiting_initialize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(init_reply(1))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut settings = ProbeSettings::default();
        settings.timeouts.http = Duration::from_millis(200);
        let status = HttpProbe::new(Client::new(), settings)
            .verify(&ServerDescriptor::http("slow", server.uri()))
            .await;
        assert_eq!(
            status.error.as_deref(),
            Some("timed out after 200ms awaiting initialize response")
        );
    }

    #[tokio::test]
    async fn test_list_tools_with_session_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(SESSION_HEADER, "session-42")
                    .set_body_json(init_reply(1)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .and(header(SESSION_HEADER, "session-42"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list", "id": 2})))
            .and(header(SESSION_HEADER, "session-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {"tools": [
                    {
                        "name": "query",
                        "description": "Run a query",
                        "inputSchema": {"type": "object"}
                    },
                    {"name": "ping"}
                ]}
            })))
            .mount(&server)
            .await;

        let result = probe()
            .list_tools(&ServerDescriptor::streamable_http("db", server.uri()))
            .await;

        assert!(result.is_ok(), "{:?}", result.error);
        let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["query", "ping"]);
        assert_eq!(result.tools[1].input_schema, json!({}));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let status = probe()
            .verify(&ServerDescriptor::http("down", "http://127.0.0.1:1/mcp"))
            .await;
        assert!(status
            .error
            .unwrap()
            .starts_with("transport error: connection failed"));
    }

    #[test]
    fn test_parse_json_reply_batch() {
        let body = concat!(
            r#"[{"jsonrpc":"2.0","method":"notifications/progress"},"#,
            r#"{"jsonrpc":"2.0","id":5,"result":{}}]"#
        );
        assert!(parse_json_reply(body, 5).is_ok());
        let err = parse_json_reply(body, 6).unwrap_err();
        assert_eq!(err.to_string(), "protocol error: no response to request 6");
    }
}
