//! Verification over a spawned process speaking line-delimited JSON-RPC.

use crate::error::{McpError, McpResult};
use crate::framing::{read_bounded_line, strip_ansi, BoundedLine};
use crate::protocol::{
    decode_response, encode_line, initialize_request, initialized_notification,
    tools_list_request, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    METHOD_INITIALIZE, METHOD_TOOLS_LIST,
};
use crate::security::{build_safe_environment, validate_command, Platform};
use crate::server::{ServerDescriptor, StdioConfig, TransportKind};
use crate::session::{HandshakePhase, HandshakeSession};
use crate::settings::ProbeSettings;
use crate::status::{ServerStatus, ToolInfo, ToolListResult};
use crate::transport::{with_budget, TransportProbe};
use async_trait::async_trait;
use mcpscout_util::TimingGuard;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 5;
/// How long to wait for an exit status after stdout closes.
const EXIT_GRACE: Duration = Duration::from_millis(200);

/// Probe for `stdio` servers.
#[derive(Debug, Clone)]
pub struct StdioProbe {
    settings: ProbeSettings,
}

impl StdioProbe {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    /// Spawn the server and run `initialize` under the stdio budget.
    pub async fn verify_server(
        &self,
        name: &str,
        config: &StdioConfig,
    ) -> McpResult<InitializeResult> {
        let _timing = TimingGuard::probe("stdio", name);
        let budget = self.settings.timeouts.verify(TransportKind::Stdio);
        let session = HandshakeSession::new(name, "stdio", budget);
        let max_line = self.settings.max_tool_payload;

        let mut process = StdioProcess::spawn(&session, config, self.settings.max_line_length)?;
        let result = with_budget(&session, process.initialize(&session, max_line)).await;
        process.shutdown().await;
        result
    }

    /// Spawn the server, initialize, then page through `tools/list`.
    pub async fn server_tools(&self, name: &str, config: &StdioConfig) -> McpResult<Vec<ToolInfo>> {
        let _timing = TimingGuard::tools("stdio", name);
        let budget = self.settings.timeouts.list_tools(TransportKind::Stdio);
        let session = HandshakeSession::new(name, "stdio", budget);
        let max_line = self.settings.max_tool_payload;
        let max_pages = self.settings.max_tool_pages;

        let mut process = StdioProcess::spawn(&session, config, self.settings.max_line_length)?;
        let result = with_budget(&session, async {
            process.initialize(&session, max_line).await?;
            process.send(&initialized_notification()).await?;
            process.list_tools(&session, max_line, max_pages).await
        })
        .await;
        process.shutdown().await;
        result
    }
}

#[async_trait]
impl TransportProbe for StdioProbe {
    async fn verify(&self, descriptor: &ServerDescriptor) -> ServerStatus {
        let result = match descriptor.transport.as_stdio() {
            Some(config) => self.verify_server(&descriptor.name, config).await,
            None => Err(McpError::config_invalid("not a stdio server")),
        };
        match result {
            Ok(init) => ServerStatus::connected(&descriptor.name, TransportKind::Stdio, init),
            Err(e) => ServerStatus::failed(&descriptor.name, TransportKind::Stdio, &e),
        }
    }

    async fn list_tools(&self, descriptor: &ServerDescriptor) -> ToolListResult {
        let result = match descriptor.transport.as_stdio() {
            Some(config) => self.server_tools(&descriptor.name, config).await,
            None => Err(McpError::config_invalid("not a stdio server")),
        };
        match result {
            Ok(tools) => ToolListResult::ok(&descriptor.name, tools),
            Err(e) => ToolListResult::failed(&descriptor.name, &e),
        }
    }
}

/// A running server process with piped stdio.
///
/// The child is spawned with `kill_on_drop`, so dropping this on any path
/// terminates it; [`StdioProcess::shutdown`] also reaps it.
struct StdioProcess {
    command: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioProcess {
    /// Spawn the server; `max_text` caps each captured stderr line.
    fn spawn(session: &HandshakeSession, config: &StdioConfig, max_text: usize) -> McpResult<Self> {
        if !validate_command(&config.command, Platform::host().extensions()) {
            warn!(
                server = %session.server(),
                command = %config.command,
                "Refusing to launch command outside the allow-list"
            );
            return Err(McpError::CommandNotAllowed(config.command.clone()));
        }

        session.enter(HandshakePhase::Connecting);
        let env = build_safe_environment(&config.env);

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        debug!(
            server = %session.server(),
            command = %config.command,
            args = ?config.args,
            env_vars = env.len(),
            "Starting MCP server"
        );

        let mut child = cmd.spawn().map_err(|e| {
            McpError::transport(format!("failed to start {}: {e}", config.command))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("failed to get stdout"))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            let server = session.server().to_string();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                loop {
                    match read_bounded_line(&mut reader, max_text).await {
                        Ok(BoundedLine::Line(line)) => {
                            let line = strip_ansi(&line, max_text);
                            trace!(server = %server, line = %line, "Server stderr");
                            if line.trim().is_empty() {
                                continue;
                            }
                            if let Ok(mut tail) = tail.lock() {
                                if tail.len() == STDERR_TAIL_LINES {
                                    tail.pop_front();
                                }
                                tail.push_back(line);
                            }
                        }
                        Ok(BoundedLine::Oversized { .. }) => continue,
                        Ok(BoundedLine::Eof) | Err(_) => break,
                    }
                }
            })
        });

        Ok(Self {
            command: config.command.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_tail,
            stderr_task,
        })
    }

    async fn initialize(
        &mut self,
        session: &HandshakeSession,
        max_line: usize,
    ) -> McpResult<InitializeResult> {
        let id = session.next_id();
        self.send(&initialize_request(id)).await?;
        session.enter(HandshakePhase::AwaitingInitialize);
        let response = self.read_response(id, max_line).await?;
        response.into_result(METHOD_INITIALIZE)
    }

    async fn list_tools(
        &mut self,
        session: &HandshakeSession,
        max_line: usize,
        max_pages: usize,
    ) -> McpResult<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..max_pages {
            let id = session.next_id();
            self.send(&tools_list_request(id, cursor.as_deref())).await?;
            session.enter(HandshakePhase::AwaitingTools);
            let page: ListToolsResult = self
                .read_response(id, max_line)
                .await?
                .into_result(METHOD_TOOLS_LIST)?;
            tools.extend(page.tools.into_iter().map(ToolInfo::from));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        warn!(server = %session.server(), max_pages, "Stopped following tools/list cursor");
        Ok(tools)
    }

    async fn send(&mut self, message: &JsonRpcRequest) -> McpResult<()> {
        let line = encode_line(message)?;
        trace!(method = %message.method, id = ?message.id, "Writing to server stdin");
        let written = async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.flush().await
        }
        .await;
        match written {
            Ok(()) => Ok(()),
            Err(e) => Err(self.exited(&format!("write failed ({e})")).await),
        }
    }

    /// Read stdout until the response to `id`, skipping log noise.
    async fn read_response(&mut self, id: u64, max_line: usize) -> McpResult<JsonRpcResponse> {
        loop {
            match read_bounded_line(&mut self.stdout, max_line).await? {
                BoundedLine::Line(line) => {
                    if let Some(response) = decode_response(&line, id) {
                        return Ok(response);
                    }
                    if !line.trim().is_empty() {
                        trace!(line = %strip_ansi(&line, 200), "Skipping non-response stdout line");
                    }
                }
                BoundedLine::Oversized { len, head } => {
                    if looks_like_message(&head) {
                        return Err(McpError::protocol(format!(
                            "response exceeds {max_line} bytes"
                        )));
                    }
                    warn!(len, max_line, "Skipping oversized stdout line");
                }
                BoundedLine::Eof => {
                    return Err(self.exited("stdout closed before response").await);
                }
            }
        }
    }

    /// Describe a dead or dying process, with its exit status and stderr tail.
    async fn exited(&mut self, what: &str) -> McpError {
        let status = tokio::time::timeout(EXIT_GRACE, self.child.wait())
            .await
            .ok()
            .and_then(Result::ok);
        // Let the stderr reader drain what the process wrote before exiting.
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(EXIT_GRACE, task).await;
        }

        let mut message = format!("{} {what}", self.command);
        if let Some(status) = status {
            message.push_str(&format!(" ({status})"));
        }
        let tail = self.stderr_tail();
        if !tail.is_empty() {
            message.push_str(&format!("; stderr: {}", tail.join(" | ")));
        }
        McpError::transport(message)
    }

    fn stderr_tail(&self) -> Vec<String> {
        match self.stderr_tail.lock() {
            Ok(tail) => tail.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Kill and reap the child.
    async fn shutdown(&mut self) -> Option<ExitStatus> {
        let _ = self.child.start_kill();
        let status = self.child.wait().await.ok();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        debug!(command = %self.command, ?status, "Stopped MCP server");
        status
    }
}

/// Whether an oversized stdout line starts like a JSON message rather than log output.
fn looks_like_message(head: &str) -> bool {
    head.trim_start().starts_with('{')
}
