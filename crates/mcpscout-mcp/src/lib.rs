//! Verification and tool discovery for Model Context Protocol (MCP) servers.
//!
//! Given a set of configured servers, mcpscout checks which ones answer the
//! MCP `initialize` handshake and, on demand, lists their tools.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌───────────────┐     ┌─────────────┐
//! │ ServerSource │────▶│  Discovery  │────▶│ ProbeRegistry │────▶│ MCP Servers │
//! │ (.mcp.json)  │     │  (fan-out)  │◀────│ stdio/http/sse│◀────│             │
//! └──────────────┘     └─────────────┘     └───────────────┘     └─────────────┘
//! ```
//!
//! # Supported Transports
//!
//! - **stdio**: Local servers spawned with an allow-listed command and a
//!   filtered environment
//! - **http** / **streamable-http**: Direct JSON-RPC POST
//! - **sse**: Event stream with endpoint discovery
//!
//! # Example
//!
//! ```no_run
//! use mcpscout_mcp::{Discovery, JsonServerSource, ProbeSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let source = Arc::new(JsonServerSource::new());
//! let discovery = Discovery::new(source, ProbeSettings::from_env())?;
//!
//! let report = discovery.servers_status(std::path::Path::new(".")).await;
//! for status in &report {
//!     println!("{} {}", status.name, status.status.as_str());
//! }
//! # Ok(())
//! # }
//! ```

pub mod discovery;
mod error;
pub mod framing;
pub mod http;
pub mod loader;
pub mod protocol;
pub mod security;
mod server;
pub mod session;
pub mod settings;
pub mod sse;
mod status;
pub mod stdio;
mod transport;

pub use discovery::Discovery;
pub use error::{ErrorKind, McpError, McpResult};
pub use http::HttpProbe;
pub use loader::{JsonServerSource, ServerSource};
pub use protocol::{McpTool, ServerInfo};
pub use security::{build_safe_environment, validate_command, ExtensionSet, SafeEnvironment};
pub use server::{
    InvalidServer, RemoteConfig, ResolvedServers, ServerDescriptor, ServerLookup, StdioConfig,
    TransportConfig, TransportKind,
};
pub use session::{HandshakePhase, HandshakeSession};
pub use settings::{ProbeSettings, Timeouts};
pub use sse::SseProbe;
pub use status::{AggregateReport, ConnectionStatus, ServerStatus, ToolInfo, ToolListResult};
pub use stdio::StdioProbe;
pub use transport::{ProbeRegistry, TransportProbe};
