//! mcpscout - health checks and tool discovery for MCP servers.
//!
//! This is the main entry point for the mcpscout CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::{handle_status, handle_tools, SourceArgs};
use mcpscout_util::log::{self, LogConfig};

#[derive(Parser)]
#[command(name = "mcpscout")]
#[command(author, version, about = "Verify MCP servers and list their tools", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify every configured MCP server
    Status {
        #[command(flatten)]
        source: SourceArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the tools of one MCP server
    Tools {
        /// Server name
        name: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON on stdout stays parseable
    log::init(LogConfig::from_flags(cli.verbose));

    match cli.command {
        Commands::Status { source, json } => handle_status(&source, json).await,
        Commands::Tools { name, source, json } => handle_tools(&name, &source, json).await,
    }
}
