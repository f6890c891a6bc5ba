//! a2a-mcp: tool servers and the coordinator workflow.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use a2a_mcp::{AgentOrchestrator, Config, FileStore, Outcome, ToolServer, WeatherBackend};

/// Coordinator, research and executor agents over MCP tool servers.
#[derive(Parser, Debug)]
#[command(name = "a2a-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one of the tool servers.
    Serve {
        #[command(subcommand)]
        server: ServerKind,
    },
    /// Handle a single instruction end to end.
    Run {
        /// Print every A2A message passed while handling the request.
        #[arg(long)]
        show_messages: bool,

        /// The instruction, e.g. "What's the weather in Seattle and save it to a file?"
        #[arg(required = true, num_args = 1..)]
        instruction: Vec<String>,
    },
    /// Read instructions from stdin, one per line. Each line is independent.
    Chat {
        /// Print every A2A message passed while handling each request.
        #[arg(long)]
        show_messages: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ServerKind {
    /// Weather lookups.
    Weather {
        /// HTTP bind address.
        #[arg(long, default_value = "127.0.0.1:8101")]
        bind: SocketAddr,

        /// Speak MCP on stdin/stdout instead of HTTP.
        #[arg(long)]
        stdio: bool,
    },
    /// File reads and writes under one directory.
    Files {
        /// HTTP bind address.
        #[arg(long, default_value = "127.0.0.1:8102")]
        bind: SocketAddr,

        /// Directory the server may read and write.
        #[arg(long, default_value = "output")]
        root: PathBuf,

        /// Speak MCP on stdin/stdout instead of HTTP.
        #[arg(long)]
        stdio: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Logs go to stderr to keep stdio MCP traffic clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Serve { server } => serve(server).await,
        Command::Run {
            show_messages,
            instruction,
        } => {
            let orchestrator = orchestrator().await?;
            let outcome = orchestrator.run(&instruction.join(" ")).await;
            print_outcome(&outcome, show_messages);
            Ok(())
        }
        Command::Chat { show_messages } => {
            let orchestrator = orchestrator().await?;
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "exit" | "quit") {
                    break;
                }
                let outcome = orchestrator.run(line).await;
                print_outcome(&outcome, show_messages);
                println!();
            }
            Ok(())
        }
    }
}

async fn orchestrator() -> anyhow::Result<AgentOrchestrator> {
    let config = Config::from_env().context("invalid configuration")?;
    AgentOrchestrator::from_config(&config)
        .await
        .context("failed to start agents")
}

async fn serve(kind: ServerKind) -> anyhow::Result<()> {
    let (server, bind, stdio) = match kind {
        ServerKind::Weather { bind, stdio } => {
            (ToolServer::weather(WeatherBackend::default()), bind, stdio)
        }
        ServerKind::Files { bind, root, stdio } => {
            let store = FileStore::open(&root)
                .with_context(|| format!("cannot open {}", root.display()))?;
            (ToolServer::files(store), bind, stdio)
        }
    };

    info!(server = %server.name(), "Tool server starting");

    if stdio {
        run_stdio(&server).await
    } else {
        run_http(Arc::new(server), bind).await
    }
}

#[cfg(feature = "stdio")]
async fn run_stdio(server: &ToolServer) -> anyhow::Result<()> {
    server.run_stdio().await?;
    Ok(())
}

#[cfg(not(feature = "stdio"))]
async fn run_stdio(_server: &ToolServer) -> anyhow::Result<()> {
    anyhow::bail!("built without the `stdio` feature")
}

#[cfg(feature = "http")]
async fn run_http(server: Arc<ToolServer>, bind: SocketAddr) -> anyhow::Result<()> {
    a2a_mcp::server::http::serve(server, bind).await?;
    Ok(())
}

#[cfg(not(feature = "http"))]
async fn run_http(_server: Arc<ToolServer>, _bind: SocketAddr) -> anyhow::Result<()> {
    anyhow::bail!("built without the `http` feature; use --stdio")
}

fn print_outcome(outcome: &Outcome, show_messages: bool) {
    if show_messages {
        for message in &outcome.transcript {
            eprintln!("{}", message);
        }
    }
    println!("{}", outcome.response);
}
