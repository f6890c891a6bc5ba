//! Multi-agent A2A orchestration over MCP tool servers
//!
//! A coordinator agent takes a natural-language instruction, plans it into
//! steps and hands each step to the agent that owns the capability. Agents
//! reach the outside world only through MCP tool servers:
//!
//! - a weather server (`get_current_weather`, `list_locations`)
//! - a file server (`read_file`, `write_file`, `list_files`) sandboxed to one directory
//!
//! # Architecture
//!
//! ```text
//!                      instruction
//!                           │
//!                           ▼
//!               ┌───────────────────────┐
//!               │   coordinator-agent   │  planner + router
//!               └───────────┬───────────┘
//!              A2A request  │  A2A result
//!         ┌─────────────────┴─────────────────┐
//!         ▼                                   ▼
//! ┌───────────────┐                   ┌───────────────┐
//! │ research-agent│                   │ executor-agent│
//! └───────┬───────┘                   └───────┬───────┘
//!         │ MCP (JSON-RPC, HTTP/stdio)        │
//!         ▼                                   ▼
//! ┌───────────────┐                   ┌───────────────┐
//! │  weather-mcp  │                   │   files-mcp   │
//! └───────────────┘                   └───────────────┘
//! ```
//!
//! Every failure along the way ends up in the coordinator's reply, naming
//! the step and agent that failed. The coordinator never returns an error.

pub mod agent;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod files;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod protocol;
pub mod router;
pub mod server;
pub mod task;
pub mod tools;
pub mod weather;
pub mod workflow;

pub use agent::{Agent, ExecutorAgent, ResearchAgent};
pub use client::ToolClient;
pub use config::Config;
pub use coordinator::{Coordinator, Outcome};
pub use error::{Error, Result, ToolErrorKind};
pub use files::FileStore;
pub use orchestrator::AgentOrchestrator;
pub use protocol::{McpRequest, McpResponse};
pub use router::AgentRouter;
pub use server::ToolServer;
pub use task::{AgentId, Capability, TaskRequest, TaskResult};
pub use weather::WeatherBackend;
pub use workflow::{Plan, PlanStep, StepAction};
