//! Wires tool servers, agents and the coordinator together from [`Config`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::{AgentRuntime, ExecutorAgent, ResearchAgent};
use crate::client::ToolClient;
use crate::config::{Config, PlannerKind};
use crate::coordinator::{Coordinator, Outcome};
use crate::error::{Error, Result};
use crate::files::FileStore;
use crate::llm::{AzureOpenAiModel, LanguageModel, PassthroughModel};
use crate::planner::{ModelPlanner, Planner, RulePlanner};
use crate::router::{AgentRouter, AgentStats};
use crate::server::ToolServer;
use crate::task::{AgentId, Capability};
use crate::weather::WeatherBackend;

const CLIENT_NAME: &str = "a2a-coordinator";

/// One configured set of agents, ready to take requests.
pub struct AgentOrchestrator {
    coordinator: Coordinator,
    model_name: String,
    weather_endpoint: String,
    files_endpoint: String,
}

impl AgentOrchestrator {
    /// Build everything `config` describes.
    ///
    /// Servers without a URL run in this process. A remote server that fails
    /// the handshake is logged, and later calls go ahead without one.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = match &config.model {
            Some(azure) => Arc::new(AzureOpenAiModel::new(azure.clone(), config.model_timeout)?),
            None => {
                info!("No Azure OpenAI settings; using the offline passthrough model");
                Arc::new(PassthroughModel)
            }
        };

        let weather = match &config.weather_url {
            Some(url) => ToolClient::http(url, config.tool_timeout)?,
            None => ToolClient::in_process(
                Arc::new(ToolServer::weather(WeatherBackend::default())),
                config.tool_timeout,
            ),
        };
        let files = match &config.files_url {
            Some(url) => ToolClient::http(url, config.tool_timeout)?,
            None => ToolClient::in_process(
                Arc::new(ToolServer::files(FileStore::open(&config.output_dir)?)),
                config.tool_timeout,
            ),
        };

        for client in [&weather, &files] {
            if let Err(e) = client.initialize(CLIENT_NAME).await {
                warn!(endpoint = %client.endpoint(), "Tool server handshake failed: {}", e);
                continue;
            }
            match client.list_tools().await {
                Ok(tools) => {
                    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
                    info!(endpoint = %client.endpoint(), tools = ?names, "Connected to tool server");
                }
                Err(e) => warn!(endpoint = %client.endpoint(), "Tool discovery failed: {}", e),
            }
        }

        let planner: Arc<dyn Planner> = match config.planner {
            PlannerKind::Rules => Arc::new(RulePlanner),
            PlannerKind::Model if config.model.is_some() => {
                Arc::new(ModelPlanner::new(model.clone(), config.model_timeout))
            }
            PlannerKind::Model => {
                return Err(Error::Config(
                    "the model planner needs AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY".into(),
                ))
            }
        };

        let runtime = AgentRuntime {
            model: model.clone(),
            model_timeout: config.model_timeout,
        };
        Self::assemble(model.name().to_string(), planner, weather, files, runtime)
    }

    /// Build from already constructed parts.
    pub fn assemble(
        model_name: String,
        planner: Arc<dyn Planner>,
        weather: ToolClient,
        files: ToolClient,
        runtime: AgentRuntime,
    ) -> Result<Self> {
        let weather_endpoint = weather.endpoint();
        let files_endpoint = files.endpoint();

        let mut router = AgentRouter::new();
        router.register(Arc::new(ResearchAgent::new(weather, runtime.clone())))?;
        router.register(Arc::new(ExecutorAgent::new(files, runtime)))?;

        Ok(Self {
            coordinator: Coordinator::new(planner, router),
            model_name,
            weather_endpoint,
            files_endpoint,
        })
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Run one end-to-end request.
    pub async fn run(&self, instruction: &str) -> Outcome {
        self.coordinator.run(instruction).await
    }

    /// Get orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let router = self.coordinator.router();
        let router = router.read().await;

        OrchestratorStatus {
            model: self.model_name.clone(),
            weather_endpoint: self.weather_endpoint.clone(),
            files_endpoint: self.files_endpoint.clone(),
            agents: router.registrations(),
            agent_stats: router.get_stats(),
        }
    }
}

/// Orchestrator status.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    /// Model backing every agent.
    pub model: String,
    pub weather_endpoint: String,
    pub files_endpoint: String,
    /// Registered capabilities.
    pub agents: Vec<(Capability, AgentId)>,
    /// Agent statistics.
    pub agent_stats: HashMap<AgentId, AgentStats>,
}
