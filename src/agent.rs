//! Specialized agents: one model plus one tool server each.
//!
//! Agents never return an error to the coordinator. Tool and model failures
//! come back as a failed [`TaskResult`] carrying the error detail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::ToolClient;
use crate::error::{Error, Result};
use crate::files::WRITE_FILE;
use crate::llm::{complete_with_timeout, LanguageModel, Prompt};
use crate::task::{AgentId, Capability, Payload, TaskRequest, TaskResult, ToolInvocation};
use crate::weather::GET_CURRENT_WEATHER;

const RESEARCH_INSTRUCTIONS: &str = "You are a Research Agent. You receive a tool report \
after the separator. Answer the request in one or two sentences using only facts from \
the report, and always name the location.";

const EXECUTOR_INSTRUCTIONS: &str = "You are an Executor Agent. Format the text after the \
separator so it reads well in a plain text file. Keep every fact and number unchanged. \
Reply with the file content only.";

/// Anything the coordinator can delegate a task to.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    fn capability(&self) -> Capability;

    /// Handle one request, producing exactly one result.
    async fn handle(&self, request: &TaskRequest) -> TaskResult;
}

/// Settings shared by both specialized agents.
#[derive(Clone)]
pub struct AgentRuntime {
    pub model: Arc<dyn LanguageModel>,
    pub model_timeout: Duration,
}

/// Fetches information through the weather server.
pub struct ResearchAgent {
    id: AgentId,
    tools: ToolClient,
    runtime: AgentRuntime,
}

impl ResearchAgent {
    pub fn new(tools: ToolClient, runtime: AgentRuntime) -> Self {
        Self {
            id: AgentId::research(),
            tools,
            runtime,
        }
    }

    async fn run(&self, request: &TaskRequest) -> Result<Payload> {
        let location = request
            .param_str("location")
            .ok_or_else(|| Error::InvalidParams("research task needs a location".into()))?;

        let invocation = ToolInvocation::new(
            GET_CURRENT_WEATHER,
            json!({ "location": location }),
            self.id.clone(),
        );
        let report = self.tools.invoke(&invocation).await?;

        let prompt = Prompt::new(RESEARCH_INSTRUCTIONS, &request.instruction).with_context(&report.text);
        let summary = complete_with_timeout(
            self.runtime.model.as_ref(),
            &prompt,
            self.runtime.model_timeout,
        )
        .await?;

        Ok(Payload::Structured {
            text: summary,
            data: report.data.unwrap_or(Value::Null),
        })
    }
}

#[async_trait::async_trait]
impl Agent for ResearchAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capability(&self) -> Capability {
        Capability::Research
    }

    async fn handle(&self, request: &TaskRequest) -> TaskResult {
        let start = Instant::now();
        match self.run(request).await {
            Ok(payload) => {
                info!(agent = %self.id, "Research task complete");
                TaskResult::success(request, self.id.clone(), payload, start.elapsed())
            }
            Err(e) => {
                warn!(agent = %self.id, "Research task failed: {}", e);
                TaskResult::failure(request, self.id.clone(), &e, start.elapsed())
            }
        }
    }
}

/// Persists results through the file server.
pub struct ExecutorAgent {
    id: AgentId,
    tools: ToolClient,
    runtime: AgentRuntime,
}

impl ExecutorAgent {
    pub fn new(tools: ToolClient, runtime: AgentRuntime) -> Self {
        Self {
            id: AgentId::executor(),
            tools,
            runtime,
        }
    }

    async fn run(&self, request: &TaskRequest) -> Result<Payload> {
        let path = request
            .param_str("path")
            .ok_or_else(|| Error::InvalidParams("write task needs a path".into()))?;
        let content = request
            .param_str("content")
            .ok_or_else(|| Error::InvalidParams("write task needs content".into()))?;
        let format = request
            .parameters
            .get("format")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let content = if format {
            let prompt = Prompt::new(EXECUTOR_INSTRUCTIONS, &request.instruction).with_context(content);
            let formatted = complete_with_timeout(
                self.runtime.model.as_ref(),
                &prompt,
                self.runtime.model_timeout,
            )
            .await?;
            ensure_trailing_newline(formatted)
        } else {
            content.to_string()
        };

        let invocation = ToolInvocation::new(
            WRITE_FILE,
            json!({ "path": path, "content": content }),
            self.id.clone(),
        );
        let output = self.tools.invoke(&invocation).await?;

        Ok(Payload::Structured {
            text: format!("Saved to {}", path),
            data: output.data.unwrap_or_else(|| json!({ "path": path })),
        })
    }
}

fn ensure_trailing_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[async_trait::async_trait]
impl Agent for ExecutorAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capability(&self) -> Capability {
        Capability::Execute
    }

    async fn handle(&self, request: &TaskRequest) -> TaskResult {
        let start = Instant::now();
        match self.run(request).await {
            Ok(payload) => {
                info!(agent = %self.id, "Executor task complete");
                TaskResult::success(request, self.id.clone(), payload, start.elapsed())
            }
            Err(e) => {
                warn!(agent = %self.id, "Executor task failed: {}", e);
                TaskResult::failure(request, self.id.clone(), &e, start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileStore;
    use crate::llm::testing::{HangingModel, ScriptedModel};
    use crate::llm::PassthroughModel;
    use crate::server::ToolServer;
    use crate::task::TaskStatus;
    use crate::weather::WeatherBackend;

    fn runtime(model: Arc<dyn LanguageModel>) -> AgentRuntime {
        AgentRuntime {
            model,
            model_timeout: Duration::from_secs(5),
        }
    }

    fn research(model: Arc<dyn LanguageModel>) -> ResearchAgent {
        let server = Arc::new(ToolServer::weather(WeatherBackend::default()));
        ResearchAgent::new(
            ToolClient::in_process(server, Duration::from_secs(5)),
            runtime(model),
        )
    }

    fn executor(dir: &std::path::Path, model: Arc<dyn LanguageModel>) -> ExecutorAgent {
        let server = Arc::new(ToolServer::files(FileStore::open(dir).unwrap()));
        ExecutorAgent::new(
            ToolClient::in_process(server, Duration::from_secs(5)),
            runtime(model),
        )
    }

    #[tokio::test]
    async fn test_research_success() {
        let agent = research(Arc::new(PassthroughModel));
        let request = TaskRequest::new(AgentId::coordinator(), "weather?").with_param("location", "Seattle");

        let result = agent.handle(&request).await;
        assert_eq!(result.status, TaskStatus::Success);
        assert!(result.payload.as_text().contains("Seattle"));
        assert_eq!(result.payload.data().unwrap()["location"], "Seattle");
    }

    #[tokio::test]
    async fn test_research_absorbs_tool_failure() {
        let agent = research(Arc::new(PassthroughModel));
        let request = TaskRequest::new(AgentId::coordinator(), "weather?").with_param("location", "Atlantis");

        let result = agent.handle(&request).await;
        assert_eq!(result.status, TaskStatus::Failure);
        assert!(result.error_detail().contains("location not found"));
    }

    #[tokio::test]
    async fn test_research_absorbs_model_failure() {
        let model = Arc::new(ScriptedModel::new(vec![Err(Error::ModelCallFailed(
            "HTTP 429".into(),
        ))]));
        let agent = research(model);
        let request = TaskRequest::new(AgentId::coordinator(), "weather?").with_param("location", "Paris");

        let result = agent.handle(&request).await;
        assert!(!result.is_success());
        assert!(result.error_detail().contains("HTTP 429"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_research_model_timeout() {
        let agent = ResearchAgent::new(
            ToolClient::in_process(
                Arc::new(ToolServer::weather(WeatherBackend::default())),
                Duration::from_secs(5),
            ),
            AgentRuntime {
                model: Arc::new(HangingModel),
                model_timeout: Duration::from_millis(20),
            },
        );
        let request = TaskRequest::new(AgentId::coordinator(), "weather?").with_param("location", "Paris");
        let result = agent.handle(&request).await;
        assert!(!result.is_success());
        assert!(result.error_detail().starts_with("model call failed"));
    }

    #[tokio::test]
    async fn test_executor_writes_literal_content() {
        let dir = tempfile::tempdir().unwrap();
        let agent = executor(dir.path(), Arc::new(PassthroughModel));
        let request = TaskRequest::new(AgentId::coordinator(), "save")
            .with_param("path", "notes.txt")
            .with_param("content", "exact text");

        let result = agent.handle(&request).await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
            "exact text"
        );
    }

    #[tokio::test]
    async fn test_executor_formats_through_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::new(vec![Ok("FORMATTED".into())]));
        let agent = executor(dir.path(), model.clone());
        let request = TaskRequest::new(AgentId::coordinator(), "save")
            .with_param("path", "report.txt")
            .with_param("content", "raw")
            .with_param("format", true);

        let result = agent.handle(&request).await;
        assert!(result.is_success());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("report.txt")).unwrap(),
            "FORMATTED\n"
        );
        assert_eq!(model.prompts.lock().unwrap()[0].context.as_deref(), Some("raw"));
    }

    #[tokio::test]
    async fn test_executor_denied_path() {
        let dir = tempfile::tempdir().unwrap();
        let agent = executor(dir.path(), Arc::new(PassthroughModel));
        let request = TaskRequest::new(AgentId::coordinator(), "save")
            .with_param("path", "../outside.txt")
            .with_param("content", "x");

        let result = agent.handle(&request).await;
        assert!(!result.is_success());
        assert!(result.error_detail().contains("permission denied"));
    }
}
