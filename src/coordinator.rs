//! Coordinator agent: plan, dispatch sequentially, aggregate.
//!
//! The coordinator never fails towards its caller. Planning problems and
//! sub-agent failures all end up as plain statements in the response text.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::Result;
use crate::planner::Planner;
use crate::router::AgentRouter;
use crate::task::{AgentId, TaskRequest, TaskResult};
use crate::workflow::{ContentSource, Plan, PlanState, StepAction, StepState};

/// Kind of an A2A message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserRequest,
    TaskRequest,
    TaskResult,
    FinalResponse,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UserRequest => "user_request",
            Self::TaskRequest => "task_request",
            Self::TaskResult => "task_result",
            Self::FinalResponse => "final_response",
        };
        f.write_str(s)
    }
}

/// One message passed between participants during a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aMessage {
    pub from: AgentId,
    pub to: AgentId,
    pub kind: MessageKind,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for A2aMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {} ({}): {}",
            self.at.format("%H:%M:%S%.3f"),
            self.from,
            self.to,
            self.kind,
            self.content
        )
    }
}

/// Everything one request produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Final natural-language response.
    pub response: String,
    /// The executed plan; `None` when planning failed.
    pub plan: Option<Plan>,
    /// Messages in the order they were passed.
    pub transcript: Vec<A2aMessage>,
}

impl Outcome {
    /// Whether every planned step succeeded.
    pub fn succeeded(&self) -> bool {
        matches!(self.plan.as_ref().map(|p| &p.state), Some(PlanState::Completed))
    }

    /// Agents that received a task, in dispatch order.
    pub fn dispatched_to(&self) -> Vec<AgentId> {
        self.transcript
            .iter()
            .filter(|m| m.kind == MessageKind::TaskRequest)
            .map(|m| m.to.clone())
            .collect()
    }
}

/// Routes one user instruction through the specialized agents.
pub struct Coordinator {
    id: AgentId,
    planner: Arc<dyn Planner>,
    router: Arc<RwLock<AgentRouter>>,
}

impl Coordinator {
    pub fn new(planner: Arc<dyn Planner>, router: AgentRouter) -> Self {
        Self {
            id: AgentId::coordinator(),
            planner,
            router: Arc::new(RwLock::new(router)),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Shared handle on the agent router, for status reporting.
    pub fn router(&self) -> Arc<RwLock<AgentRouter>> {
        self.router.clone()
    }

    /// Text in, text out.
    pub async fn handle(&self, instruction: &str) -> String {
        self.run(instruction).await.response
    }

    /// Handle one instruction and keep the plan and transcript.
    pub async fn run(&self, instruction: &str) -> Outcome {
        let mut transcript = Vec::new();
        self.record(
            &mut transcript,
            AgentId::user(),
            self.id.clone(),
            MessageKind::UserRequest,
            instruction,
        );

        let mut plan = match self.plan(instruction).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(agent = %self.id, "Planning failed: {}", e);
                let response = format!(
                    "I could not handle this request, no agent was contacted. Reason: {}.",
                    e
                );
                self.record(
                    &mut transcript,
                    self.id.clone(),
                    AgentId::user(),
                    MessageKind::FinalResponse,
                    &response,
                );
                return Outcome {
                    response,
                    plan: None,
                    transcript,
                };
            }
        };

        info!(agent = %self.id, plan = %plan.id, steps = plan.steps.len(), "Executing plan");
        plan.state = PlanState::Running;

        while !plan.is_complete() {
            self.dispatch_current(&mut plan, &mut transcript).await;
            if let Err(e) = plan.advance() {
                warn!(plan = %plan.id, "Cannot advance plan: {}", e);
                break;
            }
        }

        let response = aggregate(&plan);
        self.record(
            &mut transcript,
            self.id.clone(),
            AgentId::user(),
            MessageKind::FinalResponse,
            &response,
        );

        Outcome {
            response,
            plan: Some(plan),
            transcript,
        }
    }

    async fn plan(&self, instruction: &str) -> Result<Plan> {
        let plan = self.planner.plan(instruction).await?;
        let router = self.router.read().await;
        for capability in plan.capabilities() {
            router.resolve(capability)?;
        }
        Ok(plan)
    }

    /// Run the current step, or skip it if an input it needs is missing.
    async fn dispatch_current(&self, plan: &mut Plan, transcript: &mut Vec<A2aMessage>) {
        let index = plan.current_step;
        let Some(step) = plan.current() else {
            return;
        };
        let action = step.action.clone();

        if let Some(source) = action.depends_on() {
            if !plan.result_of(source).is_some_and(TaskResult::is_success) {
                let reason = format!("step {} did not succeed", source + 1);
                info!(plan = %plan.id, step = index + 1, "Skipping step: {}", reason);
                if let Some(step) = plan.current_mut() {
                    step.skip(reason);
                }
                return;
            }
        }

        let request = self.build_request(plan, &action);
        let agent = match self.router.read().await.resolve(action.capability()) {
            Ok(agent) => agent,
            Err(e) => {
                let result = TaskResult::failure(&request, self.id.clone(), &e, Duration::ZERO);
                if let Some(step) = plan.current_mut() {
                    step.finish(result);
                }
                return;
            }
        };

        self.record(
            transcript,
            self.id.clone(),
            agent.id().clone(),
            MessageKind::TaskRequest,
            &request.instruction,
        );
        if let Some(step) = plan.current_mut() {
            step.start();
        }

        let result = agent.handle(&request).await;

        {
            let mut router = self.router.write().await;
            let elapsed = Duration::from_millis(result.duration_ms);
            if result.is_success() {
                router.record_success(agent.id(), elapsed);
            } else {
                router.record_failure(agent.id(), elapsed);
            }
        }

        let summary = if result.is_success() {
            result.payload.as_text().to_string()
        } else {
            format!("FAILED: {}", result.error_detail())
        };
        self.record(
            transcript,
            agent.id().clone(),
            self.id.clone(),
            MessageKind::TaskResult,
            &summary,
        );

        if let Some(step) = plan.current_mut() {
            step.finish(result);
        }
    }

    fn build_request(&self, plan: &Plan, action: &StepAction) -> TaskRequest {
        match action {
            StepAction::LookupWeather { location } => TaskRequest::new(
                self.id.clone(),
                format!(
                    "Find the current weather for {}. Original request: {}",
                    location, plan.instruction
                ),
            )
            .with_param("location", location.as_str()),
            StepAction::WriteFile { path, content } => {
                let (text, from_step) = match content {
                    ContentSource::Literal { text } => (text.clone(), false),
                    ContentSource::FromStep { step } => (
                        plan.result_of(*step)
                            .map(|r| r.payload.as_text().to_string())
                            .unwrap_or_default(),
                        true,
                    ),
                };
                TaskRequest::new(self.id.clone(), format!("Save the following to {}.", path))
                    .with_param("path", path.as_str())
                    .with_param("content", text)
                    .with_param("format", from_step)
            }
        }
    }

    fn record(
        &self,
        transcript: &mut Vec<A2aMessage>,
        from: AgentId,
        to: AgentId,
        kind: MessageKind,
        content: &str,
    ) {
        let message = A2aMessage {
            from,
            to,
            kind,
            content: content.to_string(),
            at: Utc::now(),
        };
        info!(from = %message.from, to = %message.to, kind = %message.kind, "A2A message");
        transcript.push(message);
    }
}

/// Combine step outcomes into the final response.
fn aggregate(plan: &Plan) -> String {
    let mut lines = Vec::new();
    let mut failed = 0;
    let mut skipped = 0;

    for (index, step) in plan.steps.iter().enumerate() {
        let what = step.action.describe();
        match (&step.state, &step.result) {
            (StepState::Completed, Some(result)) => match &step.action {
                StepAction::WriteFile { path, .. } => {
                    lines.push(format!("Saved the result to {}.", path));
                }
                _ => lines.push(result.payload.as_text().to_string()),
            },
            (StepState::Failed(reason), result) => {
                failed += 1;
                let agent = result
                    .as_ref()
                    .map(|r| r.agent.to_string())
                    .unwrap_or_else(|| "the coordinator".into());
                lines.push(format!(
                    "Step {} failed: {} could not {}. Reason: {}",
                    index + 1,
                    agent,
                    what,
                    reason
                ));
            }
            (StepState::Skipped(reason), _) => {
                skipped += 1;
                lines.push(format!(
                    "Step {} was not attempted: did not {} because {}.",
                    index + 1,
                    what,
                    reason
                ));
            }
            (state, _) => {
                failed += 1;
                lines.push(format!(
                    "Step {} did not finish ({:?}): {}.",
                    index + 1,
                    state,
                    what
                ));
            }
        }
    }

    if failed + skipped > 0 {
        lines.push(format!(
            "The request was not completed: {} step(s) failed, {} skipped.",
            failed, skipped
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::agent::{Agent, AgentRuntime, ExecutorAgent, ResearchAgent};
    use crate::client::ToolClient;
    use crate::files::FileStore;
    use crate::llm::PassthroughModel;
    use crate::planner::RulePlanner;
    use crate::server::ToolServer;
    use crate::task::{Capability, Payload};
    use crate::weather::WeatherBackend;

    /// Wraps an agent and counts how often it is called.
    struct Counting<A> {
        inner: A,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl<A: Agent> Agent for Counting<A> {
        fn id(&self) -> &AgentId {
            self.inner.id()
        }

        fn capability(&self) -> Capability {
            self.inner.capability()
        }

        async fn handle(&self, request: &TaskRequest) -> TaskResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.handle(request).await
        }
    }

    struct Fixture {
        coordinator: Coordinator,
        research_calls: Arc<AtomicUsize>,
        executor_calls: Arc<AtomicUsize>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AgentRuntime {
            model: Arc::new(PassthroughModel),
            model_timeout: Duration::from_secs(5),
        };
        let weather = Arc::new(ToolServer::weather(WeatherBackend::default()));
        let files = Arc::new(ToolServer::files(FileStore::open(dir.path()).unwrap()));

        let research_calls = Arc::new(AtomicUsize::new(0));
        let executor_calls = Arc::new(AtomicUsize::new(0));

        let mut router = AgentRouter::new();
        router
            .register(Arc::new(Counting {
                inner: ResearchAgent::new(
                    ToolClient::in_process(weather, Duration::from_secs(5)),
                    runtime.clone(),
                ),
                calls: research_calls.clone(),
            }))
            .unwrap();
        router
            .register(Arc::new(Counting {
                inner: ExecutorAgent::new(
                    ToolClient::in_process(files, Duration::from_secs(5)),
                    runtime,
                ),
                calls: executor_calls.clone(),
            }))
            .unwrap();

        Fixture {
            coordinator: Coordinator::new(Arc::new(RulePlanner), router),
            research_calls,
            executor_calls,
            dir,
        }
    }

    #[tokio::test]
    async fn test_weather_and_save_scenario() {
        let f = fixture();
        let outcome = f
            .coordinator
            .run("What's the weather in Seattle and save it to a file?")
            .await;

        assert!(outcome.succeeded(), "{}", outcome.response);
        assert!(outcome.response.contains("Seattle"));
        assert!(outcome.response.contains("weather_seattle.txt"));
        assert_eq!(
            outcome.dispatched_to(),
            vec![AgentId::research(), AgentId::executor()]
        );

        let saved = std::fs::read_to_string(f.dir.path().join("weather_seattle.txt")).unwrap();
        assert!(saved.contains("Weather in Seattle"));

        let kinds: Vec<_> = outcome.transcript.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::UserRequest,
                MessageKind::TaskRequest,
                MessageKind::TaskResult,
                MessageKind::TaskRequest,
                MessageKind::TaskResult,
                MessageKind::FinalResponse,
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_location_skips_write() {
        let f = fixture();
        let outcome = f
            .coordinator
            .run("What's the weather in Atlantis and save it to a file?")
            .await;

        assert!(!outcome.succeeded());
        assert!(outcome.response.contains("location not found"));
        assert!(outcome.response.contains("research-agent"));
        assert!(outcome.response.contains("not completed"));
        assert!(!outcome.response.contains("Saved the result"));
        assert_eq!(f.executor_calls.load(Ordering::SeqCst), 0);
        assert!(!f.dir.path().join("weather_atlantis.txt").exists());

        let plan = outcome.plan.unwrap();
        assert!(matches!(plan.steps[1].state, StepState::Skipped(_)));
    }

    #[tokio::test]
    async fn test_single_agent_requests_do_not_fan_out() {
        let f = fixture();
        let outcome = f.coordinator.run("What is the weather in Tokyo?").await;
        assert!(outcome.succeeded());
        assert_eq!(f.research_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.executor_calls.load(Ordering::SeqCst), 0);

        let outcome = f.coordinator.run("What's the record temperature in Seattle?").await;
        assert!(outcome.succeeded(), "{}", outcome.response);
        assert_eq!(outcome.dispatched_to(), vec![AgentId::research()]);
        assert_eq!(f.research_calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.executor_calls.load(Ordering::SeqCst), 0);

        let outcome = f.coordinator.run(r#"Save "remember the umbrella" to todo.txt"#).await;
        assert!(outcome.succeeded(), "{}", outcome.response);
        assert_eq!(f.research_calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.executor_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(f.dir.path().join("todo.txt")).unwrap(),
            "remember the umbrella"
        );
    }

    #[tokio::test]
    async fn test_ambiguous_request_contacts_nobody() {
        let f = fixture();
        let response = f.coordinator.handle("Tell me a joke").await;
        assert!(response.contains("could not handle"));
        assert_eq!(f.research_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.executor_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_executor_failure_is_surfaced() {
        let f = fixture();
        let outcome = f
            .coordinator
            .run("Get the weather in London and save it to ../escape.txt")
            .await;
        assert!(!outcome.succeeded());
        assert!(outcome.response.contains("Weather in London"));
        assert!(outcome.response.contains("executor-agent could not save the result to ../escape.txt"));
        assert!(outcome.response.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_stats_recorded() {
        let f = fixture();
        f.coordinator.run("weather in Paris and save it").await;
        f.coordinator.run("weather in Atlantis").await;

        let router = f.coordinator.router();
        let stats = router.read().await.get_stats();
        assert_eq!(stats[&AgentId::research()].total_requests, 2);
        assert_eq!(stats[&AgentId::research()].failed_requests, 1);
        assert_eq!(stats[&AgentId::executor()].successful_requests, 1);
    }

    #[tokio::test]
    async fn test_missing_capability_is_planning_failure() {
        struct OnlyResearch(AgentId);

        #[async_trait::async_trait]
        impl Agent for OnlyResearch {
            fn id(&self) -> &AgentId {
                &self.0
            }

            fn capability(&self) -> Capability {
                Capability::Research
            }

            async fn handle(&self, request: &TaskRequest) -> TaskResult {
                TaskResult::success(request, AgentId::research(), Payload::text("sunny"), Duration::ZERO)
            }
        }

        let mut router = AgentRouter::new();
        router.register(Arc::new(OnlyResearch(AgentId::research()))).unwrap();
        let coordinator = Coordinator::new(Arc::new(RulePlanner), router);

        let outcome = coordinator.run("weather in Oslo and save it").await;
        assert!(outcome.plan.is_none());
        assert!(outcome.dispatched_to().is_empty());
        assert!(outcome.response.contains("no agent provides execute"));
    }
}
