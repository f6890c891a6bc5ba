//! Ordered plan the coordinator executes for one user request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::{Capability, TaskResult};

/// The planned steps for one user instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan ID.
    pub id: String,
    /// The user instruction this plan answers.
    pub instruction: String,
    /// Current state.
    pub state: PlanState,
    /// Steps, executed in order.
    pub steps: Vec<PlanStep>,
    /// Index of the next step to run.
    pub current_step: usize,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// When the plan was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create an empty plan.
    pub fn new(instruction: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            instruction: instruction.into(),
            state: PlanState::Pending,
            steps: Vec::new(),
            current_step: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a step, returning its index.
    pub fn add_step(&mut self, step: PlanStep) -> usize {
        self.steps.push(step);
        self.updated_at = Utc::now();
        self.steps.len() - 1
    }

    /// Check the plan is non-empty and only feeds steps from earlier ones.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::PlanningAmbiguous("plan has no steps".into()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(source) = step.action.depends_on() {
                if source >= index {
                    return Err(Error::PlanningAmbiguous(format!(
                        "step {} reads the output of step {}, which does not run before it",
                        index + 1,
                        source + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Capabilities the plan needs, in step order.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.steps.iter().map(|s| s.action.capability()).collect()
    }

    /// Get the current step.
    pub fn current(&self) -> Option<&PlanStep> {
        self.steps.get(self.current_step)
    }

    /// Get the current step mutably.
    pub fn current_mut(&mut self) -> Option<&mut PlanStep> {
        self.steps.get_mut(self.current_step)
    }

    /// Advance to the next step.
    pub fn advance(&mut self) -> Result<()> {
        if self.current_step >= self.steps.len() {
            return Err(Error::InvalidParams("plan already complete".into()));
        }
        self.current_step += 1;
        self.updated_at = Utc::now();

        if self.current_step >= self.steps.len() {
            self.state = match self.steps.iter().find_map(PlanStep::failure_reason) {
                Some(reason) => PlanState::Failed(reason.to_string()),
                None => PlanState::Completed,
            };
        }
        Ok(())
    }

    /// Check if every step has been processed.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, PlanState::Completed | PlanState::Failed(_))
    }

    /// Result of an earlier step.
    pub fn result_of(&self, index: usize) -> Option<&TaskResult> {
        self.steps.get(index).and_then(|s| s.result.as_ref())
    }
}

/// State of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PlanState {
    Pending,
    Running,
    /// Every step succeeded.
    Completed,
    /// At least one step failed or was skipped.
    Failed(String),
}

/// A single step in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step ID.
    pub id: String,
    /// What the step does.
    pub action: StepAction,
    /// Step state.
    pub state: StepState,
    /// Result of the step once dispatched.
    pub result: Option<TaskResult>,
}

impl PlanStep {
    pub fn new(action: StepAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            state: StepState::Pending,
            result: None,
        }
    }

    /// A weather lookup step.
    pub fn lookup_weather(location: impl Into<String>) -> Self {
        Self::new(StepAction::LookupWeather {
            location: location.into(),
        })
    }

    /// A file write step.
    pub fn write_file(path: impl Into<String>, content: ContentSource) -> Self {
        Self::new(StepAction::WriteFile {
            path: path.into(),
            content,
        })
    }

    /// Mark step as running.
    pub fn start(&mut self) {
        self.state = StepState::Running;
    }

    /// Record the step's result; the state follows its status.
    pub fn finish(&mut self, result: TaskResult) {
        self.state = if result.is_success() {
            StepState::Completed
        } else {
            StepState::Failed(result.error_detail().to_string())
        };
        self.result = Some(result);
    }

    /// Mark step as skipped without dispatching it.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.state = StepState::Skipped(reason.into());
    }

    fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            StepState::Failed(r) | StepState::Skipped(r) => Some(r),
            _ => None,
        }
    }
}

/// What a step asks an agent to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Look up current weather.
    LookupWeather { location: String },
    /// Persist content to a file.
    WriteFile { path: String, content: ContentSource },
}

impl StepAction {
    /// Capability that serves this action.
    pub fn capability(&self) -> Capability {
        match self {
            Self::LookupWeather { .. } => Capability::Research,
            Self::WriteFile { .. } => Capability::Execute,
        }
    }

    /// Earlier step whose output this action consumes.
    pub fn depends_on(&self) -> Option<usize> {
        match self {
            Self::WriteFile {
                content: ContentSource::FromStep { step },
                ..
            } => Some(*step),
            _ => None,
        }
    }

    /// Short description for messages and responses.
    pub fn describe(&self) -> String {
        match self {
            Self::LookupWeather { location } => format!("look up the weather for {}", location),
            Self::WriteFile { path, .. } => format!("save the result to {}", path),
        }
    }
}

/// Where a write step's content comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContentSource {
    /// Text given in the instruction.
    Literal { text: String },
    /// Payload of an earlier step (0-based index).
    FromStep { step: usize },
}

/// State of a plan step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed(String),
    /// Not dispatched because an input it needed was unavailable.
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AgentId, Payload, TaskRequest};
    use std::time::Duration;

    fn two_step() -> Plan {
        let mut plan = Plan::new("weather and save");
        let lookup = plan.add_step(PlanStep::lookup_weather("Seattle"));
        plan.add_step(PlanStep::write_file(
            "weather_seattle.txt",
            ContentSource::FromStep { step: lookup },
        ));
        plan
    }

    #[test]
    fn test_plan_creation() {
        let plan = two_step();
        assert_eq!(plan.state, PlanState::Pending);
        assert!(plan.validate().is_ok());
        assert_eq!(
            plan.capabilities(),
            vec![Capability::Research, Capability::Execute]
        );
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let mut plan = Plan::new("bad");
        plan.add_step(PlanStep::write_file("x.txt", ContentSource::FromStep { step: 0 }));
        assert!(matches!(plan.validate(), Err(Error::PlanningAmbiguous(_))));
        assert!(Plan::new("empty").validate().is_err());
    }

    #[test]
    fn test_plan_advance_and_outcome() {
        let mut plan = two_step();
        let request = TaskRequest::new(AgentId::coordinator(), "x");

        plan.current_mut().unwrap().start();
        plan.current_mut().unwrap().finish(TaskResult::success(
            &request,
            AgentId::research(),
            Payload::text("ok"),
            Duration::ZERO,
        ));
        plan.advance().unwrap();
        assert!(!plan.is_complete());

        plan.current_mut().unwrap().skip("research failed");
        plan.advance().unwrap();
        assert_eq!(plan.state, PlanState::Failed("research failed".into()));
        assert!(plan.advance().is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            StepAction::LookupWeather { location: "Tokyo".into() }.describe(),
            "look up the weather for Tokyo"
        );
    }
}
