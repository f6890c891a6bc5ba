//! Capability to agent mapping, fixed at startup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::task::{AgentId, Capability};

/// Routes capability tags to agent handles and tracks per-agent usage.
#[derive(Default)]
pub struct AgentRouter {
    /// One agent per capability.
    agents: BTreeMap<Capability, Arc<dyn Agent>>,
    /// Usage statistics.
    stats: HashMap<AgentId, AgentStats>,
}

impl AgentRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` under its capability.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let capability = agent.capability();
        if let Some(existing) = self.agents.get(&capability) {
            return Err(Error::Config(format!(
                "capability {} already served by {}",
                capability,
                existing.id()
            )));
        }
        self.agents.insert(capability, agent);
        Ok(())
    }

    /// Agent registered for `capability`.
    pub fn resolve(&self, capability: Capability) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(&capability)
            .cloned()
            .ok_or_else(|| Error::PlanningAmbiguous(format!("no agent provides {}", capability)))
    }

    /// Whether some agent provides `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.agents.contains_key(&capability)
    }

    /// Registered capabilities with their agent ids, in capability order.
    pub fn registrations(&self) -> Vec<(Capability, AgentId)> {
        self.agents
            .iter()
            .map(|(c, a)| (*c, a.id().clone()))
            .collect()
    }

    /// Record a successful task.
    pub fn record_success(&mut self, agent: &AgentId, latency: Duration) {
        let stats = self.stats.entry(agent.clone()).or_default();
        stats.total_requests += 1;
        stats.successful_requests += 1;
        stats.record_latency(latency);
    }

    /// Record a failed task.
    pub fn record_failure(&mut self, agent: &AgentId, latency: Duration) {
        let stats = self.stats.entry(agent.clone()).or_default();
        stats.total_requests += 1;
        stats.failed_requests += 1;
        stats.record_latency(latency);
    }

    /// Get agent statistics.
    pub fn get_stats(&self) -> HashMap<AgentId, AgentStats> {
        self.stats.clone()
    }
}

/// Usage statistics for an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    /// Total tasks handled.
    pub total_requests: u64,
    /// Successful tasks.
    pub successful_requests: u64,
    /// Failed tasks.
    pub failed_requests: u64,
    /// Exponential moving average of task latency.
    pub avg_latency_ms: Option<u64>,
}

impl AgentStats {
    fn record_latency(&mut self, latency: Duration) {
        let ms = latency.as_millis() as f64;
        self.avg_latency_ms = Some(match self.avg_latency_ms {
            Some(avg) => (avg as f64 * 0.9 + ms * 0.1) as u64,
            None => ms as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Payload, TaskRequest, TaskResult};

    struct Fixed(AgentId, Capability);

    #[async_trait::async_trait]
    impl Agent for Fixed {
        fn id(&self) -> &AgentId {
            &self.0
        }

        fn capability(&self) -> Capability {
            self.1
        }

        async fn handle(&self, request: &TaskRequest) -> TaskResult {
            TaskResult::success(request, self.0.clone(), Payload::Empty, Duration::ZERO)
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut router = AgentRouter::new();
        router
            .register(Arc::new(Fixed(AgentId::research(), Capability::Research)))
            .unwrap();

        assert_eq!(
            router.resolve(Capability::Research).unwrap().id(),
            &AgentId::research()
        );
        assert!(!router.supports(Capability::Execute));
        assert!(matches!(
            router.resolve(Capability::Execute),
            Err(Error::PlanningAmbiguous(_))
        ));
    }

    #[test]
    fn test_duplicate_capability_rejected() {
        let mut router = AgentRouter::new();
        router
            .register(Arc::new(Fixed(AgentId::research(), Capability::Research)))
            .unwrap();
        let err = router
            .register(Arc::new(Fixed(AgentId::new("other"), Capability::Research)))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_stats() {
        let mut router = AgentRouter::new();
        let id = AgentId::executor();
        router.record_success(&id, Duration::from_millis(100));
        router.record_failure(&id, Duration::from_millis(200));

        let stats = &router.get_stats()[&id];
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.avg_latency_ms, Some(110));
    }
}
