//! The agent registry: the single source of truth for which specialists
//! exist, whether they're deployed, and what tools they expose.
//!
//! A shared, lockable map keyed by name, with a lookup that distinguishes
//! "never heard of it" from "known but not ready".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cloudllm::agent_definition::AgentDefinition;
use crate::cloudllm::agent_service::{AgentServiceClient, RemoteAgentSummary};
use crate::cloudllm::errors::{OrchestrationError, SpecialistLookupError};

/// One registered agent: its definition plus the remote service's id for it,
/// once deployed.
#[derive(Debug, Clone)]
pub struct RegisteredAgent {
    pub definition: AgentDefinition,
    pub remote_agent_id: Option<String>,
}

/// Shared, lockable directory of agents known to this orchestrator.
///
/// Cloning an `AgentRegistry` is cheap — it's a handle around an
/// `Arc<RwLock<_>>`, so one registry can be handed to the supervisor and
/// every specialist adapter without copying its contents.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, RegisteredAgent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { agents: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Register a new agent definition, or replace an existing one's
    /// definition in place.
    ///
    /// If an entry already exists under this name with a different tool
    /// signature, registration fails with `RegistrationConflict` unless
    /// `overwrite` is set. Registration failure is treated as fatal to
    /// startup: callers that need fatal-on-failure semantics should treat an
    /// `Err` from this as unrecoverable rather than retrying.
    pub async fn register(
        &self,
        definition: AgentDefinition,
        overwrite: bool,
    ) -> Result<(), OrchestrationError> {
        let mut agents = self.agents.write().await;

        if let Some(existing) = agents.get(&definition.name) {
            let existing_tools: HashSet<&str> =
                existing.definition.tools.iter().map(|t| t.name.as_str()).collect();
            let new_tools: HashSet<&str> = definition.tools.iter().map(|t| t.name.as_str()).collect();
            if existing_tools != new_tools && !overwrite {
                return Err(OrchestrationError::RegistrationConflict(definition.name));
            }
        }

        agents
            .entry(definition.name.clone())
            .and_modify(|existing| existing.definition = definition.clone())
            .or_insert_with(|| RegisteredAgent { definition, remote_agent_id: None });
        Ok(())
    }

    /// Record the remote service's id for an already-registered agent, once
    /// it has been created or rediscovered there.
    pub async fn set_remote_agent_id(&self, name: &str, remote_agent_id: impl Into<String>) {
        let mut agents = self.agents.write().await;
        if let Some(entry) = agents.get_mut(name) {
            entry.remote_agent_id = Some(remote_agent_id.into());
        }
    }

    /// Look up an agent by name.
    ///
    /// Returns `Unknown` if no agent by this name was ever registered, and
    /// `NotYetDeployed` if it's registered but has no remote agent id yet.
    pub async fn lookup(&self, name: &str) -> Result<RegisteredAgent, SpecialistLookupError> {
        let agents = self.agents.read().await;
        match agents.get(name) {
            None => Err(SpecialistLookupError::Unknown(name.to_string())),
            Some(entry) if entry.remote_agent_id.is_none() => {
                Err(SpecialistLookupError::NotYetDeployed(name.to_string()))
            }
            Some(entry) => Ok(entry.clone()),
        }
    }

    /// True if `name` is registered and has a remote agent id.
    pub async fn is_available(&self, name: &str) -> bool {
        self.lookup(name).await.is_ok()
    }

    /// Fetch a registered agent's definition regardless of deployment
    /// status, for callers (deployment, version bumps) that need it even
    /// when `lookup` would return `NotYetDeployed`.
    pub async fn definition_of(&self, name: &str) -> Option<AgentDefinition> {
        self.agents.read().await.get(name).map(|entry| entry.definition.clone())
    }

    /// All registered agent names, in no particular order.
    pub async fn list(&self) -> Vec<String> {
        self.agents.read().await.keys().cloned().collect()
    }

    /// Rediscover remote agent ids by name: for every locally registered
    /// agent whose remote id is still unknown, look it up in the remote
    /// service's agent list and attach its id if a name match is found and
    /// the listed agent's tools cover at least the locally declared ones.
    ///
    /// Lets a restarted orchestrator reattach to agents a previous process
    /// already created remotely, instead of creating duplicates on every
    /// startup.
    pub async fn rediscover(
        &self,
        client: &dyn AgentServiceClient,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let remote_agents = client.list_agents().await?;
        let by_name: HashMap<&str, &RemoteAgentSummary> =
            remote_agents.iter().map(|a| (a.name.as_str(), a)).collect();

        let mut agents = self.agents.write().await;
        let mut rediscovered = 0;
        for (name, entry) in agents.iter_mut() {
            if entry.remote_agent_id.is_some() {
                continue;
            }
            if let Some(remote) = by_name.get(name.as_str()) {
                let declared: std::collections::HashSet<&str> =
                    entry.definition.tools.iter().map(|t| t.name.as_str()).collect();
                let available: std::collections::HashSet<&str> =
                    remote.tool_names.iter().map(|t| t.as_str()).collect();
                if declared.is_subset(&available) {
                    entry.remote_agent_id = Some(remote.id.clone());
                    rediscovered += 1;
                }
            }
        }
        Ok(rediscovered)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agent_definition::ToolDescriptor;

    fn sample_definition(name: &str) -> AgentDefinition {
        AgentDefinition::new(name, "1.0.0", "instructions", "gpt-4o-mini")
    }

    #[tokio::test]
    async fn lookup_unknown_agent_returns_unknown_variant() {
        let registry = AgentRegistry::new();
        let err = registry.lookup("risk_analyst").await.unwrap_err();
        assert!(matches!(err, SpecialistLookupError::Unknown(_)));
    }

    #[tokio::test]
    async fn lookup_registered_but_undeployed_agent_returns_not_yet_deployed() {
        let registry = AgentRegistry::new();
        registry.register(sample_definition("risk_analyst"), false).await.unwrap();
        let err = registry.lookup("risk_analyst").await.unwrap_err();
        assert!(matches!(err, SpecialistLookupError::NotYetDeployed(_)));
    }

    #[tokio::test]
    async fn lookup_succeeds_once_remote_id_is_set() {
        let registry = AgentRegistry::new();
        registry.register(sample_definition("risk_analyst"), false).await.unwrap();
        registry.set_remote_agent_id("risk_analyst", "remote-123").await;
        let entry = registry.lookup("risk_analyst").await.unwrap();
        assert_eq!(entry.remote_agent_id.as_deref(), Some("remote-123"));
        assert!(registry.is_available("risk_analyst").await);
    }

    #[tokio::test]
    async fn list_returns_all_registered_names() {
        let registry = AgentRegistry::new();
        registry.register(sample_definition("risk_analyst"), false).await.unwrap();
        registry.register(sample_definition("policy_checker"), false).await.unwrap();
        let mut names = registry.list().await;
        names.sort();
        assert_eq!(names, vec!["policy_checker".to_string(), "risk_analyst".to_string()]);
    }

    #[tokio::test]
    async fn register_without_overwrite_rejects_conflicting_tool_signature() {
        let registry = AgentRegistry::new();
        registry.register(sample_definition("risk_analyst"), false).await.unwrap();

        let mut changed = sample_definition("risk_analyst");
        changed.tools = vec![ToolDescriptor::new("call_risk_analyst", "desc", serde_json::json!({}))];

        let err = registry.register(changed, false).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RegistrationConflict(name) if name == "risk_analyst"));
    }

    #[tokio::test]
    async fn register_with_overwrite_replaces_conflicting_definition() {
        let registry = AgentRegistry::new();
        registry.register(sample_definition("risk_analyst"), false).await.unwrap();

        let mut changed = sample_definition("risk_analyst");
        changed.tools = vec![ToolDescriptor::new("call_risk_analyst", "desc", serde_json::json!({}))];
        changed.version = "2.0.0".to_string();

        registry.register(changed, true).await.unwrap();
        let definition = registry.definition_of("risk_analyst").await.unwrap();
        assert_eq!(definition.version, "2.0.0");
        assert_eq!(definition.tools.len(), 1);
    }

    #[tokio::test]
    async fn register_same_tool_signature_does_not_conflict_without_overwrite() {
        let registry = AgentRegistry::new();
        registry.register(sample_definition("risk_analyst"), false).await.unwrap();

        let mut updated = sample_definition("risk_analyst");
        updated.version = "1.1.0".to_string();
        registry.register(updated, false).await.unwrap();

        let definition = registry.definition_of("risk_analyst").await.unwrap();
        assert_eq!(definition.version, "1.1.0");
    }
}
