//! Agent metadata: the record the registry hands out for each specialist
//! and supervisor.
//!
//! Tools are declared as a plain descriptor struct rather than through any
//! decorator or annotation mechanism.

use serde::{Deserialize, Serialize};

/// Describes one tool the agent may call, independent of any particular
/// invocation mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
        }
    }
}

/// A single entry in an `AgentDefinition`'s append-only version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedDefinition {
    pub version: String,
    pub instructions: String,
    pub model_deployment: String,
    pub temperature: f32,
}

/// The deployable identity of an agent: what the remote service calls it,
/// what prompt it runs with, and which tools it is allowed to invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub version: String,
    pub instructions: String,
    pub model_deployment: String,
    pub temperature: f32,
    pub tools: Vec<ToolDescriptor>,
    pub is_active: bool,
    pub version_history: Vec<VersionedDefinition>,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        instructions: impl Into<String>,
        model_deployment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            instructions: instructions.into(),
            model_deployment: model_deployment.into(),
            temperature: 0.7,
            tools: Vec::new(),
            is_active: true,
            version_history: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Push the current version into `version_history` and replace it with
    /// a new one. This is the *only* mutation path for `version`/
    /// `instructions`/`model_deployment`/`temperature`.
    ///
    /// Keeps `version_history` strictly chronological
    /// and the current `version` never appears in its own history, since the
    /// old version is moved out before the new one is installed.
    pub fn bump_version(
        &mut self,
        new_version: impl Into<String>,
        new_instructions: impl Into<String>,
        new_model_deployment: impl Into<String>,
        new_temperature: f32,
    ) {
        self.version_history.push(VersionedDefinition {
            version: std::mem::take(&mut self.version),
            instructions: std::mem::take(&mut self.instructions),
            model_deployment: std::mem::take(&mut self.model_deployment),
            temperature: self.temperature,
        });
        self.version = new_version.into();
        self.instructions = new_instructions.into();
        self.model_deployment = new_model_deployment.into();
        self.temperature = new_temperature;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_version_preserves_prior_versions_in_order() {
        let mut def = AgentDefinition::new("risk_analyst", "1.0.0", "v1 prompt", "gpt-4o-mini");
        def.bump_version("1.1.0", "v1.1 prompt", "gpt-4o-mini", 0.5);
        def.bump_version("2.0.0", "v2 prompt", "gpt-4o", 0.3);

        assert_eq!(def.version, "2.0.0");
        assert_eq!(def.version_history.len(), 2);
        assert_eq!(def.version_history[0].version, "1.0.0");
        assert_eq!(def.version_history[1].version, "1.1.0");
        // current version never appears in its own history
        assert!(def.version_history.iter().all(|v| v.version != def.version));
    }
}
