//! Runtime configuration.
//!
//! A handful of environment-driven knobs this orchestrator needs — the
//! remote service endpoint, default model deployment, poll cadence, and the
//! on-disk execution-store path. No TOML or YAML parsing is introduced here;
//! everything comes from plain environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Global settings for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the remote agent/thread/run service.
    pub agent_service_endpoint: String,
    /// Default model deployment name for agents that don't override it.
    pub default_model_deployment: String,
    /// Interval between `get_run` polls while a run is in progress.
    pub poll_interval: Duration,
    /// Wall-clock budget for a single run before it's treated as timed out.
    pub max_poll_duration: Duration,
    /// Where the execution store keeps its SQLite database, if persistence
    /// is enabled.
    pub execution_store_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_service_endpoint: "http://localhost:8080".to_string(),
            default_model_deployment: "gpt-4o-mini".to_string(),
            poll_interval: Duration::from_millis(500),
            max_poll_duration: Duration::from_secs(120),
            execution_store_path: PathBuf::from("claims_orchestrator.db"),
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to
    /// `Settings::default()` for anything unset.
    ///
    /// Recognized variables: `AGENT_SERVICE_ENDPOINT`,
    /// `DEFAULT_MODEL_DEPLOYMENT`, `POLL_INTERVAL_MS`,
    /// `MAX_POLL_DURATION_SECS`, `EXECUTION_STORE_PATH`.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let poll_interval = env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let max_poll_duration = env::var("MAX_POLL_DURATION_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_poll_duration);

        Self {
            agent_service_endpoint: env::var("AGENT_SERVICE_ENDPOINT")
                .unwrap_or(defaults.agent_service_endpoint),
            default_model_deployment: env::var("DEFAULT_MODEL_DEPLOYMENT")
                .unwrap_or(defaults.default_model_deployment),
            poll_interval,
            max_poll_duration,
            execution_store_path: env::var("EXECUTION_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.execution_store_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_sane() {
        let settings = Settings::default();
        assert!(settings.max_poll_duration > settings.poll_interval);
        assert!(!settings.agent_service_endpoint.is_empty());
    }
}
