//! Crate-wide error types.
//!
//! One flat enum per logical failure domain, `Display`/`Error` implemented
//! by hand, opaque causes boxed rather than wrapped in a derive macro.

use std::error::Error;
use std::fmt;

/// A specialist name was looked up in the registry and did not resolve.
///
/// Split into two variants — "known but not deployed" and "never
/// registered" — so callers can match on the kind of miss directly instead
/// of substring-matching error text.
#[derive(Debug, Clone)]
pub enum SpecialistLookupError {
    /// The name is a known specialist role but has not been deployed yet.
    NotYetDeployed(String),
    /// The name does not match any specialist this orchestrator knows about.
    Unknown(String),
}

impl fmt::Display for SpecialistLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialistLookupError::NotYetDeployed(name) => {
                write!(f, "{} agent not available", name)
            }
            SpecialistLookupError::Unknown(name) => write!(f, "unknown agent: {}", name),
        }
    }
}

impl Error for SpecialistLookupError {}

/// Top-level error type returned by registry, driver, and orchestrator
/// operations that cannot be absorbed into a string tool response.
///
/// Ordered here from most-local to most-global failure domain.
#[derive(Debug)]
pub enum OrchestrationError {
    /// `AgentRegistry::lookup` missed and the caller is not a tool-call
    /// site that can fall back to an error string (e.g. direct registry
    /// access via `run_single_agent`).
    UnknownAgent(String),
    /// `AgentRegistry::register` found an existing entry with a
    /// different tool signature and `overwrite` was not set.
    RegistrationConflict(String),
    /// The run reached a terminal `failed`/`cancelled`/`expired` state.
    RunFailed(String),
    /// A registered tool function raised while executing.
    ToolInvocation { tool_name: String, message: String },
    /// `max_poll_duration` elapsed before the run reached a terminal
    /// state.
    Timeout,
    /// A write to the execution or token-usage store failed.
    Persistence(String),
    /// The evaluator failed or was unreachable.
    Evaluation(String),
    /// Any other failure, boxed opaquely (transport errors, serialization
    /// errors, etc).
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::UnknownAgent(name) => write!(f, "unknown agent: {}", name),
            OrchestrationError::RegistrationConflict(name) => {
                write!(f, "agent '{}' already registered with a different tool signature", name)
            }
            OrchestrationError::RunFailed(reason) => {
                write!(f, "Agent run failed — {}", reason)
            }
            OrchestrationError::ToolInvocation { tool_name, message } => {
                write!(f, "Error executing {}: {}", tool_name, message)
            }
            OrchestrationError::Timeout => write!(f, "run exceeded max_poll_duration"),
            OrchestrationError::Persistence(msg) => write!(f, "persistence error: {}", msg),
            OrchestrationError::Evaluation(msg) => write!(f, "evaluation error: {}", msg),
            OrchestrationError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl Error for OrchestrationError {}

impl From<SpecialistLookupError> for OrchestrationError {
    fn from(err: SpecialistLookupError) -> Self {
        match err {
            SpecialistLookupError::NotYetDeployed(name) => OrchestrationError::UnknownAgent(name),
            SpecialistLookupError::Unknown(name) => OrchestrationError::UnknownAgent(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failed_message_has_expected_format() {
        let err = OrchestrationError::RunFailed("model overloaded".to_string());
        assert_eq!(err.to_string(), "Agent run failed — model overloaded");
    }

    #[test]
    fn tool_invocation_message_has_expected_format() {
        let err = OrchestrationError::ToolInvocation {
            tool_name: "call_risk_analyst".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Error executing call_risk_analyst: boom");
    }

    #[test]
    fn specialist_lookup_error_display() {
        let err = SpecialistLookupError::NotYetDeployed("Policy Checker".to_string());
        assert_eq!(err.to_string(), "Policy Checker agent not available");
    }
}
