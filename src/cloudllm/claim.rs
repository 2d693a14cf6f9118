//! The `Claim` payload that drives a single orchestration run.

use serde::{Deserialize, Serialize};

/// An insurance claim submitted for assessment.
///
/// Immutable across a run: the orchestrator reads it once to build the
/// supervisor's initial message and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub claim_type: String,
    pub claimant_id: String,
    pub claimant_name: String,
    pub state: String,
    pub policy_number: String,
    pub estimated_damage: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Bearer token for on-behalf-of access, carried unchanged through the
    /// orchestrator to the run driver and never persisted or logged.
    #[serde(skip_serializing, default)]
    pub user_token: Option<String>,
}

/// Validation error for a malformed `Claim`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimValidationError(pub String);

impl std::fmt::Display for ClaimValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid claim: {}", self.0)
    }
}

impl std::error::Error for ClaimValidationError {}

/// The only hard requirement the orchestrator places on a claim: it must
/// carry a non-empty `claim_id`, since that is the key every downstream
/// persisted record is looked up by. Every other field may be empty — a
/// claim with every other field blank still completes a full run.
pub fn validate(claim: &Claim) -> Result<(), ClaimValidationError> {
    if claim.claim_id.trim().is_empty() {
        return Err(ClaimValidationError("claim_id must not be empty".to_string()));
    }
    Ok(())
}

/// Render the claim as the pretty-printed JSON block the supervisor's
/// initial message embeds. The bearer token is never serialized (see
/// `#[serde(skip_serializing)]` above), so this is safe to embed directly
/// into a prompt.
pub fn to_pretty_json(claim: &Claim) -> String {
    serde_json::to_string_pretty(claim).unwrap_or_else(|_| "{}".to_string())
}
