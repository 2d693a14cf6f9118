//! Evaluation trigger: scores a completed run's final synthesis against
//! the question/context it answered, after persistence succeeds.
//!
//! Evaluation failures are logged and swallowed — they must never fail an
//! otherwise-successful orchestration run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What gets scored: the original question, the answer produced, and
/// whatever claim context grounds the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub question: String,
    pub answer: String,
    pub context: serde_json::Value,
}

/// Score and commentary returned by an evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: f64,
    pub rationale: String,
}

/// Evaluation service abstraction, dependency-injected so callers can plug
/// in a real grading backend.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, String>;
}

/// No-op evaluator: used when no evaluation backend is configured. Always
/// succeeds with a neutral score, never invoked unless explicitly wired in.
pub struct NoopEvaluator;

#[async_trait]
impl Evaluator for NoopEvaluator {
    async fn evaluate(&self, _request: &EvaluationRequest) -> Result<EvaluationResult, String> {
        Ok(EvaluationResult { score: 0.0, rationale: "no evaluator configured".to_string() })
    }
}

/// `reqwest`-backed evaluator talking JSON REST to a configurable
/// evaluation endpoint.
pub struct ReqwestEvaluator {
    endpoint: String,
    client: reqwest::Client,
}

impl ReqwestEvaluator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Evaluator for ReqwestEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json::<EvaluationResult>()
            .await
            .map_err(|e| e.to_string())
    }
}
