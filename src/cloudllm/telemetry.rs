//! Token usage accounting, execution-record assembly, and persistence.
//!
//! Reconciles usage from two sources (the run's own reported totals and a
//! cross-cutting observer pattern for span-derived usage), computes cost
//! from a fixed per-model pricing table, and persists execution records
//! through a pluggable store with both an in-memory and a `rusqlite`-backed
//! implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::cloudllm::agent_definition::AgentDefinition;

/// Per-1000-token USD pricing, `(prompt, completion)`. Unknown model
/// identifiers fall back to the `gpt-4o-mini` row with a warning log.
const PRICING_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o", 0.005, 0.015),
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4.1-mini", 0.00015, 0.0006),
    ("gpt-4", 0.03, 0.06),
    ("gpt-35-turbo", 0.0015, 0.002),
    ("text-embedding-3-small", 0.00002, 0.0),
    ("text-embedding-3-large", 0.00013, 0.0),
    ("text-embedding-ada-002", 0.0001, 0.0),
];

const FALLBACK_PRICING_KEY: &str = "gpt-4o-mini";

fn pricing_for(model: &str) -> (f64, f64) {
    match PRICING_TABLE.iter().find(|(key, _, _)| *key == model) {
        Some((_, prompt, completion)) => (*prompt, *completion),
        None => {
            log::warn!("unknown model '{}' for pricing, defaulting to {}", model, FALLBACK_PRICING_KEY);
            let (_, prompt, completion) = PRICING_TABLE
                .iter()
                .find(|(key, _, _)| *key == FALLBACK_PRICING_KEY)
                .expect("fallback pricing row always present");
            (*prompt, *completion)
        }
    }
}

fn compute_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let (prompt_rate, completion_rate) = pricing_for(model);
    (prompt_tokens as f64 / 1000.0) * prompt_rate + (completion_tokens as f64 / 1000.0) * completion_rate
}

/// One recorded unit of token usage, append-only once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageRecord {
    pub claim_id: String,
    pub execution_id: String,
    pub model: String,
    pub model_deployment: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub agent_type: String,
    pub operation_type: String,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated view over a claim's token usage, as returned by
/// `get_claim_token_summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimTokenSummary {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_agent: HashMap<String, u64>,
    pub by_operation: HashMap<String, u64>,
    pub total_calls: u64,
}

/// Per-workflow accounting context: `{claim_id, execution_id}` plus the
/// accumulated records for the run it belongs to. Owned exclusively by one
/// `process_claim` call — concurrent calls never share a context, so no
/// internal locking is needed here (the shared state lives in the tracker
/// that owns many contexts, not in the context itself).
pub struct TelemetryContext {
    pub claim_id: String,
    pub execution_id: String,
    records: Vec<TokenUsageRecord>,
}

impl TelemetryContext {
    pub fn new(claim_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self { claim_id: claim_id.into(), execution_id: execution_id.into(), records: Vec::new() }
    }

    /// Record one usage observation, computing its cost from the pricing
    /// table.
    pub fn record(
        &mut self,
        model: &str,
        model_deployment: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        agent_type: &str,
        operation_type: &str,
    ) {
        let cost = compute_cost(model, prompt_tokens, completion_tokens);
        self.records.push(TokenUsageRecord {
            claim_id: self.claim_id.clone(),
            execution_id: self.execution_id.clone(),
            model: model.to_string(),
            model_deployment: model_deployment.to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost,
            agent_type: agent_type.to_string(),
            operation_type: operation_type.to_string(),
            recorded_at: Utc::now(),
        });
    }

    /// Opt-in fallback for callers with no real usage figures from the run
    /// driver — an
    /// explicit estimate, never invoked automatically. Estimated at a flat
    /// four characters per token, a common rough ratio for English prose.
    pub fn estimate_tokens(text: &str) -> u64 {
        (text.chars().count() as u64 / 4).max(1)
    }

    pub fn records(&self) -> &[TokenUsageRecord] {
        &self.records
    }

    pub fn total_tokens(&self) -> u64 {
        self.records.iter().map(|r| r.total_tokens).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.records.iter().map(|r| r.cost).sum()
    }
}

/// Tracks token usage across claims and exposes the per-claim summary view.
///
/// Shared as a single instance per orchestrator; internally locked since
/// multiple concurrent `process_claim` calls each finalize their own
/// `TelemetryContext` into it.
pub struct TokenUsageTracker {
    records_by_claim: Mutex<HashMap<String, Vec<TokenUsageRecord>>>,
}

impl TokenUsageTracker {
    pub fn new() -> Self {
        Self { records_by_claim: Mutex::new(HashMap::new()) }
    }

    /// Fold a finished context's records into the tracker's per-claim
    /// history.
    pub fn finalize(&self, context: TelemetryContext) {
        let mut records = self.records_by_claim.lock().unwrap();
        records.entry(context.claim_id.clone()).or_default().extend(context.records);
    }

    pub fn get_claim_token_summary(&self, claim_id: &str) -> ClaimTokenSummary {
        let records = self.records_by_claim.lock().unwrap();
        let mut summary = ClaimTokenSummary::default();
        if let Some(entries) = records.get(claim_id) {
            summary.total_calls = entries.len() as u64;
            for record in entries {
                summary.total_tokens += record.total_tokens;
                summary.total_cost += record.cost;
                *summary.by_agent.entry(record.agent_type.clone()).or_insert(0) += record.total_tokens;
                *summary.by_operation.entry(record.operation_type.clone()).or_insert(0) += record.total_tokens;
            }
        }
        summary
    }

    /// All records across every claim, optionally filtered by agent type and
    /// recency, for cross-claim analytics (`get_token_analytics`).
    pub fn analytics(&self, agent_type: Option<&str>, days_back: i64) -> ClaimTokenSummary {
        let cutoff = Utc::now() - chrono::Duration::days(days_back);
        let records = self.records_by_claim.lock().unwrap();
        let mut summary = ClaimTokenSummary::default();
        for entries in records.values() {
            for record in entries {
                if record.recorded_at < cutoff {
                    continue;
                }
                if let Some(wanted) = agent_type {
                    if record.agent_type != wanted {
                        continue;
                    }
                }
                summary.total_calls += 1;
                summary.total_tokens += record.total_tokens;
                summary.total_cost += record.cost;
                *summary.by_agent.entry(record.agent_type.clone()).or_insert(0) += record.total_tokens;
                *summary.by_operation.entry(record.operation_type.clone()).or_insert(0) += record.total_tokens;
            }
        }
        summary
    }
}

impl Default for TokenUsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer attached to the telemetry fabric to reconcile usage figures
/// reported via cross-cutting spans (the LLM client's own
/// `prompt_tokens`/`completion_tokens` attributes) rather than the run
/// driver's directly-returned `run.usage`. A plain trait any span source
/// can implement against, rather than tying this crate to one tracing
/// backend's span type.
pub trait TelemetryObserver: Send + Sync {
    fn on_span_usage(&self, context: &mut TelemetryContext, agent_type: &str, operation_type: &str, model: &str, model_deployment: &str, prompt_tokens: u64, completion_tokens: u64) {
        context.record(model, model_deployment, prompt_tokens, completion_tokens, agent_type, operation_type);
    }
}

/// Default observer: forwards every span observation straight into the
/// context with no filtering.
pub struct PassthroughTelemetryObserver;

impl TelemetryObserver for PassthroughTelemetryObserver {}

/// One step of an execution: one specialist agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStepExecution {
    pub agent_type: String,
    pub input_data: serde_json::Value,
    pub output_data: String,
    pub token_usage: TokenUsageSnapshot,
}

/// A minimal per-step usage snapshot, distinct from the append-only
/// `TokenUsageRecord` log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Terminal status of an `AgentExecution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// The persisted record of one `process_claim` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    pub execution_id: String,
    pub claim_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub agent_steps: Vec<AgentStepExecution>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub agents_invoked: Vec<String>,
    pub final_result: Option<String>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

/// The execution/telemetry store, dependency-injected so callers can plug
/// in a real database instead of the in-memory default.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save_execution(&self, execution: &AgentExecution) -> Result<(), String>;
    async fn save_token_usage(&self, record: &TokenUsageRecord) -> Result<(), String>;
    async fn get_execution(&self, execution_id: &str) -> Result<Option<AgentExecution>, String>;
    async fn list_executions(&self, claim_id: &str) -> Result<Vec<AgentExecution>, String>;
    async fn get_claim_history(&self, claim_id: &str) -> Result<Vec<AgentExecution>, String> {
        self.list_executions(claim_id).await
    }
    async fn save_agent_definition(&self, definition: &AgentDefinition) -> Result<(), String>;
    async fn get_agent_definition(&self, name: &str) -> Result<Option<AgentDefinition>, String>;
    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>, String>;
}

/// Default in-memory implementation, used when no durable store is
/// configured and in tests.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: Mutex<Vec<AgentExecution>>,
    token_usage: Mutex<Vec<TokenUsageRecord>>,
    agent_definitions: Mutex<HashMap<String, AgentDefinition>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save_execution(&self, execution: &AgentExecution) -> Result<(), String> {
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }

    async fn save_token_usage(&self, record: &TokenUsageRecord) -> Result<(), String> {
        self.token_usage.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<AgentExecution>, String> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.execution_id == execution_id)
            .cloned())
    }

    async fn list_executions(&self, claim_id: &str) -> Result<Vec<AgentExecution>, String> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.claim_id == claim_id)
            .cloned()
            .collect())
    }

    async fn save_agent_definition(&self, definition: &AgentDefinition) -> Result<(), String> {
        self.agent_definitions
            .lock()
            .unwrap()
            .insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    async fn get_agent_definition(&self, name: &str) -> Result<Option<AgentDefinition>, String> {
        Ok(self.agent_definitions.lock().unwrap().get(name).cloned())
    }

    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>, String> {
        Ok(self.agent_definitions.lock().unwrap().values().cloned().collect())
    }
}

/// On-disk store backed by SQLite, for callers that need executions and
/// token usage to survive a process restart.
///
/// A plain `rusqlite::Connection` behind a mutex, schema created eagerly on
/// open, rows serialized as JSON text columns rather than modeled
/// relationally — this store has no query surface beyond lookup-by-id/
/// claim, so a normal-form schema buys nothing here.
pub struct SqliteExecutionStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteExecutionStore {
    pub fn open(path: &std::path::Path) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.lock().unwrap().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                claim_id TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_executions_claim ON executions(claim_id);

            CREATE TABLE IF NOT EXISTS token_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                claim_id TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_token_usage_claim ON token_usage(claim_id);

            CREATE TABLE IF NOT EXISTS agent_definitions (
                name TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            "#,
        )
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn save_execution(&self, execution: &AgentExecution) -> Result<(), String> {
        let payload = serde_json::to_string(execution).map_err(|e| e.to_string())?;
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO executions (execution_id, claim_id, payload) VALUES (?1, ?2, ?3)
                 ON CONFLICT(execution_id) DO UPDATE SET payload = ?3",
                rusqlite::params![execution.execution_id, execution.claim_id, payload],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn save_token_usage(&self, record: &TokenUsageRecord) -> Result<(), String> {
        let payload = serde_json::to_string(record).map_err(|e| e.to_string())?;
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO token_usage (claim_id, payload) VALUES (?1, ?2)",
                rusqlite::params![record.claim_id, payload],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<AgentExecution>, String> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM executions WHERE execution_id = ?1",
                [execution_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.to_string())?;
        match payload {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| e.to_string()),
            None => Ok(None),
        }
    }

    async fn list_executions(&self, claim_id: &str) -> Result<Vec<AgentExecution>, String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT payload FROM executions WHERE claim_id = ?1")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([claim_id], |row| row.get::<_, String>(0))
            .map_err(|e| e.to_string())?;
        let mut executions = Vec::new();
        for row in rows {
            let json = row.map_err(|e| e.to_string())?;
            executions.push(serde_json::from_str(&json).map_err(|e| e.to_string())?);
        }
        Ok(executions)
    }

    async fn save_agent_definition(&self, definition: &AgentDefinition) -> Result<(), String> {
        let payload = serde_json::to_string(definition).map_err(|e| e.to_string())?;
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO agent_definitions (name, payload) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET payload = ?2",
                rusqlite::params![definition.name, payload],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn get_agent_definition(&self, name: &str) -> Result<Option<AgentDefinition>, String> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM agent_definitions WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| e.to_string())?;
        match payload {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| e.to_string()),
            None => Ok(None),
        }
    }

    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>, String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload FROM agent_definitions").map_err(|e| e.to_string())?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(|e| e.to_string())?;
        let mut definitions = Vec::new();
        for row in rows {
            let json = row.map_err(|e| e.to_string())?;
            definitions.push(serde_json::from_str(&json).map_err(|e| e.to_string())?);
        }
        Ok(definitions)
    }
}
