//! The supervisor orchestrator — the crate's main entry point.
//!
//! Registers the supervisor and specialist agents, runs a claim through the
//! chosen workflow, and assembles the resulting trace and persisted
//! execution record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cloudllm::agent_definition::AgentDefinition;
use crate::cloudllm::agent_service::{AgentServiceClient, AuthMode, Message, RunUsage};
use crate::cloudllm::claim::{self, Claim};
use crate::cloudllm::config::Settings;
use crate::cloudllm::errors::OrchestrationError;
use crate::cloudllm::evaluation::{EvaluationRequest, EvaluationResult, Evaluator, NoopEvaluator};
use crate::cloudllm::registry::AgentRegistry;
use crate::cloudllm::specialists::{
    AdapterContext, ClaimAssessorAdapter, ClaimsDataAnalystAdapter, CommunicationAgentAdapter,
    PolicyCheckerAdapter, RiskAnalystAdapter, SecondaryAnalyticsSource,
};
use crate::cloudllm::telemetry::{
    AgentExecution, AgentStepExecution, ClaimTokenSummary, ExecutionStatus, ExecutionStore,
    TelemetryContext, TokenUsageSnapshot, TokenUsageTracker,
};
use crate::cloudllm::thread_run_driver::{RunRequest, ThreadRunDriver, ToolFunction};
use crate::cloudllm::trace::{build_trace, TraceChunk, TraceSource};

pub const CLAIM_ASSESSOR: &str = "claim_assessor";
pub const POLICY_CHECKER: &str = "policy_checker";
pub const RISK_ANALYST: &str = "risk_analyst";
pub const COMMUNICATION_AGENT: &str = "communication_agent";
pub const CLAIMS_DATA_ANALYST: &str = "claims_data_analyst";
pub const SUPERVISOR: &str = "supervisor";

/// Which specialist sequence the supervisor's instructions describe. The
/// instruction prompt is the only place workflow order lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowType {
    /// `claim_assessor → policy_checker → risk_analyst →
    /// communication_agent → synthesis`.
    Standard,
    /// `claim_assessor → policy_checker → claims_data_analyst →
    /// risk_analyst → communication_agent → synthesis`.
    WithAnalytics,
}

const SUPERVISOR_INSTRUCTIONS_STANDARD: &str = "You are a senior claims manager supervising a team of insurance claim processing specialists. Your role is to coordinate your team's analysis and provide comprehensive advisory recommendations to support human decision-makers.

Your team consists of specialized agents that you can call using your tools:
1. call_claim_assessor - Evaluates damage validity and cost assessment
2. call_policy_checker - Verifies coverage and policy terms
3. call_risk_analyst - Analyzes fraud risk and claimant history
4. call_communication_agent - Drafts customer emails for missing information

WORKFLOW PROCESS:
1. FIRST: Call the Claim Assessor (call_claim_assessor) with the full claim data
2. THEN: Call the Policy Checker (call_policy_checker) with the full claim data
3. THEN: Call the Risk Analyst (call_risk_analyst) with the full claim data
4. Call the Communication Agent (call_communication_agent) to draft a customer email
5. FINALLY: Compile a comprehensive assessment summary for human review

IMPORTANT: You MUST call all three primary specialists before providing your final assessment.

End with a structured assessment in this format:

ASSESSMENT_COMPLETE

PRIMARY RECOMMENDATION: [APPROVE/DENY/INVESTIGATE] (Confidence: HIGH/MEDIUM/LOW)
SUPPORTING FACTORS:
RISK FACTORS:
INFORMATION GAPS:
RECOMMENDED NEXT STEPS:";

const SUPERVISOR_INSTRUCTIONS_WITH_ANALYTICS: &str = "You are a senior claims manager supervising a team of insurance claim processing specialists. Your role is to coordinate your team's analysis and provide comprehensive advisory recommendations to support human decision-makers.

Your team consists of specialized agents that you can call using your tools:
1. call_claim_assessor - Evaluates damage validity and cost assessment
2. call_policy_checker - Verifies coverage and policy terms
3. call_claims_data_analyst - Queries enterprise data (historical claims, statistics, fraud patterns)
4. call_risk_analyst - Analyzes fraud risk and claimant history
5. call_communication_agent - Drafts customer emails for missing information

WORKFLOW PROCESS:
1. FIRST: Call the Claim Assessor (call_claim_assessor) with the full claim data
2. THEN: Call the Policy Checker (call_policy_checker) with the full claim data
3. THEN: Call the Claims Data Analyst (call_claims_data_analyst) with the full claim data
4. THEN: Call the Risk Analyst (call_risk_analyst) with the full claim data
5. Call the Communication Agent (call_communication_agent) to draft a customer email
6. FINALLY: Compile a comprehensive assessment summary for human review

IMPORTANT: Always pass the COMPLETE original claim JSON to each tool.

End with a structured assessment in this format:

ASSESSMENT_COMPLETE

PRIMARY RECOMMENDATION: [APPROVE/DENY/INVESTIGATE] (Confidence: HIGH/MEDIUM/LOW)
SUPPORTING FACTORS:
RISK FACTORS:
ENTERPRISE DATA INSIGHTS:
INFORMATION GAPS:
RECOMMENDED NEXT STEPS:";

/// Final result handed back to callers of `process_claim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub execution_id: String,
    pub final_decision: Option<String>,
    pub conversation_chronological: Vec<TraceChunk>,
    pub evaluation_results: Option<EvaluationResult>,
}

/// Dependency-injected handles constructed once and held for the process
/// lifetime, rather than reached for as globals or singletons.
pub struct SupervisorOrchestrator {
    registry: AgentRegistry,
    client: Arc<dyn AgentServiceClient>,
    driver: Arc<ThreadRunDriver>,
    execution_store: Arc<dyn ExecutionStore>,
    token_tracker: Arc<TokenUsageTracker>,
    evaluator: Arc<dyn Evaluator>,
    secondary_source: Option<Arc<dyn SecondaryAnalyticsSource>>,
    settings: Settings,
    analytics_enabled: AtomicBool,
}

impl SupervisorOrchestrator {
    /// Build an orchestrator with a given default model deployment and
    /// `Settings::default()` timing knobs. Use `with_settings` for full
    /// control over poll cadence and timeout.
    pub fn new(
        client: Arc<dyn AgentServiceClient>,
        execution_store: Arc<dyn ExecutionStore>,
        default_model_deployment: impl Into<String>,
    ) -> Self {
        let mut settings = Settings::default();
        settings.default_model_deployment = default_model_deployment.into();
        Self::with_settings(client, execution_store, settings)
    }

    pub fn with_settings(
        client: Arc<dyn AgentServiceClient>,
        execution_store: Arc<dyn ExecutionStore>,
        settings: Settings,
    ) -> Self {
        let driver = Arc::new(ThreadRunDriver::new(client.clone()));
        Self {
            registry: AgentRegistry::new(),
            client,
            driver,
            execution_store,
            token_tracker: Arc::new(TokenUsageTracker::new()),
            evaluator: Arc::new(NoopEvaluator),
            secondary_source: None,
            settings,
            analytics_enabled: AtomicBool::new(false),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_secondary_source(mut self, source: Arc<dyn SecondaryAnalyticsSource>) -> Self {
        self.secondary_source = Some(source);
        self
    }

    fn tune_timing(&self, request: RunRequest) -> RunRequest {
        let mut request = request;
        request.poll_interval = self.settings.poll_interval;
        request.max_poll_duration = self.settings.max_poll_duration;
        request
    }

    pub fn with_analytics_enabled(self, enabled: bool) -> Self {
        self.analytics_enabled.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn set_analytics_enabled(&self, enabled: bool) {
        self.analytics_enabled.store(enabled, Ordering::SeqCst);
    }

    fn workflow_type(&self) -> WorkflowType {
        if self.analytics_enabled.load(Ordering::SeqCst) {
            WorkflowType::WithAnalytics
        } else {
            WorkflowType::Standard
        }
    }

    /// Register the supervisor and every specialist's `AgentDefinition`,
    /// then rediscover or create their remote agents. Registration failures
    /// here are fatal — the caller should abort startup rather than run
    /// with an incomplete registry.
    pub async fn initialize(&self, specialists: Vec<AgentDefinition>) -> Result<(), OrchestrationError> {
        for definition in specialists {
            self.registry.register(definition, false).await?;
        }

        let rediscovered = self
            .registry
            .rediscover(self.client.as_ref())
            .await
            .map_err(OrchestrationError::Other)?;
        log::info!("rediscovered {} existing remote agents", rediscovered);

        // Create a remote agent for anything rediscovery didn't match.
        for name in self.registry.list().await {
            if self.registry.is_available(&name).await {
                continue;
            }
            self.deploy_one(&name).await?;
        }

        Ok(())
    }

    async fn deploy_one(&self, name: &str) -> Result<(), OrchestrationError> {
        let definition = self
            .registry
            .definition_of(name)
            .await
            .ok_or_else(|| OrchestrationError::UnknownAgent(name.to_string()))?;

        let remote_id = self
            .client
            .create_agent(&definition.name, &definition.model_deployment, &definition.instructions, &definition.tools)
            .await
            .map_err(OrchestrationError::Other)?;

        self.registry.set_remote_agent_id(name, remote_id).await;
        Ok(())
    }

    fn build_specialist_functions(
        &self,
        user_token: Option<String>,
    ) -> HashMap<String, Arc<dyn ToolFunction>> {
        let mut functions: HashMap<String, Arc<dyn ToolFunction>> = HashMap::new();

        let ctx = |registry: AgentRegistry| AdapterContext {
            registry,
            driver: self.driver.clone(),
            user_token: user_token.clone(),
        };

        functions.insert(
            format!("call_{}", CLAIM_ASSESSOR),
            Arc::new(ClaimAssessorAdapter(ctx(self.registry.clone()))),
        );
        functions.insert(
            format!("call_{}", POLICY_CHECKER),
            Arc::new(PolicyCheckerAdapter(ctx(self.registry.clone()))),
        );
        functions.insert(
            format!("call_{}", RISK_ANALYST),
            Arc::new(RiskAnalystAdapter(ctx(self.registry.clone()))),
        );
        functions.insert(
            format!("call_{}", COMMUNICATION_AGENT),
            Arc::new(CommunicationAgentAdapter(ctx(self.registry.clone()))),
        );

        if self.analytics_enabled.load(Ordering::SeqCst) {
            functions.insert(
                format!("call_{}", CLAIMS_DATA_ANALYST),
                Arc::new(ClaimsDataAnalystAdapter {
                    context: ctx(self.registry.clone()),
                    secondary_source: self.secondary_source.clone(),
                }),
            );
        }

        functions
    }

    /// Run a claim through the full supervisor workflow.
    pub async fn process_claim(&self, claim: &Claim) -> Result<ClaimOutcome, OrchestrationError> {
        claim::validate(claim).map_err(|e| OrchestrationError::Other(Box::new(e)))?;

        let workflow = self.workflow_type();
        let instructions = match workflow {
            WorkflowType::Standard => SUPERVISOR_INSTRUCTIONS_STANDARD,
            WorkflowType::WithAnalytics => SUPERVISOR_INSTRUCTIONS_WITH_ANALYTICS,
        };

        if !self.registry.is_available(SUPERVISOR).await {
            self.registry
                .register(
                    AgentDefinition::new(
                        SUPERVISOR,
                        "1.0.0",
                        instructions,
                        self.settings.default_model_deployment.clone(),
                    ),
                    false,
                )
                .await?;
            self.deploy_one(SUPERVISOR).await?;
        }

        let supervisor_entry = self.registry.lookup(SUPERVISOR).await.map_err(OrchestrationError::from)?;
        let remote_supervisor_id = supervisor_entry.remote_agent_id.expect("just ensured deployed");

        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut telemetry = TelemetryContext::new(claim.claim_id.clone(), execution_id.clone());

        let workflow_steps = match workflow {
            WorkflowType::Standard => "claim_assessor → policy_checker → risk_analyst → communication_agent → synthesis",
            WorkflowType::WithAnalytics => "claim_assessor → policy_checker → claims_data_analyst → risk_analyst → communication_agent → synthesis",
        };
        let user_message = format!(
            "Please process the following insurance claim through your specialist team.\n\n{}\n\nWorkflow: call every specialist in order ({}), with no shortcuts, then produce your final synthesis.",
            claim::to_pretty_json(claim),
            workflow_steps,
        );

        let functions = self.build_specialist_functions(claim.user_token.clone());

        let auth = match &claim.user_token {
            Some(token) => AuthMode::OnBehalfOf(token.clone()),
            None => AuthMode::ServicePrincipal,
        };

        let request = self.tune_timing(
            RunRequest::new(remote_supervisor_id, user_message)
                .with_functions(functions)
                .with_auth(auth),
        );

        let run_result = self.driver.run(request).await;

        let outcome = match run_result {
            Ok(outcome) => outcome,
            Err(err) => {
                let execution = AgentExecution {
                    execution_id: execution_id.clone(),
                    claim_id: claim.claim_id.clone(),
                    started_at,
                    completed_at: Utc::now(),
                    agent_steps: vec![],
                    total_tokens: 0,
                    total_cost: 0.0,
                    agents_invoked: vec![],
                    final_result: None,
                    status: ExecutionStatus::Failed,
                    error_message: Some(err.to_string()),
                };
                if let Err(store_err) = self.execution_store.save_execution(&execution).await {
                    log::error!("failed to persist failed execution {}: {}", execution_id, store_err);
                }
                return Err(err);
            }
        };

        telemetry.record(
            &self.settings.default_model_deployment,
            &self.settings.default_model_deployment,
            outcome.usage.prompt_tokens,
            outcome.usage.completion_tokens,
            "supervisor",
            "process_claim",
        );

        let trace = build_trace(&outcome);

        let agent_steps: Vec<AgentStepExecution> = outcome
            .tool_results
            .iter()
            .map(|result| AgentStepExecution {
                agent_type: result.function_name.strip_prefix("call_").unwrap_or(&result.function_name).to_string(),
                input_data: serde_json::from_str(&result.arguments).unwrap_or(serde_json::Value::Null),
                output_data: result.output.clone(),
                token_usage: TokenUsageSnapshot::default(),
            })
            .collect();

        let agents_invoked: Vec<String> = {
            let mut seen = std::collections::HashSet::new();
            agent_steps
                .iter()
                .filter(|s| seen.insert(s.agent_type.clone()))
                .map(|s| s.agent_type.clone())
                .collect()
        };

        let final_result = trace.iter().rev().find(|c| c.source == TraceSource::Supervisor && c.final_assessment).and_then(|c| c.messages.first().cloned());

        let (status, error_message) = match &outcome.failure {
            Some(reason) => (ExecutionStatus::Failed, Some(reason.clone())),
            None => (ExecutionStatus::Completed, None),
        };

        let execution = AgentExecution {
            execution_id: execution_id.clone(),
            claim_id: claim.claim_id.clone(),
            started_at,
            completed_at: Utc::now(),
            agent_steps,
            total_tokens: telemetry.total_tokens(),
            total_cost: telemetry.total_cost(),
            agents_invoked,
            final_result: final_result.clone(),
            status,
            error_message,
        };

        if let Err(err) = self.execution_store.save_execution(&execution).await {
            log::error!("failed to persist execution {}: {}", execution_id, err);
        }
        for record in telemetry.records() {
            if let Err(err) = self.execution_store.save_token_usage(record).await {
                log::error!("failed to persist token usage record for {}: {}", execution_id, err);
            }
        }
        self.token_tracker.finalize(telemetry);

        let evaluation_results = self.run_evaluation(&outcome.messages, claim, &final_result).await;

        Ok(ClaimOutcome {
            execution_id,
            final_decision: final_result,
            conversation_chronological: trace,
            evaluation_results,
        })
    }

    async fn run_evaluation(
        &self,
        messages: &[Message],
        claim: &Claim,
        final_result: &Option<String>,
    ) -> Option<EvaluationResult> {
        let answer = final_result.clone()?;
        let question = messages
            .iter()
            .find(|m| m.role == crate::cloudllm::agent_service::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| claim.description.clone());

        let request = EvaluationRequest {
            question,
            answer,
            context: serde_json::json!({
                "claim_id": claim.claim_id,
                "claim_type": claim.claim_type,
                "state": claim.state,
            }),
        };

        match self.evaluator.evaluate(&request).await {
            Ok(result) => Some(result),
            Err(err) => {
                log::warn!("evaluation failed for claim {}: {}", claim.claim_id, err);
                None
            }
        }
    }

    /// A single-specialist multi-turn interaction that reuses the given
    /// thread.
    pub async fn process_continue(
        &self,
        agent_name: &str,
        thread_id: &str,
        message: &str,
        user_token: Option<String>,
    ) -> Result<Vec<Message>, OrchestrationError> {
        let entry = self.registry.lookup(agent_name).await.map_err(OrchestrationError::from)?;
        let remote_id = entry.remote_agent_id.expect("lookup only succeeds with a remote id");

        let auth = match &user_token {
            Some(token) => AuthMode::OnBehalfOf(token.clone()),
            None => AuthMode::ServicePrincipal,
        };

        let request = self.tune_timing(
            RunRequest::new(remote_id, message.to_string())
                .with_thread_id(thread_id.to_string())
                .with_auth(auth),
        );

        let outcome = self.driver.run(request).await?;
        Ok(outcome.messages)
    }

    /// Run a single specialist directly, bypassing the supervisor, for
    /// callers that want one agent's opinion without the full workflow.
    pub async fn run_single_agent(
        &self,
        agent_name: &str,
        claim: &Claim,
        user_token: Option<String>,
    ) -> Result<(Vec<Message>, RunUsage, String), OrchestrationError> {
        let entry = self.registry.lookup(agent_name).await.map_err(OrchestrationError::from)?;
        let remote_id = entry.remote_agent_id.expect("lookup only succeeds with a remote id");

        let auth = match &user_token {
            Some(token) => AuthMode::OnBehalfOf(token.clone()),
            None => AuthMode::ServicePrincipal,
        };

        let request = self.tune_timing(RunRequest::new(remote_id, claim::to_pretty_json(claim)).with_auth(auth));
        let outcome = self.driver.run(request).await?;
        let thread_id = outcome.thread_id.clone();
        Ok((outcome.messages, outcome.usage, thread_id))
    }

    pub async fn list_agents(&self) -> Vec<String> {
        self.registry.list().await
    }

    /// Explicit version-bump path: callers push a new `AgentDefinition`
    /// (typically produced via `AgentDefinition::bump_version`) and it
    /// always wins over whatever tool signature was registered before.
    pub async fn register_agent_definition(&self, definition: AgentDefinition) -> Result<(), OrchestrationError> {
        self.registry.register(definition, true).await
    }

    pub async fn get_claim_execution_history(&self, claim_id: &str) -> Result<Vec<AgentExecution>, OrchestrationError> {
        self.execution_store
            .get_claim_history(claim_id)
            .await
            .map_err(OrchestrationError::Persistence)
    }

    pub fn get_token_analytics(&self, agent_type: Option<&str>, days_back: i64) -> ClaimTokenSummary {
        self.token_tracker.analytics(agent_type, days_back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agent_service::{
        Message as SvcMessage, RemoteAgentSummary, RequiredToolCall, Role as SvcRole, RunHandle, RunStatus, Thread,
    };
    use crate::cloudllm::telemetry::InMemoryExecutionStore;
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::Mutex as StdMutex;

    struct FakeClient {
        runs: StdMutex<Vec<RunHandle>>,
        messages: Vec<SvcMessage>,
    }

    #[async_trait]
    impl AgentServiceClient for FakeClient {
        async fn create_agent(
            &self,
            _name: &str,
            _model: &str,
            _instructions: &str,
            _tools: &[crate::cloudllm::agent_definition::ToolDescriptor],
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            Ok(format!("remote-{}", Uuid::new_v4()))
        }

        async fn list_agents(&self) -> Result<Vec<RemoteAgentSummary>, Box<dyn Error + Send + Sync>> {
            Ok(vec![])
        }

        async fn delete_agent(&self, _agent_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }

        async fn create_thread(&self) -> Result<Thread, Box<dyn Error + Send + Sync>> {
            Ok(Thread { thread_id: "thread-1".to_string() })
        }

        async fn post_message(&self, _thread_id: &str, _role: SvcRole, _content: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }

        async fn create_run(&self, _thread_id: &str, _agent_id: &str, _auth: &AuthMode) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
            Ok(self.runs.lock().unwrap().remove(0))
        }

        async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
            Ok(self.runs.lock().unwrap().remove(0))
        }

        async fn submit_tool_outputs(&self, _thread_id: &str, _run_id: &str, _outputs: Vec<crate::cloudllm::agent_service::ToolOutput>) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
            Ok(self.runs.lock().unwrap().remove(0))
        }

        async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }

        async fn list_messages(&self, _thread_id: &str) -> Result<Vec<SvcMessage>, Box<dyn Error + Send + Sync>> {
            Ok(self.messages.clone())
        }
    }

    fn sample_claim() -> Claim {
        Claim {
            claim_id: "CLM-2026-000001".to_string(),
            claim_type: "Major Collision".to_string(),
            claimant_id: "CLM-1310".to_string(),
            claimant_name: "Jordan Rivera".to_string(),
            state: "CA".to_string(),
            policy_number: "POL-44821".to_string(),
            estimated_damage: 28392.64,
            description: "Multi-vehicle collision on I-5".to_string(),
            supporting_documents: vec![],
            images: vec![],
            user_token: None,
        }
    }

    #[tokio::test]
    async fn process_claim_happy_path_produces_bracketed_trace_and_persists_execution() {
        let client = Arc::new(FakeClient {
            runs: StdMutex::new(vec![RunHandle {
                thread_id: "thread-1".to_string(),
                run_id: "run-1".to_string(),
                status: RunStatus::Completed,
                usage: RunUsage { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 },
                required_tool_calls: vec![],
                last_error: None,
            }]),
            messages: vec![SvcMessage::assistant("ASSESSMENT_COMPLETE\nPRIMARY RECOMMENDATION: APPROVE (HIGH)")],
        });
        let store = Arc::new(InMemoryExecutionStore::new());
        let orchestrator = SupervisorOrchestrator::new(client, store.clone(), "gpt-4o-mini");

        let outcome = orchestrator.process_claim(&sample_claim()).await.unwrap();
        assert_eq!(outcome.conversation_chronological.len(), 2);
        assert!(outcome.final_decision.unwrap().starts_with("ASSESSMENT_COMPLETE"));

        let history = store.get_claim_history("CLM-2026-000001").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn process_claim_missing_synthesis_still_returns_trace() {
        let client = Arc::new(FakeClient {
            runs: StdMutex::new(vec![RunHandle {
                thread_id: "thread-1".to_string(),
                run_id: "run-1".to_string(),
                status: RunStatus::Completed,
                usage: RunUsage::default(),
                required_tool_calls: vec![],
                last_error: None,
            }]),
            messages: vec![],
        });
        let store = Arc::new(InMemoryExecutionStore::new());
        let orchestrator = SupervisorOrchestrator::new(client, store, "gpt-4o-mini");

        let outcome = orchestrator.process_claim(&sample_claim()).await.unwrap();
        assert_eq!(outcome.final_decision, Some(String::new()));
    }

    #[tokio::test]
    async fn process_claim_registry_miss_mid_run_surfaces_plain_error_without_panicking() {
        let client = Arc::new(FakeClient {
            runs: StdMutex::new(vec![
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::RequiresAction,
                    usage: RunUsage::default(),
                    required_tool_calls: vec![RequiredToolCall {
                        call_id: "c1".to_string(),
                        function_name: "call_risk_analyst".to_string(),
                        arguments_json: "{}".to_string(),
                    }],
                    last_error: None,
                },
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::Completed,
                    usage: RunUsage::default(),
                    required_tool_calls: vec![],
                    last_error: None,
                },
            ]),
            messages: vec![SvcMessage::assistant("ASSESSMENT_COMPLETE")],
        });
        let store = Arc::new(InMemoryExecutionStore::new());
        let orchestrator = SupervisorOrchestrator::new(client, store, "gpt-4o-mini");

        // risk_analyst was never registered, so the adapter should surface
        // "not available" rather than panicking the run.
        let outcome = orchestrator.process_claim(&sample_claim()).await.unwrap();
        let specialist_chunk = outcome
            .conversation_chronological
            .iter()
            .find(|c| c.agent_name == "risk_analyst")
            .unwrap();
        assert!(specialist_chunk.messages[0].contains("not available"));
    }

    #[tokio::test]
    async fn process_claim_terminal_run_failure_emits_error_chunk_and_persists_failed_status() {
        let client = Arc::new(FakeClient {
            runs: StdMutex::new(vec![RunHandle {
                thread_id: "thread-1".to_string(),
                run_id: "run-1".to_string(),
                status: RunStatus::Failed,
                usage: RunUsage::default(),
                required_tool_calls: vec![],
                last_error: Some("model overloaded".to_string()),
            }]),
            messages: vec![],
        });
        let store = Arc::new(InMemoryExecutionStore::new());
        let orchestrator = SupervisorOrchestrator::new(client, store.clone(), "gpt-4o-mini");

        let outcome = orchestrator.process_claim(&sample_claim()).await.unwrap();

        assert_eq!(outcome.final_decision, None);
        let last_chunk = outcome.conversation_chronological.last().unwrap();
        assert!(!last_chunk.final_assessment);
        assert_eq!(last_chunk.error.as_deref(), Some("model overloaded"));

        let history = store.get_claim_history("CLM-2026-000001").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert_eq!(history[0].error_message.as_deref(), Some("model overloaded"));
    }
}
