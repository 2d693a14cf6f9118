//! Process a sample claim end to end
//!
//! A minimal demonstration of the supervisor workflow against a remote
//! agent/thread/run service. Registers the supervisor and five specialists,
//! then runs one claim through the standard workflow and prints the trace.
//!
//! Run with:
//! ```bash
//! export AGENT_SERVICE_ENDPOINT=http://localhost:8080
//! cargo run --example process_sample_claim
//! ```

use std::sync::Arc;

use claims_orchestrator::cloudllm::agent_definition::AgentDefinition;
use claims_orchestrator::cloudllm::agent_service::ReqwestAgentServiceClient;
use claims_orchestrator::cloudllm::claim::Claim;
use claims_orchestrator::cloudllm::config::Settings;
use claims_orchestrator::cloudllm::telemetry::InMemoryExecutionStore;
use claims_orchestrator::SupervisorOrchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("\n{}", "=".repeat(70));
    println!("  Claims Orchestrator - Sample Run");
    println!("{}\n", "=".repeat(70));

    let settings = Settings::from_env();
    let client = Arc::new(ReqwestAgentServiceClient::new(&settings.agent_service_endpoint));
    let store = Arc::new(InMemoryExecutionStore::new());

    let orchestrator = SupervisorOrchestrator::with_settings(client, store, settings.clone());

    let specialists = vec![
        AgentDefinition::new("claim_assessor", "1.0.0", "Assess claim validity and cost.", &settings.default_model_deployment),
        AgentDefinition::new("policy_checker", "1.0.0", "Verify coverage and policy terms.", &settings.default_model_deployment),
        AgentDefinition::new("risk_analyst", "1.0.0", "Analyze fraud risk and history.", &settings.default_model_deployment),
        AgentDefinition::new("communication_agent", "1.0.0", "Draft customer emails.", &settings.default_model_deployment),
        AgentDefinition::new("claims_data_analyst", "1.0.0", "Query enterprise claims data.", &settings.default_model_deployment),
    ];
    orchestrator.initialize(specialists).await?;

    let claim = Claim {
        claim_id: "CLM-2026-000001".to_string(),
        claim_type: "Major Collision".to_string(),
        claimant_id: "CLM-1310".to_string(),
        claimant_name: "Jordan Rivera".to_string(),
        state: "CA".to_string(),
        policy_number: "POL-44821".to_string(),
        estimated_damage: 28392.64,
        description: "Multi-vehicle collision on I-5, rear-ended at a stoplight.".to_string(),
        supporting_documents: vec![],
        images: vec![],
        user_token: None,
    };

    let outcome = orchestrator.process_claim(&claim).await?;

    println!("Execution: {}", outcome.execution_id);
    for chunk in &outcome.conversation_chronological {
        println!("\n--- {} ---\n{}", chunk.agent_name, chunk.messages.join("\n"));
    }

    Ok(())
}
