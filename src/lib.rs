// src/lib.rs

//! Orchestration engine for insurance claim assessment.
//!
//! A supervisor agent delegates to a fixed set of specialist agents over a
//! remote thread/run LLM-agent service. This crate owns the delegation loop,
//! the specialist dispatch layer, and the trace/telemetry fabric; it does
//! not implement the LLM, the agent-hosting service, or the blob/search/
//! catalog layers the specialists ultimately query.

pub mod cloudllm;

pub use cloudllm::agent_definition::{AgentDefinition, ToolDescriptor};
pub use cloudllm::agent_service::{
    AgentServiceClient, Message, ReqwestAgentServiceClient, Role, RunHandle, RunStatus, Thread,
    ToolCall, ToolOutput,
};
pub use cloudllm::claim::Claim;
pub use cloudllm::config::Settings;
pub use cloudllm::errors::OrchestrationError;
pub use cloudllm::registry::AgentRegistry;
pub use cloudllm::supervisor::{ClaimOutcome, SupervisorOrchestrator, WorkflowType};
pub use cloudllm::telemetry::{ExecutionStore, InMemoryExecutionStore, TokenUsageTracker};
pub use cloudllm::trace::TraceChunk;
