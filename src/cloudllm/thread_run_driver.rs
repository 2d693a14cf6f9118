//! The thread/run state machine against the remote agent service, including
//! manual tool dispatch.
//!
//! Drives the `queued/in_progress/requires_action/...` polling loop against
//! the remote service, dispatching tool calls locally and submitting their
//! outputs before resuming the poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cloudllm::agent_service::{
    AgentServiceClient, AuthMode, Message, RunStatus, RunUsage, ToolOutput,
};
use crate::cloudllm::errors::OrchestrationError;

/// A locally registered tool function the driver may invoke when the
/// remote run asks for it.
#[async_trait]
pub trait ToolFunction: Send + Sync {
    async fn call(&self, arguments: serde_json::Value) -> String;
}

/// One parameters to `ThreadRunDriver::run`.
pub struct RunRequest {
    pub agent_id: String,
    pub user_message: String,
    pub thread_id: Option<String>,
    pub functions: HashMap<String, Arc<dyn ToolFunction>>,
    pub auth: AuthMode,
    pub poll_interval: Duration,
    pub max_poll_duration: Duration,
}

impl RunRequest {
    pub fn new(agent_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            user_message: user_message.into(),
            thread_id: None,
            functions: HashMap::new(),
            auth: AuthMode::ServicePrincipal,
            poll_interval: Duration::from_millis(500),
            max_poll_duration: Duration::from_secs(120),
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_functions(mut self, functions: HashMap<String, Arc<dyn ToolFunction>>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }
}

/// Record of a single tool call the run made and what it got back, in the
/// order the remote service surfaced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub function_name: String,
    pub call_id: String,
    pub arguments: String,
    pub output: String,
}

/// The fully materialized result of one `run()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub messages: Vec<Message>,
    pub usage: RunUsage,
    pub tool_results: Vec<ToolResultRecord>,
    pub thread_id: String,
    /// `Some(reason)` when the run reached a terminal
    /// `failed`/`cancelled`/`expired` state. Callers should branch on this
    /// directly rather than pattern-matching the synthesized assistant
    /// message in `messages`.
    pub failure: Option<String>,
}

/// Drives one thread/run interaction to completion against an
/// `AgentServiceClient`.
pub struct ThreadRunDriver {
    client: Arc<dyn AgentServiceClient>,
}

impl ThreadRunDriver {
    pub fn new(client: Arc<dyn AgentServiceClient>) -> Self {
        Self { client }
    }

    /// Run the full state machine: create or reuse a thread, post the user
    /// message, start the run, poll to a terminal or requires-action state,
    /// dispatch tool calls and resubmit their outputs, then collect messages
    /// and usage on success or synthesize a message for a terminal failure.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, OrchestrationError> {
        let thread_id = match request.thread_id {
            Some(id) => id,
            None => {
                let thread = self
                    .client
                    .create_thread()
                    .await
                    .map_err(OrchestrationError::Other)?;
                thread.thread_id
            }
        };

        self.client
            .post_message(
                &thread_id,
                crate::cloudllm::agent_service::Role::User,
                &request.user_message,
            )
            .await
            .map_err(OrchestrationError::Other)?;

        let mut run = self
            .client
            .create_run(&thread_id, &request.agent_id, &request.auth)
            .await
            .map_err(OrchestrationError::Other)?;

        let deadline = Instant::now() + request.max_poll_duration;
        let mut tool_results = Vec::new();

        loop {
            match run.status {
                RunStatus::Queued | RunStatus::InProgress => {
                    if Instant::now() >= deadline {
                        let _ = self.client.cancel_run(&thread_id, &run.run_id).await;
                        return Err(OrchestrationError::Timeout);
                    }
                    tokio::time::sleep(request.poll_interval).await;
                    run = self
                        .client
                        .get_run(&thread_id, &run.run_id)
                        .await
                        .map_err(OrchestrationError::Other)?;
                }
                RunStatus::RequiresAction => {
                    if Instant::now() >= deadline {
                        let _ = self.client.cancel_run(&thread_id, &run.run_id).await;
                        return Err(OrchestrationError::Timeout);
                    }
                    let mut outputs = Vec::with_capacity(run.required_tool_calls.len());
                    for pending in &run.required_tool_calls {
                        let output = self.dispatch_tool_call(&request.functions, pending).await;
                        tool_results.push(ToolResultRecord {
                            function_name: pending.function_name.clone(),
                            call_id: pending.call_id.clone(),
                            arguments: pending.arguments_json.clone(),
                            output: output.clone(),
                        });
                        outputs.push(ToolOutput { call_id: pending.call_id.clone(), output });
                    }
                    run = self
                        .client
                        .submit_tool_outputs(&thread_id, &run.run_id, outputs)
                        .await
                        .map_err(OrchestrationError::Other)?;
                }
                RunStatus::Completed => {
                    let messages = self
                        .client
                        .list_messages(&thread_id)
                        .await
                        .map_err(OrchestrationError::Other)?;
                    return Ok(RunOutcome {
                        messages,
                        usage: run.usage,
                        tool_results,
                        thread_id,
                        failure: None,
                    });
                }
                RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired => {
                    let reason = run.last_error.unwrap_or_else(|| "unknown reason".to_string());
                    log::warn!("run {} on thread {} ended in {:?}: {}", run.run_id, thread_id, run.status, reason);
                    return Ok(RunOutcome {
                        messages: vec![Message::assistant(format!(
                            "Error: Agent run failed — {}",
                            reason
                        ))],
                        usage: RunUsage::default(),
                        tool_results,
                        thread_id,
                        failure: Some(reason),
                    });
                }
            }
        }
    }

    /// Parse arguments, invoke the matching local function, and coerce the
    /// result to a string. Parse failures and missing registrations never
    /// panic — they become the same plain error string a raised exception
    /// would have produced, so the run can continue.
    async fn dispatch_tool_call(
        &self,
        functions: &HashMap<String, Arc<dyn ToolFunction>>,
        pending: &crate::cloudllm::agent_service::RequiredToolCall,
    ) -> String {
        let function = match functions.get(&pending.function_name) {
            Some(f) => f,
            None => return "function not registered".to_string(),
        };

        let arguments: serde_json::Value = match serde_json::from_str(&pending.arguments_json) {
            Ok(v) => v,
            Err(_) if pending.arguments_json.is_empty() => serde_json::Value::Null,
            Err(err) => {
                return format!(
                    "Error executing {}: invalid arguments — {}",
                    pending.function_name, err
                )
            }
        };

        function.call(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agent_service::{
        RemoteAgentSummary, RequiredToolCall, RunHandle, Thread,
    };
    use std::error::Error;
    use std::sync::Mutex as StdMutex;

    struct ScriptedClient {
        runs: StdMutex<Vec<RunHandle>>,
        messages: Vec<Message>,
    }

    #[async_trait]
    impl AgentServiceClient for ScriptedClient {
        async fn create_agent(
            &self,
            _name: &str,
            _model: &str,
            _instructions: &str,
            _tools: &[crate::cloudllm::agent_definition::ToolDescriptor],
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            Ok("agent-1".to_string())
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

        async fn post_message(
            &self,
            _thread_id: &str,
            _role: crate::cloudllm::agent_service::Role,
            _content: &str,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }

        async fn create_run(
            &self,
            _thread_id: &str,
            _agent_id: &str,
            _auth: &AuthMode,
        ) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
            Ok(self.runs.lock().unwrap().remove(0))
        }

        async fn get_run(
            &self,
            _thread_id: &str,
            _run_id: &str,
        ) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
            Ok(self.runs.lock().unwrap().remove(0))
        }

        async fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            _run_id: &str,
            _outputs: Vec<ToolOutput>,
        ) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
            Ok(self.runs.lock().unwrap().remove(0))
        }

        async fn cancel_run(
            &self,
            _thread_id: &str,
            _run_id: &str,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }

        async fn list_messages(&self, _thread_id: &str) -> Result<Vec<Message>, Box<dyn Error + Send + Sync>> {
            Ok(self.messages.clone())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl ToolFunction for EchoTool {
        async fn call(&self, arguments: serde_json::Value) -> String {
            format!("echoed: {}", arguments)
        }
    }

    #[tokio::test]
    async fn run_dispatches_required_tool_call_and_returns_final_messages() {
        let client = Arc::new(ScriptedClient {
            runs: StdMutex::new(vec![
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::RequiresAction,
                    usage: RunUsage::default(),
                    required_tool_calls: vec![RequiredToolCall {
                        call_id: "call-1".to_string(),
                        function_name: "call_risk_analyst".to_string(),
                        arguments_json: "{\"x\":1}".to_string(),
                    }],
                    last_error: None,
                },
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::Completed,
                    usage: RunUsage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 },
                    required_tool_calls: vec![],
                    last_error: None,
                },
            ]),
            messages: vec![Message::assistant("final answer")],
        });

        let mut functions: HashMap<String, Arc<dyn ToolFunction>> = HashMap::new();
        functions.insert("call_risk_analyst".to_string(), Arc::new(EchoTool));

        let driver = ThreadRunDriver::new(client);
        let request = RunRequest::new("agent-1", "hello").with_functions(functions);
        let outcome = driver.run(request).await.unwrap();

        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.tool_results[0].output, "echoed: {\"x\":1}");
        assert_eq!(outcome.messages[0].content, "final answer");
        assert_eq!(outcome.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn run_unregistered_function_yields_plain_error_string_not_panic() {
        let client = Arc::new(ScriptedClient {
            runs: StdMutex::new(vec![
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::RequiresAction,
                    usage: RunUsage::default(),
                    required_tool_calls: vec![RequiredToolCall {
                        call_id: "call-1".to_string(),
                        function_name: "call_unregistered".to_string(),
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
            messages: vec![Message::assistant("done")],
        });

        let driver = ThreadRunDriver::new(client);
        let outcome = driver.run(RunRequest::new("agent-1", "hello")).await.unwrap();
        assert_eq!(outcome.tool_results[0].output, "function not registered");
    }

    #[tokio::test]
    async fn run_terminal_failure_produces_synthesized_error_message() {
        let client = Arc::new(ScriptedClient {
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

        let driver = ThreadRunDriver::new(client);
        let outcome = driver.run(RunRequest::new("agent-1", "hello")).await.unwrap();
        assert_eq!(outcome.messages[0].content, "Error: Agent run failed — model overloaded");
        assert_eq!(outcome.failure.as_deref(), Some("model overloaded"));
        assert!(outcome.tool_results.is_empty());
    }

    #[tokio::test]
    async fn run_terminal_failure_after_partial_tool_calls_keeps_tool_results() {
        let client = Arc::new(ScriptedClient {
            runs: StdMutex::new(vec![
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::RequiresAction,
                    usage: RunUsage::default(),
                    required_tool_calls: vec![RequiredToolCall {
                        call_id: "call-1".to_string(),
                        function_name: "call_risk_analyst".to_string(),
                        arguments_json: "{}".to_string(),
                    }],
                    last_error: None,
                },
                RunHandle {
                    thread_id: "thread-1".to_string(),
                    run_id: "run-1".to_string(),
                    status: RunStatus::Failed,
                    usage: RunUsage::default(),
                    required_tool_calls: vec![],
                    last_error: Some("downstream timeout".to_string()),
                },
            ]),
            messages: vec![],
        });

        let mut functions: HashMap<String, Arc<dyn ToolFunction>> = HashMap::new();
        functions.insert("call_risk_analyst".to_string(), Arc::new(EchoTool));

        let driver = ThreadRunDriver::new(client);
        let request = RunRequest::new("agent-1", "hello").with_functions(functions);
        let outcome = driver.run(request).await.unwrap();

        assert_eq!(outcome.failure.as_deref(), Some("downstream timeout"));
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.tool_results[0].function_name, "call_risk_analyst");
    }
}
