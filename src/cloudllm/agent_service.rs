//! The remote LLM-agent runtime this crate is a client of.
//!
//! `AgentServiceClient` is the provider-agnostic trait abstraction over a
//! concrete agent/thread/run hosting service, covering the thread/run/
//! tool-call shape the orchestrator needs. `ReqwestAgentServiceClient` is
//! one concrete implementation: a configurable JSON REST client rather than
//! a single vendor's SDK.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Mutex;

/// Conversation role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A single piece of assistant-requested tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub function_name: String,
    pub arguments: serde_json::Value,
}

/// A message in a thread. Content is normalized to plain text at this layer
/// — the run driver's completion step folds a list-of-content-parts shape
/// down to joined text before handing messages back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: vec![] }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls: vec![] }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into(), tool_calls: vec![] }
    }
}

/// Opaque conversation handle. The driver either creates a fresh thread or
/// reuses one the caller supplies for a "continue" interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
}

/// Cumulative token usage reported by a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The run lifecycle states a remote run can occupy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired
        )
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired)
    }
}

/// A pending tool call the remote run is blocked on (`requires_action`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredToolCall {
    pub call_id: String,
    pub function_name: String,
    pub arguments_json: String,
}

/// The current state of a run, as returned by `get_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHandle {
    pub thread_id: String,
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub usage: RunUsage,
    #[serde(default)]
    pub required_tool_calls: Vec<RequiredToolCall>,
    pub last_error: Option<String>,
}

/// One submitted tool output, correlated back to a `RequiredToolCall` by
/// `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

/// Which credential mode a call should use — service principal by default,
/// user-identity for on-behalf-of access (the data-analytics tool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    ServicePrincipal,
    OnBehalfOf(String),
}

/// Every capability the orchestrator needs from a remote agent/thread/run
/// service.
///
/// Implementations must be `Send + Sync` so a single client can be shared
/// as `Arc<dyn AgentServiceClient>` across concurrently running claims.
#[async_trait]
pub trait AgentServiceClient: Send + Sync {
    async fn create_agent(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
        tools: &[crate::cloudllm::agent_definition::ToolDescriptor],
    ) -> Result<String, Box<dyn Error + Send + Sync>>;

    async fn list_agents(&self) -> Result<Vec<RemoteAgentSummary>, Box<dyn Error + Send + Sync>>;

    async fn delete_agent(&self, agent_id: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn create_thread(&self) -> Result<Thread, Box<dyn Error + Send + Sync>>;

    async fn post_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn create_run(
        &self,
        thread_id: &str,
        agent_id: &str,
        auth: &AuthMode,
    ) -> Result<RunHandle, Box<dyn Error + Send + Sync>>;

    async fn get_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunHandle, Box<dyn Error + Send + Sync>>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunHandle, Box<dyn Error + Send + Sync>>;

    async fn cancel_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn list_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<Message>, Box<dyn Error + Send + Sync>>;
}

/// Minimal remote-agent listing entry used by the registry's rediscovery
/// routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAgentSummary {
    pub id: String,
    pub name: String,
    pub tool_names: Vec<String>,
}

/// Concrete `reqwest`-backed client talking JSON REST to a configurable
/// agent/thread/run endpoint.
///
/// The wire shape is intentionally generic (a thin REST mapping of the trait
/// above) rather than tied to any one vendor's SDK, since this crate's core
/// is not supposed to hard-code which agent-hosting service it talks to.
pub struct ReqwestAgentServiceClient {
    base_url: String,
    client: reqwest::Client,
    service_principal_token: Mutex<Option<String>>,
}

impl ReqwestAgentServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            service_principal_token: Mutex::new(None),
        }
    }

    pub fn with_service_principal_token(self, token: impl Into<String>) -> Self {
        *self.service_principal_token.lock().unwrap() = Some(token.into());
        self
    }

    fn bearer_for(&self, auth: &AuthMode) -> Option<String> {
        match auth {
            AuthMode::OnBehalfOf(token) => Some(token.clone()),
            AuthMode::ServicePrincipal => self.service_principal_token.lock().unwrap().clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AgentServiceClient for ReqwestAgentServiceClient {
    async fn create_agent(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
        tools: &[crate::cloudllm::agent_definition::ToolDescriptor],
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        #[derive(Serialize)]
        struct Req<'a> {
            name: &'a str,
            model: &'a str,
            instructions: &'a str,
            tools: &'a [crate::cloudllm::agent_definition::ToolDescriptor],
        }
        #[derive(Deserialize)]
        struct Resp {
            id: String,
        }
        log::debug!("creating remote agent '{}' (model={})", name, model);
        let resp: Resp = self
            .client
            .post(self.url("/agents"))
            .json(&Req { name, model, instructions, tools })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.id)
    }

    async fn list_agents(&self) -> Result<Vec<RemoteAgentSummary>, Box<dyn Error + Send + Sync>> {
        let agents = self
            .client
            .get(self.url("/agents"))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RemoteAgentSummary>>()
            .await?;
        Ok(agents)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.client
            .delete(self.url(&format!("/agents/{}", agent_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<Thread, Box<dyn Error + Send + Sync>> {
        let thread = self
            .client
            .post(self.url("/threads"))
            .send()
            .await?
            .error_for_status()?
            .json::<Thread>()
            .await?;
        Ok(thread)
    }

    async fn post_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        #[derive(Serialize)]
        struct Req<'a> {
            role: Role,
            content: &'a str,
        }
        self.client
            .post(self.url(&format!("/threads/{}/messages", thread_id)))
            .json(&Req { role, content })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        agent_id: &str,
        auth: &AuthMode,
    ) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
        #[derive(Serialize)]
        struct Req<'a> {
            agent_id: &'a str,
        }
        let mut req = self
            .client
            .post(self.url(&format!("/threads/{}/runs", thread_id)))
            .json(&Req { agent_id });
        if let Some(token) = self.bearer_for(auth) {
            req = req.bearer_auth(token);
        }
        let run = req.send().await?.error_for_status()?.json::<RunHandle>().await?;
        Ok(run)
    }

    async fn get_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
        let run = self
            .client
            .get(self.url(&format!("/threads/{}/runs/{}", thread_id, run_id)))
            .send()
            .await?
            .error_for_status()?
            .json::<RunHandle>()
            .await?;
        Ok(run)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunHandle, Box<dyn Error + Send + Sync>> {
        #[derive(Serialize)]
        struct Req {
            outputs: Vec<ToolOutput>,
        }
        let run = self
            .client
            .post(self.url(&format!(
                "/threads/{}/runs/{}/submit_tool_outputs",
                thread_id, run_id
            )))
            .json(&Req { outputs })
            .send()
            .await?
            .error_for_status()?
            .json::<RunHandle>()
            .await?;
        Ok(run)
    }

    async fn cancel_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.client
            .post(self.url(&format!("/threads/{}/runs/{}/cancel", thread_id, run_id)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
    ) -> Result<Vec<Message>, Box<dyn Error + Send + Sync>> {
        let raw = self
            .client
            .get(self.url(&format!("/threads/{}/messages", thread_id)))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RawMessage>>()
            .await?;
        Ok(raw.into_iter().map(RawMessage::into_message).collect())
    }
}

/// Wire shape for a message as the remote service returns it: `content` may
/// be a plain string or a list of content parts, unlike the domain
/// `Message.content`, which is always plain text.
#[derive(Debug, Clone, Deserialize)]
struct RawMessage {
    role: Role,
    content: serde_json::Value,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

impl RawMessage {
    fn into_message(self) -> Message {
        Message {
            role: self.role,
            content: crate::cloudllm::trace::normalize_content(&self.content),
            tool_calls: self.tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_terminal_classification() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Failed.is_terminal_failure());
        assert!(!RunStatus::Completed.is_terminal_failure());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::RequiresAction.is_terminal());
    }

    #[test]
    fn message_constructors_set_expected_roles() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::assistant("hi").role, Role::Assistant);
        assert_eq!(Message::tool("hi").role, Role::Tool);
    }

    #[test]
    fn raw_message_with_array_shaped_content_normalizes_to_plain_text() {
        let raw: RawMessage = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": {"value": "first line"}},
                {"type": "image_file", "image_file": {"file_id": "abc"}},
                {"type": "text", "text": {"value": "second line"}},
            ],
        }))
        .unwrap();

        let message = raw.into_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "first line\nsecond line");
    }

    #[test]
    fn raw_message_with_plain_string_content_passes_through_unchanged() {
        let raw: RawMessage = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": "hello there",
        }))
        .unwrap();

        assert_eq!(raw.into_message().content, "hello there");
    }
}
