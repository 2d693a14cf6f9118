//! Turns raw thread/run output into a consumer-ready chronological stream
//! keyed by agent name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cloudllm::agent_service::Message;
use crate::cloudllm::thread_run_driver::{RunOutcome, ToolResultRecord};

/// One entry in the ordered trace a completed or partially-completed run
/// produces.
///
/// `error` is set instead of `final_assessment` when the run ended in a
/// terminal failure: consumers should check `error` before treating the
/// trailing chunk's `messages` as a synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceChunk {
    pub agent_name: String,
    pub messages: Vec<String>,
    pub source: TraceSource,
    #[serde(default)]
    pub final_assessment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where a trace chunk's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceSource {
    Supervisor,
    Specialist,
}

const LEADING_NOTICE: &str = "Processing claim through specialist agents…";

/// Build the ordered trace from a completed run's output.
///
/// Shape: a leading supervisor notice chunk, one chunk per tool-call result
/// in surfaced order (agent name derived by stripping the `call_` prefix
/// from the function name), then either a trailing supervisor chunk
/// carrying the final assistant message with `final_assessment = true`, or —
/// if `outcome.failure` is set — an error chunk in its place. Partial
/// specialist chunks gathered before a terminal failure are still included;
/// nothing is dropped.
pub fn build_trace(outcome: &RunOutcome) -> Vec<TraceChunk> {
    let mut chunks = Vec::with_capacity(outcome.tool_results.len() + 2);

    chunks.push(TraceChunk {
        agent_name: "supervisor".to_string(),
        messages: vec![LEADING_NOTICE.to_string()],
        source: TraceSource::Supervisor,
        final_assessment: false,
        error: None,
    });

    for result in &outcome.tool_results {
        chunks.push(tool_result_chunk(result));
    }

    match &outcome.failure {
        Some(reason) => chunks.push(TraceChunk {
            agent_name: "supervisor".to_string(),
            messages: vec![],
            source: TraceSource::Supervisor,
            final_assessment: false,
            error: Some(reason.clone()),
        }),
        None => {
            let final_message = last_assistant_text(&outcome.messages).unwrap_or_default();
            chunks.push(TraceChunk {
                agent_name: "supervisor".to_string(),
                messages: vec![final_message],
                source: TraceSource::Supervisor,
                final_assessment: true,
                error: None,
            });
        }
    }

    chunks
}

fn tool_result_chunk(result: &ToolResultRecord) -> TraceChunk {
    TraceChunk {
        agent_name: agent_name_from_function(&result.function_name),
        messages: vec![result.output.clone()],
        source: TraceSource::Specialist,
        final_assessment: false,
        error: None,
    }
}

/// `call_risk_analyst` → `risk_analyst`.
fn agent_name_from_function(function_name: &str) -> String {
    function_name.strip_prefix("call_").unwrap_or(function_name).to_string()
}

fn last_assistant_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == crate::cloudllm::agent_service::Role::Assistant)
        .map(|m| m.content.clone())
}

/// Join a message's content parts into plain text.
///
/// Content may arrive as a plain string or as a JSON array of content parts,
/// each carrying a `type` and, for `type = text`, a nested `{value}`. Parts
/// of any other type (e.g. annotations) are dropped; `text` parts are
/// joined with newlines. This mirrors the normalization the remote service's
/// message payloads require before they reach a trace chunk.
pub fn normalize_content(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| {
                if part.get("type").and_then(Value::as_str) != Some("text") {
                    return None;
                }
                part.get("text")
                    .and_then(|t| t.get("value"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agent_service::{Message, RunUsage};

    fn outcome_with(results: Vec<ToolResultRecord>, messages: Vec<Message>) -> RunOutcome {
        RunOutcome {
            messages,
            usage: RunUsage::default(),
            tool_results: results,
            thread_id: "t1".to_string(),
            failure: None,
        }
    }

    #[test]
    fn build_trace_brackets_specialist_chunks_with_supervisor_chunks() {
        let outcome = outcome_with(
            vec![ToolResultRecord {
                function_name: "call_risk_analyst".to_string(),
                call_id: "c1".to_string(),
                arguments: "{}".to_string(),
                output: "Risk: moderate".to_string(),
            }],
            vec![Message::assistant("ASSESSMENT_COMPLETE\n...")],
        );
        let trace = build_trace(&outcome);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0].agent_name, "supervisor");
        assert!(!trace[0].final_assessment);
        assert_eq!(trace[1].agent_name, "risk_analyst");
        assert_eq!(trace[1].source, TraceSource::Specialist);
        assert_eq!(trace[2].agent_name, "supervisor");
        assert!(trace[2].final_assessment);
        assert!(trace[2].messages[0].starts_with("ASSESSMENT_COMPLETE"));
    }

    #[test]
    fn build_trace_with_no_tool_results_still_has_leading_and_trailing_chunks() {
        let outcome = outcome_with(vec![], vec![Message::assistant("final text")]);
        let trace = build_trace(&outcome);
        assert_eq!(trace.len(), 2);
        assert!(trace.last().unwrap().final_assessment);
    }

    #[test]
    fn build_trace_on_terminal_failure_emits_error_chunk_not_a_synthesis_chunk() {
        let mut outcome = outcome_with(
            vec![ToolResultRecord {
                function_name: "call_policy_checker".to_string(),
                call_id: "c1".to_string(),
                arguments: "{}".to_string(),
                output: "Coverage confirmed".to_string(),
            }],
            vec![Message::assistant("Error: Agent run failed — model overloaded")],
        );
        outcome.failure = Some("model overloaded".to_string());

        let trace = build_trace(&outcome);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[1].agent_name, "policy_checker");
        let last = trace.last().unwrap();
        assert!(!last.final_assessment);
        assert_eq!(last.error.as_deref(), Some("model overloaded"));
    }

    #[test]
    fn normalize_content_handles_plain_string() {
        assert_eq!(normalize_content(&Value::String("hello".to_string())), "hello");
    }

    #[test]
    fn normalize_content_joins_text_parts_and_drops_other_types() {
        let raw = serde_json::json!([
            {"type": "text", "text": {"value": "first line"}},
            {"type": "image_file", "image_file": {"file_id": "abc"}},
            {"type": "text", "text": {"value": "second line"}},
        ]);
        assert_eq!(normalize_content(&raw), "first line\nsecond line");
    }
}
