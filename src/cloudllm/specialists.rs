//! Specialist delegation adapters.
//!
//! Each adapter wraps one specialist as a named tool callable with a single
//! JSON-string argument, shapes a specialist-specific prompt, delegates to
//! the thread/run driver, and post-processes the response. The data-
//! analytics adapter additionally detects soft connectivity failures in the
//! response text and falls back to a secondary source or deterministic demo
//! data.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cloudllm::agent_service::AuthMode;
use crate::cloudllm::registry::AgentRegistry;
use crate::cloudllm::thread_run_driver::{RunRequest, ThreadRunDriver, ToolFunction};

/// Exact casefolded substrings that mark a data-analytics response as a
/// soft failure rather than a genuine answer.
pub const SOFT_FAILURE_PHRASES: &[&str] = &[
    "technical difficulties",
    "technical issue",
    "connectivity issue",
    "unable to retrieve",
    "data service issue",
    "encountered an issue",
    "failure connecting",
    "issue retrieving",
    "cannot query",
    "unable to query",
    "error accessing",
    "will retry",
    "please advise",
    "alternate access",
    "made an error",
    "apologize",
    "i apologize",
    "issue accessing",
    "having trouble",
    "trouble accessing",
    "cannot access",
    "unable to access",
    "failed to access",
    "could not access",
    "could not retrieve",
    "failed to retrieve",
    "unable to connect",
    "failed to connect",
    "no data available",
    "encountered a technical",
    "unable to directly",
    "was unable to",
    "let me retry",
    "ensure connection",
    "once accessible",
];

/// True if `response` contains any of the fixed connectivity phrases,
/// casefolded.
pub fn is_soft_failure(response: &str) -> bool {
    let lowered = response.to_lowercase();
    SOFT_FAILURE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Deterministic classifier over a lowercased claim type, producing the
/// canned Fabric query string.
///
/// Includes `auto accident`/`accident` and `liability` branches alongside
/// the more common claim types. Queries are kept deliberately simple — the
/// natural-language data agent is known to fail on complex composite
/// queries.
pub fn generate_fabric_query(claimant_id: &str, claim_type: &str, state: &str) -> String {
    let claim_type_lower = claim_type.to_lowercase();

    if claim_type_lower.contains("collision") {
        format!(
            "Show claims history for claimant {} and fraud rate for collision claims over 20000 in {}",
            claimant_id, state
        )
    } else if claim_type_lower.contains("property") {
        format!(
            "Show claims history for claimant {} and average property damage claims in {}",
            claimant_id, state
        )
    } else if claim_type_lower.contains("auto accident") || claim_type_lower.contains("accident") {
        format!(
            "Show claims history for claimant {} and fraud rate for auto accident claims in {}",
            claimant_id, state
        )
    } else if claim_type_lower.contains("fire") {
        format!(
            "Show claims history for claimant {} and fire damage fraud indicators in {}",
            claimant_id, state
        )
    } else if claim_type_lower.contains("theft") {
        format!(
            "Show claims history for claimant {} and auto theft fraud rate in {}",
            claimant_id, state
        )
    } else if claim_type_lower.contains("liability") {
        format!(
            "Show claims history for claimant {} and liability claim patterns in {}",
            claimant_id, state
        )
    } else {
        format!(
            "Show claims history for claimant {} and fraud rate for {} claims in {}",
            claimant_id, claim_type, state
        )
    }
}

/// Secondary analytics data source queried when the primary data-analytics
/// specialist's response looks like a soft failure.
#[async_trait]
pub trait SecondaryAnalyticsSource: Send + Sync {
    /// Returns claimant history rows as JSON objects, or an error if the
    /// source is unconfigured/unreachable.
    async fn query_claimant_history(
        &self,
        claimant_id: &str,
        claim_type: &str,
        state: &str,
    ) -> Result<Vec<Value>, String>;
}

/// A tiny deterministic PRNG seeded from a hash of the claimant id, used
/// only to synthesize stable-looking demo data — never for anything
/// security-sensitive.
struct SeededRng(u64);

impl SeededRng {
    fn from_seed_str(seed: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        let mut state = hasher.finish();
        if state == 0 {
            state = 0x9E3779B97F4A7C15;
        }
        Self(state)
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn range(&mut self, low: u64, high_inclusive: u64) -> u64 {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() % span)
    }
}

/// Deterministic seeded demo dataset, used as the last-resort fallback
/// when both the primary data-analytics agent and the secondary source
/// fail: a claimant history summary plus regional statistics, seeded so
/// repeated calls for the same claimant produce the same numbers.
pub fn synthesize_demo_claims_data(
    claimant_id: &str,
    claim_type: &str,
    state: &str,
    claimant_name: &str,
) -> String {
    let mut rng = SeededRng::from_seed_str(claimant_id);

    let total_claims = rng.range(1, 5);
    let approved_claims = rng.range(0, total_claims);
    let denied_claims = total_claims - approved_claims;
    let total_amount: u64 = (0..total_claims).map(|_| rng.range(1000, 25000)).sum();
    let avg_amount = if total_claims > 0 { total_amount / total_claims } else { 0 };

    let base_fraud_rate: f64 = match state {
        "CA" => 4.2,
        "FL" => 5.8,
        "TX" => 3.9,
        "NY" => 4.5,
        "IL" => 3.7,
        "PA" => 3.2,
        "OH" => 3.0,
        "GA" => 4.8,
        "NC" => 3.5,
        "MI" => 3.8,
        _ => 3.5,
    };

    let claim_type_lower = claim_type.to_lowercase();
    let (type_fraud_rate, type_avg_claim) = if claim_type_lower.contains("collision") {
        (base_fraud_rate + (rng.range(5, 15) as f64 / 10.0), rng.range(15000, 35000))
    } else if claim_type_lower.contains("theft") {
        (base_fraud_rate + (rng.range(20, 40) as f64 / 10.0), rng.range(8000, 20000))
    } else if claim_type_lower.contains("fire") {
        (base_fraud_rate + (rng.range(10, 25) as f64 / 10.0), rng.range(25000, 75000))
    } else {
        (base_fraud_rate, rng.range(5000, 15000))
    };

    let risk_score = rng.range(15, 85);
    let risk_level = if risk_score < 30 { "Low" } else if risk_score < 60 { "Medium" } else { "High" };

    format!(
        "## Claims Data Analysis for {claimant_name} ({claimant_id})\n\n\
### ⚠️ Demo Data Mode\n\
*Note: This analysis uses demonstration data. Claims Data Analyst connection unavailable.*\n\n\
---\n\n\
### Claimant History Summary\n\n\
| Metric | Value |\n\
|--------|-------|\n\
| Total Claims Filed | {total_claims} |\n\
| Approved Claims | {approved_claims} |\n\
| Denied Claims | {denied_claims} |\n\
| Total Amount Claimed | ${total_amount} |\n\
| Average Claim Amount | ${avg_amount} |\n\
| Account Risk Score | {risk_score}/100 ({risk_level}) |\n\n\
### Regional Statistics ({state})\n\n\
| Metric | Value |\n\
|--------|-------|\n\
| Regional Fraud Rate | {base_fraud_rate:.1} |\n\
| {claim_type} Fraud Rate | {type_fraud_rate:.1} |\n\
| Average {claim_type} Claim | ${type_avg_claim} |\n",
        claimant_name = claimant_name,
        claimant_id = claimant_id,
        total_claims = total_claims,
        approved_claims = approved_claims,
        denied_claims = denied_claims,
        total_amount = total_amount,
        avg_amount = avg_amount,
        risk_score = risk_score,
        risk_level = risk_level,
        state = state,
        base_fraud_rate = base_fraud_rate,
        claim_type = claim_type,
        type_fraud_rate = type_fraud_rate,
        type_avg_claim = type_avg_claim,
    )
}

/// Run the fallback pipeline for a soft-failed data-analytics response: try
/// the secondary source first, then fall back to deterministic demo data.
pub async fn run_analytics_fallback(
    secondary: Option<&dyn SecondaryAnalyticsSource>,
    claimant_id: &str,
    claim_type: &str,
    state: &str,
    claimant_name: &str,
) -> String {
    if let Some(source) = secondary {
        match source.query_claimant_history(claimant_id, claim_type, state).await {
            Ok(rows) if !rows.is_empty() => {
                let formatted = serde_json::to_string_pretty(&rows).unwrap_or_default();
                return format!(
                    "## Claims Data Analysis for {} ({})\n\n### Secondary Source Results\n\n```json\n{}\n```\n",
                    claimant_name, claimant_id, formatted
                );
            }
            Ok(_) => log::warn!("secondary analytics source returned no rows for {}", claimant_id),
            Err(err) => log::warn!("secondary analytics source failed for {}: {}", claimant_id, err),
        }
    }
    synthesize_demo_claims_data(claimant_id, claim_type, state, claimant_name)
}

fn claim_field(claim: &Value, key: &str) -> String {
    claim.get(key).and_then(Value::as_str).unwrap_or("unknown").to_string()
}

/// Shared context every adapter needs: the registry to look itself up in,
/// the driver to delegate through, and the bearer token (if any) for
/// on-behalf-of calls.
pub struct AdapterContext {
    pub registry: AgentRegistry,
    pub driver: Arc<ThreadRunDriver>,
    pub user_token: Option<String>,
}

impl AdapterContext {
    fn auth(&self) -> AuthMode {
        match &self.user_token {
            Some(token) => AuthMode::OnBehalfOf(token.clone()),
            None => AuthMode::ServicePrincipal,
        }
    }
}

async fn delegate(
    context: &AdapterContext,
    specialist_name: &str,
    display_name: &str,
    prompt: String,
) -> String {
    let entry = match context.registry.lookup(specialist_name).await {
        Ok(entry) => entry,
        Err(_) => return format!("Error: {} agent not available", display_name),
    };
    let remote_agent_id = entry.remote_agent_id.expect("lookup only succeeds with a remote id");

    let request = RunRequest::new(remote_agent_id, prompt).with_auth(context.auth());
    match context.driver.run(request).await {
        Ok(outcome) => outcome
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::cloudllm::agent_service::Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| format!("No response from {}", display_name)),
        Err(err) => format!("Error from {}: {}", display_name, err),
    }
}

/// `call_claim_assessor`.
pub struct ClaimAssessorAdapter(pub AdapterContext);

#[async_trait]
impl ToolFunction for ClaimAssessorAdapter {
    async fn call(&self, arguments: Value) -> String {
        let prompt = format!(
            "Please assess this insurance claim:\n\n{}\n\n\
Provide a detailed assessment including:\n\
1. Damage evaluation and consistency with incident description\n\
2. Cost assessment reasonableness\n\
3. Documentation verification\n\
4. Any red flags or inconsistencies\n\
5. Final verdict: VALID, QUESTIONABLE, or INVALID",
            serde_json::to_string_pretty(&arguments).unwrap_or_default()
        );
        delegate(&self.0, "claim_assessor", "Claim Assessor", prompt).await
    }
}

/// `call_policy_checker`.
pub struct PolicyCheckerAdapter(pub AdapterContext);

#[async_trait]
impl ToolFunction for PolicyCheckerAdapter {
    async fn call(&self, arguments: Value) -> String {
        let claim_type = claim_field(&arguments, "claim_type");
        let estimated_damage = arguments.get("estimated_damage").and_then(Value::as_f64).unwrap_or(0.0);
        let prompt = format!(
            "Please verify coverage for this insurance claim:\n\nClaim Details:\n{}\n\n\
IMPORTANT: search policy documents for coverage matching the CLAIM TYPE: \"{}\"\n\n\
Provide verification including:\n\
1. Policy coverage type that applies to this claim type: {}\n\
2. Relevant coverage limits and deductibles for claims of this type\n\
3. Any applicable exclusions that might affect this claim\n\
4. Whether the estimated damage (${:.2}) is within typical coverage limits\n\
5. Final verdict: COVERED, PARTIALLY COVERED, or NOT COVERED",
            serde_json::to_string_pretty(&arguments).unwrap_or_default(),
            claim_type,
            claim_type,
            estimated_damage,
        );
        delegate(&self.0, "policy_checker", "Policy Checker", prompt).await
    }
}

/// `call_risk_analyst`.
pub struct RiskAnalystAdapter(pub AdapterContext);

#[async_trait]
impl ToolFunction for RiskAnalystAdapter {
    async fn call(&self, arguments: Value) -> String {
        let prompt = format!(
            "Please analyze the risk for this claim:\n\n{}\n\n\
Provide risk analysis including:\n\
1. Claimant history patterns\n\
2. Claim frequency and amounts evaluation\n\
3. Red flags identification\n\
4. Fraud indicators assessment\n\
5. Final verdict: LOW RISK, MODERATE RISK, or HIGH RISK",
            serde_json::to_string_pretty(&arguments).unwrap_or_default()
        );
        delegate(&self.0, "risk_analyst", "Risk Analyst", prompt).await
    }
}

/// `call_communication_agent`.
pub struct CommunicationAgentAdapter(pub AdapterContext);

#[async_trait]
impl ToolFunction for CommunicationAgentAdapter {
    async fn call(&self, arguments: Value) -> String {
        let prompt = format!(
            "Please draft a professional email based on this request:\n\n{}\n\n\
The email should:\n\
1. Have appropriate greeting and claim reference\n\
2. Clearly explain the situation/request\n\
3. Provide specific next steps\n\
4. Include contact information\n\
5. Have professional closing",
            serde_json::to_string_pretty(&arguments).unwrap_or_default()
        );
        delegate(&self.0, "communication_agent", "Communication Agent", prompt).await
    }
}

/// `call_claims_data_analyst`. The only adapter with soft-failure
/// detection and a fallback pipeline.
pub struct ClaimsDataAnalystAdapter {
    pub context: AdapterContext,
    pub secondary_source: Option<Arc<dyn SecondaryAnalyticsSource>>,
}

#[async_trait]
impl ToolFunction for ClaimsDataAnalystAdapter {
    async fn call(&self, arguments: Value) -> String {
        let claimant_id = claim_field(&arguments, "claimant_id");
        let claim_type = claim_field(&arguments, "claim_type");
        let state = claim_field(&arguments, "state");
        let claimant_name = claim_field(&arguments, "claimant_name");

        let query = generate_fabric_query(&claimant_id, &claim_type, &state);
        log::info!("claims_data_analyst query: {}", query);

        let header = format!("**📊 Fabric Query:** `{}`\n\n---\n\n", query);

        let body = delegate(&self.context, "claims_data_analyst", "Claims Data Analyst", query).await;

        if body.starts_with("Error from") || body.starts_with("Error:") {
            return body;
        }

        if is_soft_failure(&body) {
            log::warn!("soft failure detected in claims_data_analyst response for {}", claimant_id);
            let fallback = run_analytics_fallback(
                self.secondary_source.as_deref(),
                &claimant_id,
                &claim_type,
                &state,
                &claimant_name,
            )
            .await;
            return format!("{}{}", header, fallback);
        }

        format!("{}{}", header, body)
    }
}
