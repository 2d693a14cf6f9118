//! Free-function extraction helper for the `ASSESSMENT_COMPLETE` synthesis
//! block.
//!
//! Deliberately *not* invoked by `SupervisorOrchestrator` — it is offered
//! for consumers that want to turn the raw synthesis text into a structured
//! decision, kept out of the orchestration path entirely so regex-based
//! parsing never becomes implicit control flow inside the core.

use std::fmt;

/// The primary recommendation a synthesis block names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
    Investigate,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Approve => "APPROVE",
            Decision::Deny => "DENY",
            Decision::Investigate => "INVESTIGATE",
        };
        write!(f, "{}", s)
    }
}

/// Confidence accompanying a `Decision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// The parsed primary recommendation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    pub decision: Decision,
    pub confidence: Confidence,
}

/// Extract the primary recommendation from a final synthesis message.
///
/// Looks for a line starting with `PRIMARY RECOMMENDATION:` inside a block
/// that begins with `ASSESSMENT_COMPLETE`, and parses `<DECISION>
/// (<CONFIDENCE>)` out of it. Returns `None` if the text doesn't contain a
/// well-formed block — this never panics on malformed input, matching the
/// rest of the crate's "never raise into the caller" posture for
/// string-shaped data.
pub fn extract_recommendation(text: &str) -> Option<Recommendation> {
    if !text.contains("ASSESSMENT_COMPLETE") {
        return None;
    }

    let line = text
        .lines()
        .find(|line| line.trim_start().starts_with("PRIMARY RECOMMENDATION"))?;

    let (_, rest) = line.split_once(':')?;
    let rest = rest.trim();

    let open_paren = rest.find('(')?;
    let close_paren = rest.find(')')?;
    if close_paren <= open_paren {
        return None;
    }

    let decision_word = rest[..open_paren].trim();
    let confidence_word = rest[open_paren + 1..close_paren].trim();

    let decision = match decision_word {
        "APPROVE" => Decision::Approve,
        "DENY" => Decision::Deny,
        "INVESTIGATE" => Decision::Investigate,
        _ => return None,
    };

    let confidence = match confidence_word {
        "HIGH" => Confidence::High,
        "MEDIUM" => Confidence::Medium,
        "LOW" => Confidence::Low,
        _ => return None,
    };

    Some(Recommendation { decision, confidence })
}
