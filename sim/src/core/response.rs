//! Structured persona responses, derived summaries and the evaluation report.
//!
//! `validate` methods enforce the constraints JSON Schema cannot express
//! (word counts) and re-check the ones it can, so typed values that never went
//! through the schema are held to the same contract.

use serde::{Deserialize, Serialize};

/// Overall stance or decision: used for persona stances and report decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Yes,
    No,
    Reluctant,
}

impl Stance {
    pub fn as_str(self) -> &'static str {
        match self {
            Stance::Yes => "yes",
            Stance::No => "no",
            Stance::Reluctant => "reluctant",
        }
    }
}

/// Severity tier of an objection. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectionSeverity {
    #[default]
    Low,
    Medium,
    High,
}

impl ObjectionSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectionSeverity::Low => "low",
            ObjectionSeverity::Medium => "medium",
            ObjectionSeverity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectionCategory {
    Risk,
    Cost,
    Time,
    Trust,
    Compliance,
    Usability,
    Other,
}

/// Objection raised by a persona or ranked in the evaluation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Objection {
    pub category: ObjectionCategory,
    pub detail: String,
    pub severity: ObjectionSeverity,
}

pub const SHORT_ANSWER_MAX_WORDS: usize = 120;
pub const MAX_TOP_CONCERNS: usize = 3;
pub const MAX_CLARIFYING_QUESTIONS: usize = 3;

/// Payload a persona responder must produce for every turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaResponsePayload {
    pub stance: Stance,
    pub top_concerns: Vec<String>,
    #[serde(default)]
    pub objections: Vec<Objection>,
    #[serde(default)]
    pub required_proof: Vec<String>,
    pub short_answer: String,
    #[serde(default)]
    pub clarifying_questions: Option<Vec<String>>,
}

impl PersonaResponsePayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.top_concerns.is_empty() || self.top_concerns.len() > MAX_TOP_CONCERNS {
            return Err(format!(
                "top_concerns must contain 1 to {MAX_TOP_CONCERNS} entries (received {})",
                self.top_concerns.len()
            ));
        }
        let words = self.short_answer.split_whitespace().count();
        if words > SHORT_ANSWER_MAX_WORDS {
            return Err(format!(
                "short_answer must be {SHORT_ANSWER_MAX_WORDS} words or fewer (received {words})"
            ));
        }
        if let Some(questions) = &self.clarifying_questions
            && questions.len() > MAX_CLARIFYING_QUESTIONS
        {
            return Err(format!(
                "clarifying_questions must contain at most {MAX_CLARIFYING_QUESTIONS} entries"
            ));
        }
        Ok(())
    }

    /// Derive the heuristic-facing summary.
    pub fn summarize(&self) -> PersonaResponseSummary {
        PersonaResponseSummary {
            message: self.short_answer.clone(),
            stance: self.stance,
            objections: self
                .objections
                .iter()
                .map(|objection| ResponseObjection {
                    detail: objection.detail.clone(),
                    severity: objection.severity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseObjection {
    pub detail: String,
    pub severity: ObjectionSeverity,
}

/// Per-turn, per-persona summary consumed by the trust heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaResponseSummary {
    pub message: String,
    pub stance: Stance,
    pub objections: Vec<ResponseObjection>,
}

impl PersonaResponseSummary {
    /// Highest objection severity, `Low` when there are no objections.
    pub fn highest_severity(&self) -> ObjectionSeverity {
        self.objections
            .iter()
            .map(|objection| objection.severity)
            .max()
            .unwrap_or_default()
    }
}

/// Terminal structured summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationReport {
    pub will_buy: Stance,
    pub will_use_daily: Stance,
    /// Change in trust across the run, within [-1, 1].
    pub trust_delta: f64,
    #[serde(default)]
    pub top_objections: Vec<Objection>,
    #[serde(default)]
    pub required_proof: Vec<String>,
    #[serde(default)]
    pub recommended_next_steps: Vec<String>,
}

impl EvaluationReport {
    pub fn validate(&self) -> Result<(), String> {
        if !(-1.0..=1.0).contains(&self.trust_delta) {
            return Err(format!(
                "trust_delta must be between -1 and 1 (received {})",
                self.trust_delta
            ));
        }
        Ok(())
    }
}
