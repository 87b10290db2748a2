//! Shared deterministic types for simulation inputs and run configuration.
//!
//! Scenarios, personas and stimuli are supplied by the caller and never mutated
//! during a run. `RunConfig` is fixed at run start.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Situation every persona reacts within.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    pub title: String,
    /// Narrative context setting for the scenario.
    pub context: String,
    /// Optional ISO-8601 deadline.
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub stressors: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

/// Decision-making authority of a persona within their organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityLevel {
    Low,
    Medium,
    High,
}

impl AuthorityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityLevel::Low => "low",
            AuthorityLevel::Medium => "medium",
            AuthorityLevel::High => "high",
        }
    }
}

/// Operational constraints shaping how a persona reacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaConstraints {
    /// Weekly time budget in minutes.
    pub time_per_week_minutes: u32,
    /// Monetary budget in GBP.
    pub budget_gbp: u64,
    /// Trust-proneness towards AI tooling on a 1-5 scale.
    pub ai_trust_level: u8,
    pub authority_level: AuthorityLevel,
}

/// Synthetic stakeholder profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub incentives: Vec<String>,
    #[serde(default)]
    pub fears: Vec<String>,
    pub constraints: PersonaConstraints,
    #[serde(default)]
    pub communication_style: Option<String>,
}

fn default_locale() -> String {
    "UK".to_string()
}

/// Category of stimulus presented to the personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusType {
    Feature,
    Pricing,
    Message,
    Incident,
}

impl StimulusType {
    pub fn as_str(self) -> &'static str {
        match self {
            StimulusType::Feature => "feature",
            StimulusType::Pricing => "pricing",
            StimulusType::Message => "message",
            StimulusType::Incident => "incident",
        }
    }
}

/// Input unit shared identically by every persona within a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stimulus {
    #[serde(rename = "type")]
    pub kind: StimulusType,
    pub content: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Execution mode for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    #[serde(rename = "single-turn")]
    SingleTurn,
    #[serde(rename = "multi-turn")]
    MultiTurn,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::SingleTurn => "single-turn",
            RunMode::MultiTurn => "multi-turn",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "single-turn" => Ok(RunMode::SingleTurn),
            "multi-turn" => Ok(RunMode::MultiTurn),
            other => Err(format!(
                "unsupported run mode '{other}' (expected single-turn or multi-turn)"
            )),
        }
    }
}

/// Prompt role a persona plays for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaMode {
    EconomicBuyer,
    DailyUser,
    AntiPersona,
}

impl PersonaMode {
    /// Round-robin order used when a persona has no explicit override.
    pub const FALLBACK_ORDER: [PersonaMode; 3] = [
        PersonaMode::EconomicBuyer,
        PersonaMode::DailyUser,
        PersonaMode::AntiPersona,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PersonaMode::EconomicBuyer => "economic_buyer",
            PersonaMode::DailyUser => "daily_user",
            PersonaMode::AntiPersona => "anti_persona",
        }
    }

    /// One-line role brief injected into the persona system prompt.
    pub fn brief(self) -> &'static str {
        match self {
            PersonaMode::EconomicBuyer => {
                "You are the economic buyer who cares most about ROI, compliance, and contract risk."
            }
            PersonaMode::DailyUser => {
                "You are the daily user who cares most about usability, stability, and workflow fit."
            }
            PersonaMode::AntiPersona => {
                "You are an anti-persona who is skeptical, risk-averse, and resistant to adoption."
            }
        }
    }
}

/// One stimulus plus an optional question, executed as a single turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInput {
    pub stimulus: Stimulus,
    #[serde(default)]
    pub question: Option<String>,
}

/// Static configuration for a run. Never mutated once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: Uuid,
    pub model_name: String,
    pub temperature: f64,
    pub mode: RunMode,
    /// Ordered turn inputs. Single-turn mode only uses the first entry.
    pub turns: Vec<TurnInput>,
    /// Explicit persona-mode overrides keyed by persona id.
    #[serde(default)]
    pub persona_modes: BTreeMap<Uuid, PersonaMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_parses_known_values_only() {
        assert_eq!(
            "single-turn".parse::<RunMode>().expect("single"),
            RunMode::SingleTurn
        );
        assert_eq!(
            "multi-turn".parse::<RunMode>().expect("multi"),
            RunMode::MultiTurn
        );
        let err = "batch".parse::<RunMode>().unwrap_err();
        assert!(err.contains("unsupported run mode 'batch'"));
    }

    #[test]
    fn stimulus_uses_type_field_on_the_wire() {
        let stimulus: Stimulus =
            serde_json::from_str(r#"{"type":"pricing","content":"Pilot at 18k"}"#)
                .expect("parse stimulus");
        assert_eq!(stimulus.kind, StimulusType::Pricing);
        assert!(stimulus.question.is_none());
        assert!(stimulus.attachments.is_none());
    }

    #[test]
    fn persona_locale_defaults_to_uk() {
        let persona: Persona = serde_json::from_value(serde_json::json!({
            "id": "2fdab821-76d6-4c04-9a4b-6bc0099ae0b0",
            "name": "Priya Desai",
            "role": "Head of Compliance Technology",
            "constraints": {
                "time_per_week_minutes": 180,
                "budget_gbp": 75000,
                "ai_trust_level": 3,
                "authority_level": "high"
            }
        }))
        .expect("parse persona");
        assert_eq!(persona.locale, "UK");
        assert_eq!(persona.constraints.authority_level, AuthorityLevel::High);
    }
}
