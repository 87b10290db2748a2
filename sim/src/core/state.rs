//! Run-state snapshot threaded through the state machine.
//!
//! Every transition takes a `RunState` by value and returns the next one; no
//! sub-structure is shared between snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::heuristics::{TrustState, apply_persona_heuristics};
use crate::core::response::{EvaluationReport, ObjectionSeverity, PersonaResponseSummary, Stance};
use crate::core::transcript::TranscriptEvent;
use crate::core::types::{Persona, PersonaMode, Scenario};

/// Response captured for one persona during the active turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaTurnResponse {
    pub persona_id: Uuid,
    pub persona_mode: PersonaMode,
    pub content: String,
    pub summary: PersonaResponseSummary,
    pub stance: Stance,
    /// Highest objection severity in `summary`.
    pub objection_severity: ObjectionSeverity,
}

impl PersonaTurnResponse {
    pub fn new(
        persona_id: Uuid,
        persona_mode: PersonaMode,
        summary: PersonaResponseSummary,
    ) -> Self {
        Self {
            persona_id,
            persona_mode,
            content: summary.message.clone(),
            stance: summary.stance,
            objection_severity: summary.highest_severity(),
            summary,
        }
    }
}

/// Full mutable snapshot of a run in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub scenario: Scenario,
    pub personas: Vec<Persona>,
    pub trust: BTreeMap<Uuid, TrustState>,
    pub transcript: Vec<TranscriptEvent>,
    pub evaluation: Option<EvaluationReport>,
    /// Zero-based index of the next turn to execute.
    pub current_turn: usize,
    /// Responses collected by the most recent turn.
    pub latest_responses: Vec<PersonaTurnResponse>,
}

impl RunState {
    pub fn new(run_id: Uuid, scenario: Scenario, personas: Vec<Persona>) -> Self {
        Self {
            run_id,
            scenario,
            personas,
            trust: BTreeMap::new(),
            transcript: Vec::new(),
            evaluation: None,
            current_turn: 0,
            latest_responses: Vec::new(),
        }
    }

    /// Seed default trust for every persona not tracked yet.
    pub fn seed_trust(mut self) -> Self {
        for persona in &self.personas {
            self.trust.entry(persona.id).or_default();
        }
        self
    }

    pub fn push_event(mut self, event: TranscriptEvent) -> Self {
        self.transcript.push(event);
        self
    }

    /// Apply the trust heuristics for every response of the latest turn and
    /// advance the turn counter.
    pub fn apply_latest_responses(mut self) -> Self {
        for response in &self.latest_responses {
            let previous = self
                .trust
                .get(&response.persona_id)
                .copied()
                .unwrap_or_default();
            let next =
                apply_persona_heuristics(&previous, &response.summary, response.persona_mode);
            self.trust.insert(response.persona_id, next);
        }
        self.current_turn += 1;
        self
    }

    pub fn with_evaluation(mut self, report: EvaluationReport) -> Self {
        self.evaluation = Some(report);
        self
    }
}
