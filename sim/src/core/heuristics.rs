//! Deterministic trust/fatigue updates applied after every persona response.

use serde::{Deserialize, Serialize};

use crate::core::response::{ObjectionSeverity, PersonaResponseSummary, Stance};
use crate::core::types::PersonaMode;

pub const DEFAULT_TRUST: f64 = 0.5;
pub const DEFAULT_FATIGUE: f64 = 0.0;
pub const DEFAULT_RISK_TOLERANCE: f64 = 0.5;

const HIGH_OBJECTION_TRUST_PENALTY: f64 = 0.03;
const HIGH_OBJECTION_FATIGUE_PENALTY: f64 = 0.02;
const FATIGUE_RISK_FACTOR: f64 = 0.2;

/// Per-persona trust metrics. All fields stay within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustState {
    pub trust_score: f64,
    pub fatigue_score: f64,
    pub risk_tolerance: f64,
}

impl Default for TrustState {
    fn default() -> Self {
        Self {
            trust_score: DEFAULT_TRUST,
            fatigue_score: DEFAULT_FATIGUE,
            risk_tolerance: DEFAULT_RISK_TOLERANCE,
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Apply one response to a persona's previous trust state.
///
/// `mode` is accepted so policies can diverge per persona mode later; every
/// mode currently uses the same arithmetic.
///
/// Risk tolerance is recomputed from the *updated* fatigue and the *previous*
/// risk tolerance.
pub fn apply_persona_heuristics(
    previous: &TrustState,
    response: &PersonaResponseSummary,
    _mode: PersonaMode,
) -> TrustState {
    let mut trust = previous.trust_score;
    let mut fatigue = previous.fatigue_score;

    match response.stance {
        Stance::Yes => {
            trust += 0.05;
            fatigue -= 0.03;
        }
        Stance::Reluctant => {
            trust -= 0.02;
            fatigue += 0.02;
        }
        Stance::No => {
            trust -= 0.05;
            fatigue += 0.03;
        }
    }

    let high_objections = response
        .objections
        .iter()
        .filter(|objection| objection.severity == ObjectionSeverity::High)
        .count() as f64;
    trust -= HIGH_OBJECTION_TRUST_PENALTY * high_objections;
    fatigue += HIGH_OBJECTION_FATIGUE_PENALTY * high_objections;

    let trust = clamp_unit(trust);
    let fatigue = clamp_unit(fatigue);
    let risk_tolerance = clamp_unit(previous.risk_tolerance - fatigue * FATIGUE_RISK_FACTOR);

    TrustState {
        trust_score: trust,
        fatigue_score: fatigue,
        risk_tolerance,
    }
}
