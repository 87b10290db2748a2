//! Rebuild persona trust states from a persisted transcript.
//!
//! Answer events carry the persona id, the resolved persona mode and the raw
//! response payload, so replaying them in order through the heuristics yields
//! exactly the trust map the state machine ended with.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::core::heuristics::{TrustState, apply_persona_heuristics};
use crate::core::response::PersonaResponsePayload;
use crate::core::transcript::{
    META_PERSONA_ID, META_PERSONA_MODE, META_RAW, TranscriptEvent, TranscriptEventType,
};
use crate::core::types::{Persona, PersonaMode};

/// Replay every answer event in `transcript` on top of default trust states.
///
/// Returns a description of the first malformed answer event, if any.
pub fn replay_trust(
    personas: &[Persona],
    transcript: &[TranscriptEvent],
) -> Result<BTreeMap<Uuid, TrustState>, String> {
    let mut trust: BTreeMap<Uuid, TrustState> = personas
        .iter()
        .map(|persona| (persona.id, TrustState::default()))
        .collect();

    for (index, event) in transcript.iter().enumerate() {
        if event.event_type != TranscriptEventType::Answer {
            continue;
        }
        let persona_id: Uuid = meta_value(event, META_PERSONA_ID)
            .map_err(|err| format!("transcript[{index}]: {err}"))?;
        let mode: PersonaMode = meta_value(event, META_PERSONA_MODE)
            .map_err(|err| format!("transcript[{index}]: {err}"))?;
        let payload: PersonaResponsePayload =
            meta_value(event, META_RAW).map_err(|err| format!("transcript[{index}]: {err}"))?;

        let previous = trust.get(&persona_id).copied().unwrap_or_default();
        let next = apply_persona_heuristics(&previous, &payload.summarize(), mode);
        trust.insert(persona_id, next);
    }

    Ok(trust)
}

fn meta_value<T: DeserializeOwned>(event: &TranscriptEvent, key: &str) -> Result<T, String> {
    let value = event
        .meta_field(key)
        .ok_or_else(|| format!("answer event missing meta.{key}"))?;
    serde_json::from_value(value.clone()).map_err(|err| format!("invalid meta.{key}: {err}"))
}
