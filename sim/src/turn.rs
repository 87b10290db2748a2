//! Turn executor: present one stimulus to every persona and collect replies.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use crate::core::response::PersonaResponsePayload;
use crate::core::routing::{resolve_persona_mode, turn_input};
use crate::core::state::{PersonaTurnResponse, RunState};
use crate::core::transcript::{
    META_PERSONA_ID, META_PERSONA_MODE, META_RAW, META_SEVERITY, META_STANCE, META_STEP,
    TranscriptEvent, TranscriptEventType,
};
use crate::core::types::{Persona, RunConfig, Stimulus};
use crate::io::prompt::PromptEngine;
use crate::io::responder::PersonaResponder;
use crate::io::structured::invoke_structured;

/// RFC 3339 UTC timestamp for transcript events.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// `Stimulus (<type>): <content>.` plus an attachment list when present.
pub fn stimulus_summary(stimulus: &Stimulus) -> String {
    let attachments = stimulus
        .attachments
        .as_ref()
        .filter(|items| !items.is_empty())
        .map(|items| format!(" Attachments: {}.", items.join(", ")))
        .unwrap_or_default();
    format!(
        "Stimulus ({}): {}.{attachments}",
        stimulus.kind.as_str(),
        stimulus.content
    )
}

fn question_content(summary: &str, question: Option<&str>) -> String {
    match question.filter(|q| !q.is_empty()) {
        Some(question) => format!("{summary}\nQuestion: {question}"),
        None => summary.to_string(),
    }
}

fn step_meta(step: usize) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert(META_STEP.to_string(), json!(step));
    meta
}

/// Runs single turns against a persona responder.
pub struct TurnExecutor<'a, P> {
    responder: &'a P,
    prompts: &'a PromptEngine,
    max_attempts: usize,
}

impl<'a, P: PersonaResponder> TurnExecutor<'a, P> {
    pub fn new(responder: &'a P, prompts: &'a PromptEngine, max_attempts: usize) -> Self {
        Self {
            responder,
            prompts,
            max_attempts,
        }
    }

    /// Execute the turn at `state.current_turn`.
    ///
    /// Appends one question event, then one answer event per persona in roster
    /// order, and replaces `latest_responses`. Trust is left untouched. Returns
    /// `state` unchanged when the turn is beyond the mode's limit or no turn
    /// input exists.
    #[instrument(skip_all, fields(run_id = %state.run_id, turn = state.current_turn))]
    pub fn execute(&self, state: RunState, config: &RunConfig) -> Result<RunState> {
        let Some(turn) = turn_input(state.current_turn, config) else {
            debug!("no turn input for this turn; skipping");
            return Ok(state);
        };
        let step = state.current_turn + 1;
        info!(step, personas = state.personas.len(), "executing turn");

        let summary = stimulus_summary(&turn.stimulus);
        let mut events = vec![
            TranscriptEvent::system(
                timestamp(),
                TranscriptEventType::Question,
                &question_content(&summary, turn.question.as_deref()),
            )
            .with_meta(step_meta(step)),
        ];
        let mut responses = Vec::with_capacity(state.personas.len());

        for persona in &state.personas {
            let mode = resolve_persona_mode(persona.id, &state.personas, &config.persona_modes);
            let messages = self
                .prompts
                .persona_messages(persona, &state.scenario, mode, turn)?;
            let payload: PersonaResponsePayload =
                invoke_structured(&messages, self.max_attempts, |conversation| {
                    self.responder
                        .respond(conversation, &config.model_name, config.temperature)
                })
                .with_context(|| {
                    format!("persona {} ({}) on turn {step}", persona.name, persona.id)
                })?;

            let response = PersonaTurnResponse::new(persona.id, mode, payload.summarize());
            events.push(answer_event(persona, &payload, &response, step)?);
            debug!(
                persona = %persona.name,
                stance = response.stance.as_str(),
                severity = response.objection_severity.as_str(),
                "persona answered"
            );
            responses.push(response);
        }

        let mut next = events
            .into_iter()
            .fold(state, |state, event| state.push_event(event));
        next.latest_responses = responses;
        Ok(next)
    }
}

fn answer_event(
    persona: &Persona,
    payload: &PersonaResponsePayload,
    response: &PersonaTurnResponse,
    step: usize,
) -> Result<TranscriptEvent> {
    let mut meta = step_meta(step);
    meta.insert(META_PERSONA_ID.to_string(), json!(persona.id));
    meta.insert(META_PERSONA_MODE.to_string(), json!(response.persona_mode));
    meta.insert(META_STANCE.to_string(), json!(response.stance));
    meta.insert(META_SEVERITY.to_string(), json!(response.objection_severity));
    meta.insert(
        META_RAW.to_string(),
        serde_json::to_value(payload).context("serialize persona payload")?,
    );
    Ok(TranscriptEvent {
        timestamp: timestamp(),
        actor: persona.name.clone(),
        event_type: TranscriptEventType::Answer,
        content: response.content.clone(),
        meta: Some(meta),
    })
}
