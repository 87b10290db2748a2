//! Run state machine: `init -> respond -> update -> (respond | evaluate) -> persist -> done`.
//!
//! Each phase consumes the current [`RunState`] and returns the next one. Any
//! error aborts the machine; marking the run failed is the caller's job.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::routing::{Route, route_after_update};
use crate::core::state::RunState;
use crate::core::transcript::{TranscriptEvent, TranscriptEventType};
use crate::core::types::RunConfig;
use crate::io::prompt::PromptEngine;
use crate::io::responder::{EvaluationResponder, PersonaResponder};
use crate::io::store::{RunRecord, RunStatus, RunStore};
use crate::turn::{TurnExecutor, timestamp};

pub const STARTED_MESSAGE: &str = "Simulation started";
pub const EVALUATED_MESSAGE: &str = "Evaluation completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Respond,
    Update,
    Evaluate,
    Persist,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Respond => "respond",
            Phase::Update => "update",
            Phase::Evaluate => "evaluate",
            Phase::Persist => "persist",
            Phase::Done => "done",
        }
    }
}

/// Collaborators the machine drives. Borrowed for the length of one run.
pub struct RunMachine<'a, P, E, S> {
    turns: TurnExecutor<'a, P>,
    evaluator: &'a E,
    store: &'a S,
    prompts: &'a PromptEngine,
}

impl<'a, P, E, S> RunMachine<'a, P, E, S>
where
    P: PersonaResponder,
    E: EvaluationResponder,
    S: RunStore,
{
    pub fn new(
        persona_responder: &'a P,
        evaluator: &'a E,
        store: &'a S,
        prompts: &'a PromptEngine,
        max_attempts: usize,
    ) -> Self {
        Self {
            turns: TurnExecutor::new(persona_responder, prompts, max_attempts),
            evaluator,
            store,
            prompts,
        }
    }

    /// Drive `state` from `init` to `done`.
    #[instrument(skip_all, fields(run_id = %config.run_id, mode = %config.mode))]
    pub fn run(&self, state: RunState, config: &RunConfig) -> Result<RunState> {
        let mut phase = Phase::Init;
        let mut state = state;
        while phase != Phase::Done {
            let (next_state, next_phase) = self.step(phase, state, config)?;
            debug!(
                from = phase.as_str(),
                to = next_phase.as_str(),
                "phase transition"
            );
            state = next_state;
            phase = next_phase;
        }
        info!(
            turns = state.current_turn,
            events = state.transcript.len(),
            "run completed"
        );
        Ok(state)
    }

    /// Execute one phase and decide the next.
    pub fn step(
        &self,
        phase: Phase,
        state: RunState,
        config: &RunConfig,
    ) -> Result<(RunState, Phase)> {
        match phase {
            Phase::Init => Ok((self.init(state, config)?, Phase::Respond)),
            Phase::Respond => Ok((self.turns.execute(state, config)?, Phase::Update)),
            Phase::Update => {
                let next = state.apply_latest_responses();
                let route = match route_after_update(next.current_turn, config) {
                    Route::Continue => Phase::Respond,
                    Route::Evaluate => Phase::Evaluate,
                };
                Ok((next, route))
            }
            Phase::Evaluate => Ok((self.evaluate(state)?, Phase::Persist)),
            Phase::Persist => Ok((self.persist(state)?, Phase::Done)),
            Phase::Done => Ok((state, Phase::Done)),
        }
    }

    fn init(&self, state: RunState, config: &RunConfig) -> Result<RunState> {
        let state = state.seed_trust().push_event(TranscriptEvent::system(
            timestamp(),
            TranscriptEventType::System,
            STARTED_MESSAGE,
        ));
        let record = RunRecord {
            run_id: state.run_id,
            scenario: state.scenario.clone(),
            personas: state.personas.clone(),
            mode: config.mode,
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            status: RunStatus::Running,
            created_at: timestamp(),
        };
        self.store
            .create_run(&record)
            .context("record run start")?;
        Ok(state)
    }

    fn evaluate(&self, state: RunState) -> Result<RunState> {
        let messages =
            self.prompts
                .evaluator_messages(&state.transcript, &state.personas, &state.scenario)?;
        let report = self
            .evaluator
            .evaluate(&messages)
            .context("evaluate run")?;
        report
            .validate()
            .map_err(|err| anyhow!("invalid evaluation report: {err}"))?;

        let meta = match serde_json::to_value(&report).context("serialize evaluation report")? {
            Value::Object(map) => map,
            other => return Err(anyhow!("evaluation report serialized as {other}")),
        };
        info!(
            will_buy = report.will_buy.as_str(),
            trust_delta = report.trust_delta,
            "run evaluated"
        );
        let event = TranscriptEvent::system(
            timestamp(),
            TranscriptEventType::Evaluation,
            EVALUATED_MESSAGE,
        )
        .with_meta(meta);
        Ok(state.push_event(event).with_evaluation(report))
    }

    fn persist(&self, state: RunState) -> Result<RunState> {
        for event in &state.transcript {
            self.store
                .add_event(state.run_id, event)
                .context("persist transcript event")?;
        }
        if let Some(report) = &state.evaluation {
            self.store
                .save_evaluation(state.run_id, report)
                .context("persist evaluation report")?;
        }
        self.store
            .set_status(state.run_id, RunStatus::Completed)
            .context("mark run completed")?;
        Ok(state)
    }
}
