//! Run orchestrator: validate requests, run the state machine, map failures.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::heuristics::TrustState;
use crate::core::replay::replay_trust;
use crate::core::routing::plan_turns;
use crate::core::state::RunState;
use crate::core::types::{RunConfig, RunMode};
use crate::error::SimError;
use crate::io::config::SimConfig;
use crate::io::prompt::PromptEngine;
use crate::io::request::RunRequest;
use crate::io::responder::{EvaluationResponder, PersonaResponder};
use crate::io::store::{RunStatus, RunStore, StoredRun};
use crate::machine::RunMachine;

const MIN_AI_TRUST_LEVEL: u8 = 1;
const MAX_AI_TRUST_LEVEL: u8 = 5;

/// Model settings applied to every run started by a service.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub model_name: String,
    pub temperature: f64,
    pub structured_attempts: usize,
}

impl RunSettings {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            structured_attempts: config.structured_attempts,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

/// Entry point for starting and retrieving runs.
///
/// All per-run state lives in the `RunState` built by `simulate`, so one
/// service can drive several runs concurrently when its collaborators are
/// `Sync`.
pub struct SimulationService<P, E, S> {
    persona_responder: P,
    evaluation_responder: E,
    store: S,
    prompts: PromptEngine,
    settings: RunSettings,
}

impl<P, E, S> SimulationService<P, E, S>
where
    P: PersonaResponder,
    E: EvaluationResponder,
    S: RunStore,
{
    pub fn new(
        persona_responder: P,
        evaluation_responder: E,
        store: S,
        settings: RunSettings,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            persona_responder,
            evaluation_responder,
            store,
            prompts: PromptEngine::new()?,
            settings,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a simulation to completion and return its id.
    pub fn start_run(&self, request: RunRequest) -> Result<Uuid, SimError> {
        self.simulate(request).map(|state| state.run_id)
    }

    /// Run a simulation to completion and return the final run state.
    #[instrument(skip_all, fields(run_mode = %request.run_mode, steps = request.steps))]
    pub fn simulate(&self, request: RunRequest) -> Result<RunState, SimError> {
        let mode = validate_request(&request)?;
        let run_id = Uuid::new_v4();
        // `validate_request` guarantees steps >= 1.
        let steps = usize::try_from(request.steps)
            .map_err(|_| SimError::Validation(format!("steps out of range: {}", request.steps)))?;
        let config = RunConfig {
            run_id,
            model_name: self.settings.model_name.clone(),
            temperature: self.settings.temperature,
            mode,
            turns: plan_turns(&request.stimuli, steps),
            persona_modes: request.persona_modes,
        };
        info!(%run_id, personas = request.personas.len(), turns = config.turns.len(), "starting run");

        let state = RunState::new(run_id, request.scenario, request.personas);
        let machine = RunMachine::new(
            &self.persona_responder,
            &self.evaluation_responder,
            &self.store,
            &self.prompts,
            self.settings.structured_attempts,
        );

        match machine.run(state, &config) {
            Ok(done) => Ok(done),
            Err(err) => {
                warn!(%run_id, err = %format!("{err:#}"), "run failed");
                self.mark_failed(run_id);
                Err(SimError::RunFailed {
                    run_id,
                    source: err,
                })
            }
        }
    }

    /// Best-effort: the machine failure already dominates, so errors here are only logged.
    fn mark_failed(&self, run_id: Uuid) {
        if let Err(err) = self.store.set_status(run_id, RunStatus::Failed) {
            warn!(%run_id, err = %format!("{err:#}"), "could not mark run failed");
        }
    }

    pub fn get_run(&self, run_id: Uuid) -> Result<StoredRun, SimError> {
        self.store
            .get_run(run_id)
            .map_err(SimError::Store)?
            .ok_or(SimError::NotFound(run_id))
    }

    /// Rebuild every persona's trust state from a stored run's transcript.
    pub fn replay_trust(&self, run_id: Uuid) -> Result<BTreeMap<Uuid, TrustState>, SimError> {
        let run = self.get_run(run_id)?;
        replay_trust(&run.record.personas, &run.transcript)
            .map_err(|err| SimError::Store(anyhow::anyhow!("replay run {run_id}: {err}")))
    }
}

fn validate_request(request: &RunRequest) -> Result<RunMode, SimError> {
    if request.personas.is_empty() {
        return Err(SimError::Validation(
            "at least one persona is required".to_string(),
        ));
    }
    if request.stimuli.is_empty() {
        return Err(SimError::Validation(
            "at least one stimulus is required".to_string(),
        ));
    }
    if request.steps <= 0 {
        return Err(SimError::Validation(format!(
            "steps must be positive (received {})",
            request.steps
        )));
    }
    let mode = request
        .run_mode
        .parse::<RunMode>()
        .map_err(SimError::Validation)?;
    for persona in &request.personas {
        let level = persona.constraints.ai_trust_level;
        if !(MIN_AI_TRUST_LEVEL..=MAX_AI_TRUST_LEVEL).contains(&level) {
            return Err(SimError::Validation(format!(
                "persona {} ai_trust_level must be within {MIN_AI_TRUST_LEVEL}..={MAX_AI_TRUST_LEVEL} (received {level})",
                persona.id
            )));
        }
    }
    Ok(mode)
}
