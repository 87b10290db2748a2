//! Fixtures and scripted collaborators for unit and integration tests.
//!
//! Compiled for this crate's own tests and, through the `test-support`
//! feature, for the integration tests under `tests/`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use uuid::Uuid;

use crate::core::message::ChatMessage;
use crate::core::response::{
    EvaluationReport, Objection, ObjectionCategory, ObjectionSeverity, PersonaResponsePayload,
    Stance,
};
use crate::core::transcript::TranscriptEvent;
use crate::core::types::{
    AuthorityLevel, Persona, PersonaConstraints, RunMode, Scenario, Stimulus, StimulusType,
};
use crate::io::request::RunRequest;
use crate::io::responder::{EvaluationResponder, PersonaResponder};
use crate::io::store::{FileRunStore, RunRecord, RunStatus, RunStore, StoredRun, UnknownRunError};
use crate::io::structured::Reply;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persona with a fresh id and deterministic profile fields.
pub fn persona(name: &str) -> Persona {
    Persona {
        id: Uuid::new_v4(),
        name: name.to_string(),
        role: "Head of Operations".to_string(),
        sector: Some("Financial services".to_string()),
        locale: "UK".to_string(),
        incentives: Vec::new(),
        fears: Vec::new(),
        constraints: PersonaConstraints {
            time_per_week_minutes: 180,
            budget_gbp: 50_000,
            ai_trust_level: 3,
            authority_level: AuthorityLevel::Medium,
        },
        communication_style: None,
    }
}

pub fn scenario() -> Scenario {
    Scenario {
        id: Uuid::new_v4(),
        title: "Quarter-end audit".to_string(),
        context: "The compliance team prepares for a regulator audit with a thin team."
            .to_string(),
        deadline: None,
        stressors: vec!["headcount freeze".to_string()],
        success_criteria: vec!["audit passes first time".to_string()],
    }
}

/// Feature stimulus without question or attachments.
pub fn stimulus(content: &str) -> Stimulus {
    Stimulus {
        kind: StimulusType::Feature,
        content: content.to_string(),
        question: None,
        attachments: None,
    }
}

/// Valid persona payload with one objection per entry in `severities`.
pub fn payload(stance: Stance, severities: &[ObjectionSeverity]) -> PersonaResponsePayload {
    PersonaResponsePayload {
        stance,
        top_concerns: vec!["cost".to_string()],
        objections: severities
            .iter()
            .enumerate()
            .map(|(idx, severity)| Objection {
                category: ObjectionCategory::Risk,
                detail: format!("objection {}", idx + 1),
                severity: *severity,
            })
            .collect(),
        required_proof: vec!["reference customer".to_string()],
        short_answer: format!("My answer is {}.", stance.as_str()),
        clarifying_questions: None,
    }
}

pub fn report(trust_delta: f64) -> EvaluationReport {
    EvaluationReport {
        will_buy: Stance::Reluctant,
        will_use_daily: Stance::Yes,
        trust_delta,
        top_objections: vec![Objection {
            category: ObjectionCategory::Cost,
            detail: "budget already committed".to_string(),
            severity: ObjectionSeverity::Medium,
        }],
        required_proof: vec!["pilot results".to_string()],
        recommended_next_steps: vec!["offer a 30-day pilot".to_string()],
    }
}

pub fn run_record(personas: Vec<Persona>) -> RunRecord {
    RunRecord {
        run_id: Uuid::new_v4(),
        scenario: scenario(),
        personas,
        mode: RunMode::SingleTurn,
        model_name: "gpt-4o-mini".to_string(),
        temperature: 0.3,
        status: RunStatus::Running,
        created_at: "2024-01-01T00:00:00+00:00".to_string(),
    }
}

pub fn run_request(
    personas: Vec<Persona>,
    stimuli: Vec<Stimulus>,
    run_mode: &str,
    steps: i64,
) -> RunRequest {
    RunRequest {
        scenario: scenario(),
        personas,
        stimuli,
        run_mode: run_mode.to_string(),
        steps,
        persona_modes: BTreeMap::new(),
    }
}

/// File-backed store rooted in a fresh temp dir. Keep the guard alive.
pub fn temp_store() -> (tempfile::TempDir, FileRunStore) {
    let temp = tempfile::tempdir().unwrap_or_else(|err| panic!("create tempdir: {err}"));
    let store = FileRunStore::new(temp.path().join("runs"));
    (temp, store)
}

/// One persona responder invocation.
#[derive(Debug, Clone)]
pub struct PersonaCall {
    pub messages: Vec<ChatMessage>,
    pub model_name: String,
    pub temperature: f64,
}

enum Script<T> {
    Queue(VecDeque<Result<T>>),
    Repeat(T),
    Fail(String),
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Result<T> {
        match self {
            Script::Queue(queue) => queue
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("scripted responder exhausted"))),
            Script::Repeat(value) => Ok(value.clone()),
            Script::Fail(message) => Err(anyhow!("{message}")),
        }
    }

    fn remaining(&self) -> usize {
        match self {
            Script::Queue(queue) => queue.len(),
            Script::Repeat(_) | Script::Fail(_) => 0,
        }
    }
}

/// Persona responder replaying a script and recording every call.
pub struct ScriptedPersonaResponder {
    script: Mutex<Script<Reply<PersonaResponsePayload>>>,
    calls: Mutex<Vec<PersonaCall>>,
}

impl ScriptedPersonaResponder {
    fn with_script(script: Script<Reply<PersonaResponsePayload>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order; errors once the queue is empty.
    pub fn new(replies: Vec<Result<Reply<PersonaResponsePayload>>>) -> Self {
        Self::with_script(Script::Queue(replies.into()))
    }

    /// Returns `payload` as a typed reply on every call.
    pub fn repeating(payload: PersonaResponsePayload) -> Self {
        Self::with_script(Script::Repeat(Reply::Typed(payload)))
    }

    /// Fails every call with a transport error.
    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    pub fn calls(&self) -> Vec<PersonaCall> {
        lock(&self.calls).clone()
    }

    pub fn assert_drained(&self) {
        let remaining = lock(&self.script).remaining();
        assert_eq!(remaining, 0, "scripted persona replies left unused");
    }
}

impl PersonaResponder for ScriptedPersonaResponder {
    fn respond(
        &self,
        messages: &[ChatMessage],
        model_name: &str,
        temperature: f64,
    ) -> Result<Reply<PersonaResponsePayload>> {
        lock(&self.calls).push(PersonaCall {
            messages: messages.to_vec(),
            model_name: model_name.to_string(),
            temperature,
        });
        lock(&self.script).next()
    }
}

/// Evaluation responder replaying a script and recording every conversation.
pub struct ScriptedEvaluationResponder {
    script: Mutex<Script<EvaluationReport>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedEvaluationResponder {
    fn with_script(script: Script<EvaluationReport>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn new(reports: Vec<Result<EvaluationReport>>) -> Self {
        Self::with_script(Script::Queue(reports.into()))
    }

    pub fn repeating(report: EvaluationReport) -> Self {
        Self::with_script(Script::Repeat(report))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.calls).clone()
    }

    pub fn assert_drained(&self) {
        let remaining = lock(&self.script).remaining();
        assert_eq!(remaining, 0, "scripted evaluation reports left unused");
    }
}

impl EvaluationResponder for ScriptedEvaluationResponder {
    fn evaluate(&self, messages: &[ChatMessage]) -> Result<EvaluationReport> {
        lock(&self.calls).push(messages.to_vec());
        lock(&self.script).next()
    }
}

/// In-memory [`RunStore`] with status history and failure injection.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<BTreeMap<Uuid, StoredRun>>,
    statuses: Mutex<BTreeMap<Uuid, Vec<RunStatus>>>,
    fail_events: bool,
    fail_status: bool,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `add_event` fails.
    pub fn with_failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    /// Every `set_status` fails.
    pub fn with_failing_status(mut self) -> Self {
        self.fail_status = true;
        self
    }

    pub fn run_ids(&self) -> Vec<Uuid> {
        lock(&self.runs).keys().copied().collect()
    }

    /// Every status the run has held, starting with its creation status.
    pub fn status_history(&self, run_id: Uuid) -> Vec<RunStatus> {
        lock(&self.statuses)
            .get(&run_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl RunStore for MemoryRunStore {
    fn create_run(&self, record: &RunRecord) -> Result<()> {
        let mut runs = lock(&self.runs);
        if runs.contains_key(&record.run_id) {
            return Err(anyhow!("run {} already exists", record.run_id));
        }
        runs.insert(
            record.run_id,
            StoredRun {
                record: record.clone(),
                transcript: Vec::new(),
                evaluation: None,
            },
        );
        lock(&self.statuses).insert(record.run_id, vec![record.status]);
        Ok(())
    }

    fn add_event(&self, run_id: Uuid, event: &TranscriptEvent) -> Result<()> {
        if self.fail_events {
            return Err(anyhow!("event log unavailable"));
        }
        let mut runs = lock(&self.runs);
        let run = runs.get_mut(&run_id).ok_or(UnknownRunError(run_id))?;
        run.transcript.push(event.clone());
        Ok(())
    }

    fn set_status(&self, run_id: Uuid, status: RunStatus) -> Result<()> {
        if self.fail_status {
            return Err(anyhow!("status table unavailable"));
        }
        let mut runs = lock(&self.runs);
        let run = runs.get_mut(&run_id).ok_or(UnknownRunError(run_id))?;
        run.record.status = status;
        lock(&self.statuses).entry(run_id).or_default().push(status);
        Ok(())
    }

    fn save_evaluation(&self, run_id: Uuid, report: &EvaluationReport) -> Result<()> {
        let mut runs = lock(&self.runs);
        let run = runs.get_mut(&run_id).ok_or(UnknownRunError(run_id))?;
        run.evaluation = Some(report.clone());
        Ok(())
    }

    fn get_run(&self, run_id: Uuid) -> Result<Option<StoredRun>> {
        Ok(lock(&self.runs).get(&run_id).cloned())
    }
}
