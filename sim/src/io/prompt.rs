//! Prompt rendering for persona turns and the final evaluation.
//!
//! Templates live in `io/prompts/` and are compiled into the binary. Rendering
//! is pure: the same persona, scenario and turn always yield the same messages.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::message::ChatMessage;
use crate::core::transcript::TranscriptEvent;
use crate::core::types::{Persona, PersonaMode, Scenario, TurnInput};

const PERSONA_CONTRACT_TEMPLATE: &str = include_str!("prompts/persona_contract.md");
const PERSONA_SYSTEM_TEMPLATE: &str = include_str!("prompts/persona_system.md");
const PERSONA_USER_TEMPLATE: &str = include_str!("prompts/persona_user.md");
const EVALUATOR_SYSTEM_TEMPLATE: &str = include_str!("prompts/evaluator_system.md");
const EVALUATOR_USER_TEMPLATE: &str = include_str!("prompts/evaluator_user.md");

const NONE_LISTED: &str = "None listed";

/// Persona fields flattened for the system template.
#[derive(Debug, Clone, Serialize)]
struct PersonaBrief {
    name: String,
    role: String,
    locale: String,
    sector: String,
    incentives: String,
    fears: String,
    time_per_week_minutes: u32,
    budget_gbp: u64,
    ai_trust_level: u8,
    authority_level: &'static str,
    communication_style: String,
}

impl PersonaBrief {
    fn from_persona(persona: &Persona) -> Self {
        let constraints = &persona.constraints;
        Self {
            name: persona.name.clone(),
            role: persona.role.clone(),
            locale: persona.locale.clone(),
            sector: persona
                .sector
                .clone()
                .unwrap_or_else(|| "unspecified".to_string()),
            incentives: join_or(&persona.incentives, "; ", NONE_LISTED),
            fears: join_or(&persona.fears, "; ", NONE_LISTED),
            time_per_week_minutes: constraints.time_per_week_minutes,
            budget_gbp: constraints.budget_gbp,
            ai_trust_level: constraints.ai_trust_level,
            authority_level: constraints.authority_level.as_str(),
            communication_style: persona
                .communication_style
                .clone()
                .unwrap_or_else(|| "No specific preference stated.".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ScenarioBrief {
    id: String,
    title: String,
    context: String,
    deadline: String,
    stressors: String,
    success_criteria: String,
}

impl ScenarioBrief {
    /// Persona prompts list stressors with `; ` and `None listed`.
    fn for_persona(scenario: &Scenario) -> Self {
        Self::build(scenario, "; ", NONE_LISTED)
    }

    /// The evaluator prompt uses `, ` and `none`.
    fn for_evaluator(scenario: &Scenario) -> Self {
        Self::build(scenario, ", ", "none")
    }

    fn build(scenario: &Scenario, separator: &str, empty: &str) -> Self {
        Self {
            id: scenario.id.to_string(),
            title: scenario.title.clone(),
            context: scenario.context.clone(),
            deadline: scenario
                .deadline
                .clone()
                .unwrap_or_else(|| "not specified".to_string()),
            stressors: join_or(&scenario.stressors, separator, empty),
            success_criteria: join_or(&scenario.success_criteria, separator, empty),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct StimulusBrief<'a> {
    kind: &'static str,
    content: &'a str,
    attachments: Option<String>,
}

fn join_or(items: &[String], separator: &str, empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(separator)
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in [
            ("persona_contract", PERSONA_CONTRACT_TEMPLATE),
            ("persona_system", PERSONA_SYSTEM_TEMPLATE),
            ("persona_user", PERSONA_USER_TEMPLATE),
            ("evaluator_system", EVALUATOR_SYSTEM_TEMPLATE),
            ("evaluator_user", EVALUATOR_USER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load prompt template {name}"))?;
        }
        Ok(Self { env })
    }

    /// System prompt plus user prompt for one persona on one turn.
    pub fn persona_messages(
        &self,
        persona: &Persona,
        scenario: &Scenario,
        mode: PersonaMode,
        turn: &TurnInput,
    ) -> Result<Vec<ChatMessage>> {
        let system = self.render(
            "persona_system",
            context! {
                mode_brief => mode.brief(),
                persona => PersonaBrief::from_persona(persona),
                scenario => ScenarioBrief::for_persona(scenario),
            },
        )?;

        let stimulus = StimulusBrief {
            kind: turn.stimulus.kind.as_str(),
            content: &turn.stimulus.content,
            attachments: turn
                .stimulus
                .attachments
                .as_ref()
                .filter(|items| !items.is_empty())
                .map(|items| items.join(", ")),
        };
        let user = self.render(
            "persona_user",
            context! {
                stimulus => stimulus,
                question => turn.question.as_deref().map(str::trim).filter(|q| !q.is_empty()),
            },
        )?;

        debug!(persona = %persona.name, mode = mode.as_str(), "rendered persona prompt");
        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }

    /// Evaluator conversation covering the whole transcript.
    pub fn evaluator_messages(
        &self,
        transcript: &[TranscriptEvent],
        personas: &[Persona],
        scenario: &Scenario,
    ) -> Result<Vec<ChatMessage>> {
        let system = self.render("evaluator_system", context! {})?;
        let user = self.render(
            "evaluator_user",
            context! {
                personas => personas,
                scenario => ScenarioBrief::for_evaluator(scenario),
                events => transcript,
            },
        )?;
        debug!(
            events = transcript.len(),
            personas = personas.len(),
            "rendered evaluator prompt"
        );
        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render prompt template {name}"))?;
        Ok(rendered.trim().to_string())
    }
}
