//! Turn planning and routing decisions for the run state machine.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::core::types::{Persona, PersonaMode, RunConfig, RunMode, Stimulus, TurnInput};

/// Where the machine goes after the `update` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run another turn.
    Continue,
    /// All turns are done; evaluate the run.
    Evaluate,
}

/// Number of turns a run executes: 1 in single-turn mode, otherwise the
/// configured turn count (at least 1).
pub fn max_turns(config: &RunConfig) -> usize {
    match config.mode {
        RunMode::SingleTurn => 1,
        RunMode::MultiTurn => config.turns.len().max(1),
    }
}

pub fn route_after_update(current_turn: usize, config: &RunConfig) -> Route {
    if current_turn < max_turns(config) {
        Route::Continue
    } else {
        Route::Evaluate
    }
}

/// Turn input for `current_turn`, or `None` when the turn must be skipped.
pub fn turn_input(current_turn: usize, config: &RunConfig) -> Option<&TurnInput> {
    if current_turn >= max_turns(config) {
        return None;
    }
    config.turns.get(current_turn)
}

/// Build one turn per step, repeating the last stimulus once the list runs out.
///
/// Returns an empty plan when `stimuli` is empty.
pub fn plan_turns(stimuli: &[Stimulus], steps: usize) -> Vec<TurnInput> {
    let Some(last) = stimuli.len().checked_sub(1) else {
        return Vec::new();
    };
    (0..steps)
        .map(|idx| {
            let stimulus = stimuli[idx.min(last)].clone();
            TurnInput {
                question: stimulus.question.clone(),
                stimulus,
            }
        })
        .collect()
}

/// Resolve the prompt mode for a persona.
///
/// Explicit overrides win. Otherwise the mode is picked round-robin by the
/// persona's position in the roster (first match for duplicated ids, position 0
/// for unknown ids).
pub fn resolve_persona_mode(
    persona_id: Uuid,
    personas: &[Persona],
    overrides: &BTreeMap<Uuid, PersonaMode>,
) -> PersonaMode {
    if let Some(mode) = overrides.get(&persona_id) {
        return *mode;
    }
    let index = personas
        .iter()
        .position(|persona| persona.id == persona_id)
        .unwrap_or(0);
    PersonaMode::FALLBACK_ORDER[index % PersonaMode::FALLBACK_ORDER.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{persona, stimulus};

    fn config(mode: RunMode, turns: usize) -> RunConfig {
        RunConfig {
            run_id: Uuid::nil(),
            model_name: "model".to_string(),
            temperature: 0.3,
            mode,
            turns: plan_turns(&[stimulus("A")], turns),
            persona_modes: BTreeMap::new(),
        }
    }

    #[test]
    fn single_turn_caps_at_one_turn() {
        let cfg = config(RunMode::SingleTurn, 3);
        assert_eq!(max_turns(&cfg), 1);
        assert_eq!(route_after_update(1, &cfg), Route::Evaluate);
        assert!(turn_input(0, &cfg).is_some());
        assert!(turn_input(1, &cfg).is_none());
    }

    #[test]
    fn multi_turn_runs_every_configured_turn() {
        let cfg = config(RunMode::MultiTurn, 3);
        assert_eq!(max_turns(&cfg), 3);
        assert_eq!(route_after_update(1, &cfg), Route::Continue);
        assert_eq!(route_after_update(2, &cfg), Route::Continue);
        assert_eq!(route_after_update(3, &cfg), Route::Evaluate);
    }

    #[test]
    fn empty_turn_list_still_counts_as_one_turn() {
        let cfg = config(RunMode::MultiTurn, 0);
        assert_eq!(max_turns(&cfg), 1);
        assert!(turn_input(0, &cfg).is_none());
        assert_eq!(route_after_update(1, &cfg), Route::Evaluate);
    }

    #[test]
    fn plan_repeats_final_stimulus() {
        let turns = plan_turns(&[stimulus("A")], 2);
        let contents: Vec<&str> = turns
            .iter()
            .map(|turn| turn.stimulus.content.as_str())
            .collect();
        assert_eq!(contents, vec!["A", "A"]);

        let turns = plan_turns(&[stimulus("A"), stimulus("B"), stimulus("C")], 2);
        assert_eq!(turns[1].stimulus.content, "B");
        assert!(plan_turns(&[], 4).is_empty());
    }

    #[test]
    fn plan_copies_stimulus_question() {
        let mut with_question = stimulus("A");
        with_question.question = Some("Would you pay?".to_string());
        let turns = plan_turns(&[with_question], 1);
        assert_eq!(turns[0].question.as_deref(), Some("Would you pay?"));
    }

    #[test]
    fn persona_modes_fall_back_round_robin() {
        let roster: Vec<Persona> = ["a", "b", "c", "d"].into_iter().map(persona).collect();
        let modes: Vec<PersonaMode> = roster
            .iter()
            .map(|p| resolve_persona_mode(p.id, &roster, &BTreeMap::new()))
            .collect();
        assert_eq!(
            modes,
            vec![
                PersonaMode::EconomicBuyer,
                PersonaMode::DailyUser,
                PersonaMode::AntiPersona,
                PersonaMode::EconomicBuyer,
            ]
        );
    }

    #[test]
    fn persona_mode_override_wins() {
        let roster = vec![persona("a"), persona("b")];
        let mut overrides = BTreeMap::new();
        overrides.insert(roster[0].id, PersonaMode::AntiPersona);
        assert_eq!(
            resolve_persona_mode(roster[0].id, &roster, &overrides),
            PersonaMode::AntiPersona
        );
        assert_eq!(
            resolve_persona_mode(roster[1].id, &roster, &overrides),
            PersonaMode::DailyUser
        );
    }
}
