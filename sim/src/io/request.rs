//! Run request documents accepted by `persona-sim run`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::{Persona, PersonaMode, Scenario, Stimulus};

/// Caller-supplied inputs for one run.
///
/// `run_mode` and `steps` are kept raw so that unsupported values surface as
/// validation errors from the service rather than parse errors here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub scenario: Scenario,
    pub personas: Vec<Persona>,
    pub stimuli: Vec<Stimulus>,
    pub run_mode: String,
    pub steps: i64,
    #[serde(default)]
    pub persona_modes: BTreeMap<Uuid, PersonaMode>,
}

/// Load a request from `.toml` or `.json`, chosen by file extension.
pub fn load_request(path: &Path) -> Result<RunRequest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read run request {}", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => {
            toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
        }
        Some("json") => {
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
        }
        _ => Err(anyhow!(
            "unsupported run request format {} (expected .toml or .json)",
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StimulusType;

    const TOML_REQUEST: &str = r#"
run_mode = "multi-turn"
steps = 2

[scenario]
id = "5f0c7a2e-8e0c-4f55-9d0e-6d8f3f1b7a10"
title = "Audit season"
context = "Quarter-end audit with a thin team."
stressors = ["headcount freeze"]

[[personas]]
id = "2fdab821-76d6-4c04-9a4b-6bc0099ae0b0"
name = "Priya Desai"
role = "Head of Compliance Technology"
incentives = ["fewer manual checks"]

[personas.constraints]
time_per_week_minutes = 180
budget_gbp = 75000
ai_trust_level = 3
authority_level = "high"

[[stimuli]]
type = "pricing"
content = "Pilot at 18k per year"
question = "Would you pay for a pilot?"

[persona_modes]
"2fdab821-76d6-4c04-9a4b-6bc0099ae0b0" = "anti_persona"
"#;

    #[test]
    fn toml_request_loads_with_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("request.toml");
        fs::write(&path, TOML_REQUEST).expect("write");

        let request = load_request(&path).expect("load");
        assert_eq!(request.run_mode, "multi-turn");
        assert_eq!(request.steps, 2);
        assert_eq!(request.personas[0].locale, "UK");
        assert_eq!(request.stimuli[0].kind, StimulusType::Pricing);
        assert_eq!(
            request.persona_modes.get(&request.personas[0].id),
            Some(&PersonaMode::AntiPersona)
        );
    }

    #[test]
    fn json_request_matches_toml_request() {
        let temp = tempfile::tempdir().expect("tempdir");
        let toml_path = temp.path().join("request.toml");
        fs::write(&toml_path, TOML_REQUEST).expect("write toml");
        let from_toml = load_request(&toml_path).expect("toml");

        let json_path = temp.path().join("request.json");
        fs::write(&json_path, serde_json::to_string(&from_toml).expect("json")).expect("write");
        assert_eq!(load_request(&json_path).expect("json"), from_toml);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("request.yaml");
        fs::write(&path, "run_mode: single-turn").expect("write");
        let err = load_request(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported run request format"));
    }
}
