//! Simulator configuration stored as TOML (default `persona-sim.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::structured::DEFAULT_ATTEMPTS;

pub const DEFAULT_CONFIG_FILE: &str = "persona-sim.toml";

/// Simulator configuration (TOML).
///
/// Missing fields fall back to defaults, and a missing file is the same as an
/// empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Model identifier handed to the persona responder.
    pub model_name: String,

    /// Sampling temperature for persona replies, within `[0, 1]`.
    pub temperature: f64,

    /// Attempts the structured validator makes per reply.
    pub structured_attempts: usize,

    /// Directory holding one sub-directory per persisted run.
    pub store_dir: PathBuf,

    pub responder: ResponderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResponderConfig {
    /// Model CLI argv. Receives the conversation as JSON on stdin and prints the reply.
    pub command: Vec<String>,

    /// Wall-clock budget for one model call.
    pub timeout_secs: u64,

    /// Truncate model stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            command: vec!["persona-sim-model".to_string()],
            timeout_secs: 30,
            output_limit_bytes: 100_000,
        }
    }
}

impl ResponderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            structured_attempts: DEFAULT_ATTEMPTS,
            store_dir: PathBuf::from(".persona-sim").join("runs"),
            responder: ResponderConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(anyhow!("model_name must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(anyhow!("temperature must be within [0, 1]"));
        }
        if self.structured_attempts == 0 {
            return Err(anyhow!("structured_attempts must be > 0"));
        }
        if self.store_dir.as_os_str().is_empty() {
            return Err(anyhow!("store_dir must not be empty"));
        }
        if self.responder.command.is_empty() || self.responder.command[0].trim().is_empty() {
            return Err(anyhow!("responder.command must be a non-empty array"));
        }
        if self.responder.timeout_secs == 0 {
            return Err(anyhow!("responder.timeout_secs must be > 0"));
        }
        if self.responder.output_limit_bytes == 0 {
            return Err(anyhow!("responder.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SimConfig::default()`.
pub fn load_config(path: &Path) -> Result<SimConfig> {
    if !path.exists() {
        let cfg = SimConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SimConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SimConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::store::write_atomic(path, buf.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SimConfig::default());
        assert_eq!(cfg.structured_attempts, 3);
        assert_eq!(cfg.model_name, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("persona-sim.toml");
        fs::write(
            &path,
            "temperature = 0.7\n\n[responder]\ncommand = [\"python3\", \"model.py\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert!((cfg.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.responder.command, vec!["python3", "model.py"]);
        assert_eq!(cfg.responder.timeout_secs, 30);
        assert_eq!(cfg.store_dir, PathBuf::from(".persona-sim/runs"));
    }

    #[test]
    fn write_then_load_preserves_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("persona-sim.toml");
        let cfg = SimConfig {
            model_name: "local-model".to_string(),
            structured_attempts: 5,
            ..SimConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let out_of_range = SimConfig {
            temperature: 1.5,
            ..SimConfig::default()
        };
        assert!(out_of_range.validate().is_err());

        let mut no_command = SimConfig::default();
        no_command.responder.command = vec![" ".to_string()];
        let err = no_command.validate().unwrap_err();
        assert!(err.to_string().contains("responder.command"));

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("persona-sim.toml");
        fs::write(&path, "structured_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("structured_attempts must be > 0"));
    }
}
