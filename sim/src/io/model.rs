//! Model client abstraction and the child-process backed implementation.
//!
//! The [`ModelClient`] trait decouples responders from the actual model
//! backend. [`CommandModelClient`] spawns a configured CLI, writes the
//! conversation to its stdin as JSON and treats stdout as the raw reply.

use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::message::ChatMessage;
use crate::io::config::ResponderConfig;
use crate::io::process::run_command_with_timeout;

/// Environment variable carrying the model identifier to the model CLI.
pub const MODEL_ENV: &str = "PERSONA_SIM_MODEL";
/// Environment variable carrying the sampling temperature to the model CLI.
pub const TEMPERATURE_ENV: &str = "PERSONA_SIM_TEMPERATURE";

/// Raw text completion over a provider-agnostic conversation.
pub trait ModelClient {
    fn complete(&self, messages: &[ChatMessage], model_name: &str, temperature: f64)
    -> Result<String>;
}

/// Request document written to the model CLI's stdin.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: &'a [ChatMessage],
}

/// Model client that spawns the configured responder command.
#[derive(Debug, Clone)]
pub struct CommandModelClient {
    config: ResponderConfig,
}

impl CommandModelClient {
    pub fn new(config: ResponderConfig) -> Self {
        Self { config }
    }
}

impl ModelClient for CommandModelClient {
    #[instrument(skip_all, fields(model = model_name, messages = messages.len()))]
    fn complete(
        &self,
        messages: &[ChatMessage],
        model_name: &str,
        temperature: f64,
    ) -> Result<String> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("responder command is empty"))?;
        info!(program = %program, "invoking model command");

        let request = CompletionRequest {
            model: model_name,
            temperature,
            messages,
        };
        let stdin = serde_json::to_vec(&request).context("serialize completion request")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(MODEL_ENV, model_name)
            .env(TEMPERATURE_ENV, temperature.to_string());

        let output = run_command_with_timeout(
            cmd,
            Some(&stdin),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run model command {program}"))?;

        if output.timed_out {
            warn!(
                timeout_secs = self.config.timeout_secs,
                "model command timed out"
            );
            return Err(anyhow!(
                "model command timed out after {}s",
                self.config.timeout_secs
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "model command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_report()
            ));
        }

        debug!(bytes = output.stdout.len(), "model command completed");
        Ok(output.stdout_lossy())
    }
}
