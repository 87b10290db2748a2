//! Structured output validation with a corrective retry loop.
//!
//! A responder reply is decoded in four steps: JSON parse, JSON Schema check,
//! typed deserialization, then the type's own `validate`. Each failed attempt
//! appends one corrective system message carrying the error text and the raw
//! reply, and the responder is asked again. Responder failures are not retried
//! here.

use std::sync::OnceLock;

use jsonschema::{Validator, validator_for};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::message::ChatMessage;
use crate::core::response::{EvaluationReport, PersonaResponsePayload};

/// Attempts made before giving up on a structured reply.
pub const DEFAULT_ATTEMPTS: usize = 3;

/// Compiled schema, or the compile error, shared by every call for one type.
pub type SchemaSlot = OnceLock<Result<Validator, String>>;

/// A value a responder can be asked to produce as JSON.
pub trait Structured: DeserializeOwned + Serialize {
    /// Human-readable schema name used in errors and logs.
    const SCHEMA_NAME: &'static str;
    /// JSON Schema (Draft 2020-12) the raw reply must satisfy.
    const SCHEMA: &'static str;

    /// Per-type slot filled by [`compile_schema`] on first use.
    fn schema_slot() -> &'static SchemaSlot;

    /// Constraints the schema cannot express.
    fn validate(&self) -> Result<(), String>;
}

impl Structured for PersonaResponsePayload {
    const SCHEMA_NAME: &'static str = "PersonaResponse";
    const SCHEMA: &'static str = include_str!("../../schemas/persona_response.schema.json");

    fn schema_slot() -> &'static SchemaSlot {
        static SLOT: SchemaSlot = OnceLock::new();
        &SLOT
    }

    fn validate(&self) -> Result<(), String> {
        PersonaResponsePayload::validate(self)
    }
}

impl Structured for EvaluationReport {
    const SCHEMA_NAME: &'static str = "EvaluationReport";
    const SCHEMA: &'static str = include_str!("../../schemas/evaluation_report.schema.json");

    fn schema_slot() -> &'static SchemaSlot {
        static SLOT: SchemaSlot = OnceLock::new();
        &SLOT
    }

    fn validate(&self) -> Result<(), String> {
        EvaluationReport::validate(self)
    }
}

/// Raw responder output: free text to decode, or an already-typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Text(String),
    Typed(T),
}

/// Last decode failure seen by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

#[derive(Debug, Error)]
pub enum StructuredOutputError {
    /// The responder itself failed; never retried by the validator.
    #[error("{schema} responder failed")]
    Transport {
        schema: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to produce a valid {schema} after {attempts} attempt(s)")]
    Exhausted {
        schema: &'static str,
        attempts: usize,
        #[source]
        cause: DecodeError,
    },
    #[error("invalid {schema} schema: {message}")]
    Schema {
        schema: &'static str,
        message: String,
    },
}

impl StructuredOutputError {
    /// Text of the last validation failure, when attempts were exhausted.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            StructuredOutputError::Exhausted { cause, .. } => Some(&cause.0),
            _ => None,
        }
    }
}

/// Ask `respond` for a `T` until a reply validates or `max_attempts` are used.
///
/// `prompt` is never modified; the conversation handed to `respond` is
/// `prompt` followed by one corrective message per failed attempt so far.
#[instrument(skip_all, fields(schema = T::SCHEMA_NAME, max_attempts))]
pub fn invoke_structured<T, F>(
    prompt: &[ChatMessage],
    max_attempts: usize,
    mut respond: F,
) -> Result<T, StructuredOutputError>
where
    T: Structured,
    F: FnMut(&[ChatMessage]) -> anyhow::Result<Reply<T>>,
{
    let validator = compile_schema::<T>()?;
    let attempts = max_attempts.max(1);
    let mut messages = prompt.to_vec();
    let mut last_error = DecodeError(String::new());

    for attempt in 1..=attempts {
        let reply = respond(&messages).map_err(|source| {
            warn!(attempt, err = %source, "responder failed");
            StructuredOutputError::Transport {
                schema: T::SCHEMA_NAME,
                source,
            }
        })?;

        // On rejection, keep the error and the reply text to quote back.
        let outcome = match reply {
            Reply::Typed(value) => match value.validate() {
                Ok(()) => Ok(value),
                Err(err) => Err((err, serde_json::to_string(&value).unwrap_or_default())),
            },
            Reply::Text(text) => decode::<T>(validator, &text).map_err(|err| (err, text)),
        };

        match outcome {
            Ok(value) => {
                debug!(attempt, "structured reply accepted");
                return Ok(value);
            }
            Err((err, raw)) => {
                warn!(attempt, err = %err, "structured reply rejected");
                messages.push(corrective_message(&err, &raw));
                last_error = DecodeError(err);
            }
        }
    }

    Err(StructuredOutputError::Exhausted {
        schema: T::SCHEMA_NAME,
        attempts,
        cause: last_error,
    })
}

/// Decode a raw reply into `T`, returning a description of the first failing stage.
pub fn decode<T: Structured>(validator: &Validator, raw: &str) -> Result<T, String> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|err| format!("invalid JSON: {err}"))?;
    if !validator.is_valid(&value) {
        let messages = validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(format!(
            "{} schema validation failed: {}",
            T::SCHEMA_NAME,
            messages.join("; ")
        ));
    }
    let typed: T = serde_json::from_value(value).map_err(|err| err.to_string())?;
    typed.validate()?;
    Ok(typed)
}

/// Validator for `T`'s schema, compiled once per process.
pub fn compile_schema<T: Structured>() -> Result<&'static Validator, StructuredOutputError> {
    T::schema_slot()
        .get_or_init(|| {
            debug!(schema = T::SCHEMA_NAME, "compiling schema");
            let schema: Value = serde_json::from_str(T::SCHEMA).map_err(|err| err.to_string())?;
            validator_for(&schema).map_err(|err| err.to_string())
        })
        .as_ref()
        .map_err(|message| StructuredOutputError::Schema {
            schema: T::SCHEMA_NAME,
            message: message.clone(),
        })
}

fn corrective_message(error: &str, raw: &str) -> ChatMessage {
    ChatMessage::system(format!(
        "Fix your JSON. Return ONLY valid JSON that matches the expected schema. \
         Validation errors: {error}. Last response content: {raw}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use crate::core::response::Stance;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    const VALID: &str = r#"{"stance":"yes","top_concerns":["cost"],"short_answer":"Looks useful."}"#;

    fn prompt() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are a persona."),
            ChatMessage::user("Stimulus"),
        ]
    }

    /// Responder returning queued replies and recording every conversation it saw.
    fn scripted(
        replies: Vec<anyhow::Result<Reply<PersonaResponsePayload>>>,
        seen: &mut Vec<Vec<ChatMessage>>,
    ) -> impl FnMut(&[ChatMessage]) -> anyhow::Result<Reply<PersonaResponsePayload>> + '_ {
        let mut replies: VecDeque<_> = replies.into();
        move |messages| {
            seen.push(messages.to_vec());
            replies
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
        }
    }

    #[test]
    fn valid_first_reply_is_returned() {
        let mut seen = Vec::new();
        let payload: PersonaResponsePayload = invoke_structured(
            &prompt(),
            DEFAULT_ATTEMPTS,
            scripted(vec![Ok(Reply::Text(VALID.to_string()))], &mut seen),
        )
        .expect("payload");
        assert_eq!(payload.stance, Stance::Yes);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], prompt());
    }

    #[test]
    fn invalid_reply_appends_corrective_message_with_raw_text() {
        let mut seen = Vec::new();
        let payload: PersonaResponsePayload = invoke_structured(
            &prompt(),
            DEFAULT_ATTEMPTS,
            scripted(
                vec![
                    Ok(Reply::Text("not json".to_string())),
                    Ok(Reply::Text(VALID.to_string())),
                ],
                &mut seen,
            ),
        )
        .expect("payload");
        assert_eq!(payload.top_concerns, vec!["cost".to_string()]);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].len(), 3);
        let corrective = &seen[1][2];
        assert_eq!(corrective.role, Role::System);
        assert!(corrective.content.contains("invalid JSON"));
        assert!(corrective.content.ends_with("Last response content: not json"));
    }

    #[test]
    fn corrective_messages_accumulate_until_exhausted() {
        let mut seen = Vec::new();
        let bad = r#"{"stance":"maybe","top_concerns":["cost"],"short_answer":"?"}"#;
        let err = invoke_structured::<PersonaResponsePayload, _>(
            &prompt(),
            3,
            scripted(
                vec![
                    Ok(Reply::Text(bad.to_string())),
                    Ok(Reply::Text(bad.to_string())),
                    Ok(Reply::Text(bad.to_string())),
                ],
                &mut seen,
            ),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            StructuredOutputError::Exhausted { attempts: 3, .. }
        ));
        let last = err.last_error().expect("last error");
        assert!(last.contains("PersonaResponse schema validation failed"));
        assert_eq!(
            seen.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn transport_failure_is_not_retried() {
        let mut seen = Vec::new();
        let err = invoke_structured::<PersonaResponsePayload, _>(
            &prompt(),
            DEFAULT_ATTEMPTS,
            scripted(
                vec![
                    Err(anyhow!("connection reset")),
                    Ok(Reply::Text(VALID.to_string())),
                ],
                &mut seen,
            ),
        )
        .unwrap_err();
        assert!(matches!(err, StructuredOutputError::Transport { .. }));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn typed_replies_are_still_domain_validated() {
        let mut seen = Vec::new();
        let mut typed: PersonaResponsePayload = serde_json::from_str(VALID).expect("valid");
        typed.top_concerns.clear();
        let err = invoke_structured::<PersonaResponsePayload, _>(
            &prompt(),
            1,
            scripted(vec![Ok(Reply::Typed(typed))], &mut seen),
        )
        .unwrap_err();
        assert!(err.last_error().expect("last").contains("top_concerns"));
    }

    #[test]
    fn rejected_typed_reply_is_quoted_in_the_corrective_message() {
        let mut seen = Vec::new();
        let mut typed: PersonaResponsePayload = serde_json::from_str(VALID).expect("valid");
        typed.top_concerns.clear();
        let quoted = serde_json::to_string(&typed).expect("serialize");
        invoke_structured::<PersonaResponsePayload, _>(
            &prompt(),
            DEFAULT_ATTEMPTS,
            scripted(
                vec![Ok(Reply::Typed(typed)), Ok(Reply::Text(VALID.to_string()))],
                &mut seen,
            ),
        )
        .expect("payload");
        let corrective = &seen[1][2];
        assert!(corrective.content.contains("top_concerns"));
        assert!(
            corrective
                .content
                .ends_with(&format!("Last response content: {quoted}"))
        );
    }

    #[test]
    fn schema_is_compiled_once_per_type() {
        let first = compile_schema::<PersonaResponsePayload>().expect("schema");
        let second = compile_schema::<PersonaResponsePayload>().expect("schema");
        assert!(std::ptr::eq(first, second));
        let report = compile_schema::<EvaluationReport>().expect("schema");
        assert!(!std::ptr::eq(first, report));
    }

    #[test]
    fn decode_enforces_word_limit_after_schema() {
        let validator = compile_schema::<PersonaResponsePayload>().expect("schema");
        let long = vec!["word"; 121].join(" ");
        let raw = serde_json::json!({
            "stance": "no",
            "top_concerns": ["time"],
            "short_answer": long,
        })
        .to_string();
        let err = decode::<PersonaResponsePayload>(validator, &raw).unwrap_err();
        assert!(err.contains("120 words"));
    }

    #[test]
    fn evaluation_schema_rejects_out_of_range_trust_delta() {
        let validator = compile_schema::<EvaluationReport>().expect("schema");
        let raw = r#"{"will_buy":"yes","will_use_daily":"no","trust_delta":2.0}"#;
        let err = decode::<EvaluationReport>(validator, raw).unwrap_err();
        assert!(err.contains("EvaluationReport schema validation failed"));

        let ok = r#"{"will_buy":"yes","will_use_daily":"no","trust_delta":-0.25}"#;
        let report = decode::<EvaluationReport>(validator, ok).expect("report");
        assert!(report.top_objections.is_empty());
    }
}
