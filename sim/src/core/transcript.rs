//! Append-only transcript events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Actor recorded for runner-generated events.
pub const SYSTEM_ACTOR: &str = "system";

// Metadata keys written on turn events.
pub const META_STEP: &str = "step";
pub const META_PERSONA_ID: &str = "persona_id";
pub const META_PERSONA_MODE: &str = "persona_mode";
pub const META_STANCE: &str = "stance";
pub const META_SEVERITY: &str = "severity";
pub const META_RAW: &str = "raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptEventType {
    Question,
    Answer,
    System,
    Evaluation,
}

/// One immutable transcript entry. Ordering is the only notion of "when".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Persona name or `system`.
    pub actor: String,
    pub event_type: TranscriptEventType,
    pub content: String,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

impl TranscriptEvent {
    pub fn system(timestamp: String, event_type: TranscriptEventType, content: &str) -> Self {
        Self {
            timestamp,
            actor: SYSTEM_ACTOR.to_string(),
            event_type,
            content: content.to_string(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = (!meta.is_empty()).then_some(meta);
        self
    }

    /// Look up a metadata field.
    pub fn meta_field(&self, key: &str) -> Option<&Value> {
        self.meta.as_ref().and_then(|meta| meta.get(key))
    }
}
