//! Responder contracts consumed by the turn executor and the evaluate phase.
//!
//! Production responders wrap a [`ModelClient`]; tests use the scripted
//! responders from `test_support`.

use anyhow::Result;
use tracing::instrument;

use crate::core::message::ChatMessage;
use crate::core::response::{EvaluationReport, PersonaResponsePayload};
use crate::io::model::ModelClient;
use crate::io::structured::{DEFAULT_ATTEMPTS, Reply, invoke_structured};

/// Temperature used when the evaluator must produce structured output.
pub const STRUCTURED_TEMPERATURE: f64 = 0.0;

/// Produces one persona reply for a rendered conversation.
///
/// Errors are transport failures; malformed replies are returned as
/// [`Reply::Text`] and repaired by the structured validator.
pub trait PersonaResponder {
    fn respond(
        &self,
        messages: &[ChatMessage],
        model_name: &str,
        temperature: f64,
    ) -> Result<Reply<PersonaResponsePayload>>;
}

/// Produces the final evaluation report for a rendered conversation.
pub trait EvaluationResponder {
    fn evaluate(&self, messages: &[ChatMessage]) -> Result<EvaluationReport>;
}

/// Persona responder returning the model's raw text.
#[derive(Debug, Clone)]
pub struct ModelPersonaResponder<C> {
    client: C,
}

impl<C: ModelClient> ModelPersonaResponder<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: ModelClient> PersonaResponder for ModelPersonaResponder<C> {
    fn respond(
        &self,
        messages: &[ChatMessage],
        model_name: &str,
        temperature: f64,
    ) -> Result<Reply<PersonaResponsePayload>> {
        self.client
            .complete(messages, model_name, temperature)
            .map(Reply::Text)
    }
}

/// Evaluation responder running the structured validator over a model client.
#[derive(Debug, Clone)]
pub struct ModelEvaluationResponder<C> {
    client: C,
    model_name: String,
    max_attempts: usize,
}

impl<C: ModelClient> ModelEvaluationResponder<C> {
    pub fn new(client: C, model_name: impl Into<String>) -> Self {
        Self {
            client,
            model_name: model_name.into(),
            max_attempts: DEFAULT_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl<C: ModelClient> EvaluationResponder for ModelEvaluationResponder<C> {
    #[instrument(skip_all, fields(model = %self.model_name))]
    fn evaluate(&self, messages: &[ChatMessage]) -> Result<EvaluationReport> {
        let report = invoke_structured(messages, self.max_attempts, |conversation| {
            self.client
                .complete(conversation, &self.model_name, STRUCTURED_TEMPERATURE)
                .map(Reply::Text)
        })?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::structured::StructuredOutputError;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Model client returning canned completions and recording temperatures.
    struct CannedClient {
        replies: RefCell<VecDeque<Result<String>>>,
        temperatures: RefCell<Vec<f64>>,
    }

    impl CannedClient {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                temperatures: RefCell::new(Vec::new()),
            }
        }
    }

    impl ModelClient for &CannedClient {
        fn complete(
            &self,
            _messages: &[ChatMessage],
            _model_name: &str,
            temperature: f64,
        ) -> Result<String> {
            self.temperatures.borrow_mut().push(temperature);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no canned reply left")))
        }
    }

    const REPORT: &str = r#"{"will_buy":"reluctant","will_use_daily":"yes","trust_delta":0.1,
        "top_objections":[{"category":"cost","detail":"pricey","severity":"medium"}]}"#;

    #[test]
    fn persona_responder_passes_text_through() {
        let client = CannedClient::new(vec![Ok("raw reply".to_string())]);
        let responder = ModelPersonaResponder::new(&client);
        let reply = responder.respond(&[], "m", 0.3).expect("reply");
        assert_eq!(reply, Reply::Text("raw reply".to_string()));
        assert_eq!(*client.temperatures.borrow(), vec![0.3]);
    }

    #[test]
    fn evaluation_responder_repairs_at_zero_temperature() {
        let client = CannedClient::new(vec![Ok("oops".to_string()), Ok(REPORT.to_string())]);
        let responder = ModelEvaluationResponder::new(&client, "gpt-4o-mini");
        let report = responder.evaluate(&[]).expect("report");
        assert!((report.trust_delta - 0.1).abs() < f64::EPSILON);
        assert_eq!(report.top_objections.len(), 1);
        assert_eq!(*client.temperatures.borrow(), vec![0.0, 0.0]);
    }

    #[test]
    fn evaluation_responder_surfaces_exhaustion() {
        let client = CannedClient::new(vec![Ok("{}".to_string()), Ok("{}".to_string())]);
        let responder = ModelEvaluationResponder::new(&client, "m").with_max_attempts(2);
        let err = responder.evaluate(&[]).unwrap_err();
        let structured = err
            .downcast_ref::<StructuredOutputError>()
            .expect("structured error");
        assert!(matches!(
            structured,
            StructuredOutputError::Exhausted { attempts: 2, .. }
        ));
    }
}
