//! General-knowledge answers, used when a question cannot be tied to a
//! patient record.
//!
//! No tools and no loop: one completion over the persona, the example
//! exchanges and the question.

use clinreact_config::{AppConfig, RenderPolicy};
use clinreact_core::error::ProviderError;
use clinreact_core::message::Message;
use clinreact_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::parser::ResponseCleanup;
use crate::prompts;
use crate::render::render;

pub struct GeneralAssistant {
    provider: Arc<dyn Provider>,
    model: String,
    render_policy: RenderPolicy,
    cleanup: ResponseCleanup,
}

impl GeneralAssistant {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            render_policy: RenderPolicy::default(),
            cleanup: ResponseCleanup::default(),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            provider,
            model: config.provider.model.clone(),
            render_policy: config.agent.render_policy,
            cleanup: ResponseCleanup::with_patterns(&config.agent.signature_patterns)?,
        })
    }

    pub fn with_render_policy(mut self, policy: RenderPolicy) -> Self {
        self.render_policy = policy;
        self
    }

    /// The messages sent for `question`.
    pub fn conversation(&self, question: &str) -> Vec<Message> {
        let mut messages = vec![Message::assistant(prompts::GENERAL_ROLE)];
        messages.extend(prompts::general_examples());
        messages.push(Message::user(question.trim()));
        messages
    }

    /// Answer `question` from general knowledge, signatures stripped.
    pub async fn answer(&self, question: &str) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: render(self.render_policy, &self.conversation(question)),
            stream: false,
        };

        let response = self.provider.complete(request).await.map_err(|e| {
            warn!(provider = %self.provider.name(), error = %e, "General answer failed");
            e
        })?;
        debug!(reply = %response.content, "General answer");
        Ok(self.cleanup.clean(&response.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_helpers::SequentialMockProvider;
    use clinreact_core::message::Role;

    #[tokio::test]
    async fn answer_is_cleaned() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "A cold is usually milder than the flu.\n__Assistant__",
        ]));
        let assistant = GeneralAssistant::new(provider, "m");
        let answer = assistant.answer("Cold or flu?").await.unwrap();
        assert_eq!(answer, "A cold is usually milder than the flu.");
    }

    #[tokio::test]
    async fn persona_leads_and_question_trails() {
        let provider = Arc::new(SequentialMockProvider::new(&["ok"]));
        GeneralAssistant::new(provider.clone(), "m")
            .answer("What is a normal resting heart rate?")
            .await
            .unwrap();

        let messages = &provider.requests()[0].messages;
        assert_eq!(messages.len(), 8);
        assert_eq!(messages[0].role(), Role::Assistant);
        assert!(messages[0].content().starts_with("You are a helpful Physician Assistant"));
        assert_eq!(messages[7], Message::user("What is a normal resting heart rate?"));
    }

    #[tokio::test]
    async fn flattened_sends_one_entry() {
        let provider = Arc::new(SequentialMockProvider::new(&["ok"]));
        GeneralAssistant::new(provider.clone(), "m")
            .with_render_policy(RenderPolicy::Flattened)
            .answer("q")
            .await
            .unwrap();

        let messages = &provider.requests()[0].messages;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content().starts_with("ASSISTANT: You are a helpful"));
        assert!(messages[0].content().ends_with("USER: q"));
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let provider = Arc::new(SequentialMockProvider::with_results(vec![Err(
            ProviderError::Network("connection refused".into()),
        )]));
        let err = GeneralAssistant::new(provider, "m").answer("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
