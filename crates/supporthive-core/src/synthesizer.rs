use std::sync::Arc;

use anyhow::{Context, Result};
use supporthive_provider::{LlmMessage, LlmProvider, LlmRequest};
use supporthive_schema::{ConversationTurn, Role};

use crate::config::LlmConfig;

pub const SYSTEM_PROMPT: &str = r#"You are an advanced customer support AI agent with the following capabilities:

1. **Knowledge Base Search**: You can search through a comprehensive knowledge base for relevant information.
2. **Web Search Fallback**: When knowledge base information is insufficient, you can search the web for current information.
3. **Context Awareness**: You maintain conversation context and provide personalized responses.
4. **Professional Communication**: You communicate in a professional, helpful, and empathetic manner.

**Guidelines:**
- Always be helpful and professional
- If you're unsure about something, say so rather than guessing
- Provide accurate, up-to-date information
- When referencing sources, mention them appropriately
- Keep responses concise but comprehensive
- Ask clarifying questions when needed

**Response Format:**
- Provide clear, actionable answers
- Include relevant context when appropriate
- Cite sources when using external information
- Maintain conversation flow naturally"#;

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub text: String,
    pub tokens_used: Option<u32>,
}

/// Turns retrieved context plus recent history into one completion call.
#[derive(Clone)]
pub struct Synthesizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    history_turns: usize,
    system_prompt: String,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            history_turns: config.history_turns,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(
        &self,
        query: &str,
        context: &str,
        history: &[ConversationTurn],
    ) -> LlmRequest {
        let skip = history.len().saturating_sub(self.history_turns);
        let mut messages: Vec<LlmMessage> = history[skip..]
            .iter()
            .map(|turn| match turn.role {
                Role::User => LlmMessage::user(turn.content.clone()),
                Role::Assistant => LlmMessage::assistant(turn.content.clone()),
            })
            .collect();
        messages.push(LlmMessage::user(format!(
            "Context: {context}\n\nUser Query: {query}"
        )));

        LlmRequest {
            model: self.model.clone(),
            system: Some(self.system_prompt.clone()),
            messages,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        context: &str,
        history: &[ConversationTurn],
    ) -> Result<Synthesis> {
        let request = self.build_request(query, context, history);
        let response = self
            .provider
            .chat(request)
            .await
            .context("completion request failed")?;
        Ok(Synthesis {
            tokens_used: response.total_tokens(),
            text: response.text,
        })
    }

    pub async fn health(&self) -> Result<()> {
        self.provider.health().await
    }
}
