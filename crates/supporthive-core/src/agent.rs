use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use supporthive_schema::{ChatRequest, ChatResponse, ConversationTurn, ResponseSource};
use uuid::Uuid;

use crate::conversation::{SessionStats, SessionStore};
use crate::retrieval::Retriever;
use crate::synthesizer::Synthesizer;

pub const ERROR_RESPONSE: &str = "I apologize, but I encountered an error while processing your request. Please try again later.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentHealth {
    pub llm_provider: bool,
    pub knowledge_store: bool,
    pub search_provider: bool,
}

impl AgentHealth {
    pub fn is_healthy(&self) -> bool {
        self.llm_provider && self.knowledge_store && self.search_provider
    }
}

/// Answers chat queries: retrieve, synthesize, record the exchange.
pub struct ChatAgent {
    retriever: Retriever,
    synthesizer: Synthesizer,
    sessions: Arc<dyn SessionStore>,
}

impl ChatAgent {
    pub fn new(
        retriever: Retriever,
        synthesizer: Synthesizer,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            retriever,
            synthesizer,
            sessions,
        }
    }

    pub fn model(&self) -> &str {
        self.synthesizer.model()
    }

    pub async fn generate_response(&self, request: ChatRequest) -> ChatResponse {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let resolution = self.retriever.resolve(&request.query).await;
        let context = match request.context.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => {
                format!("{}\n\nAdditional Context: {extra}", resolution.context)
            }
            _ => resolution.context.clone(),
        };

        let history = match self.sessions.get(&session_id, None).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(%session_id, "failed to load history: {e:#}");
                Vec::new()
            }
        };

        let synthesis = match self
            .synthesizer
            .synthesize(&request.query, &context, &history)
            .await
        {
            Ok(synthesis) => synthesis,
            Err(e) => {
                tracing::error!(%session_id, "failed to generate response: {e:#}");
                return ChatResponse {
                    response: ERROR_RESPONSE.to_string(),
                    source: ResponseSource::Error,
                    confidence: 0.0,
                    metadata: serde_json::json!({ "error": e.to_string() }),
                    timestamp: Utc::now(),
                };
            }
        };

        self.record_exchange(
            &session_id,
            ConversationTurn::user(request.query.clone(), request.user_id.clone()),
            ConversationTurn::assistant(
                synthesis.text.clone(),
                resolution.source,
                resolution.confidence,
            ),
        )
        .await;

        tracing::info!(
            %session_id,
            source = %resolution.source,
            confidence = resolution.confidence,
            "chat response generated"
        );

        ChatResponse {
            response: synthesis.text,
            source: resolution.source,
            confidence: resolution.confidence,
            metadata: serde_json::json!({
                "session_id": session_id,
                "user_id": request.user_id,
                "knowledge_results_count": resolution.knowledge_hits.len(),
                "model_used": self.synthesizer.model(),
                "tokens_used": synthesis.tokens_used,
            }),
            timestamp: Utc::now(),
        }
    }

    async fn record_exchange(&self, session_id: &str, user: ConversationTurn, reply: ConversationTurn) {
        for turn in [user, reply] {
            if let Err(e) = self.sessions.append(session_id, turn).await {
                tracing::warn!(session_id, "failed to record conversation turn: {e:#}");
            }
        }
    }

    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>> {
        self.sessions.get(session_id, limit).await
    }

    pub async fn clear_conversation(&self, session_id: &str) -> Result<bool> {
        self.sessions.clear(session_id).await
    }

    pub async fn conversation_stats(&self, session_id: &str) -> Result<SessionStats> {
        self.sessions.stats(session_id).await
    }

    /// Probe every collaborator once.
    pub async fn health(&self) -> AgentHealth {
        let llm_provider = match self.synthesizer.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("llm provider unavailable: {e:#}");
                false
            }
        };
        AgentHealth {
            llm_provider,
            knowledge_store: self.retriever.knowledge().is_available().await,
            search_provider: self.retriever.web().is_configured(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::conversation::InMemorySessionStore;
    use crate::retrieval::fakes::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use supporthive_provider::{LlmProvider, LlmRequest, LlmResponse};
    use supporthive_schema::Role;

    /// Records every request and answers with a fixed reply.
    struct ScriptedProvider {
        reply: Option<String>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> LlmRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Some(text) => Ok(LlmResponse {
                    text: text.clone(),
                    input_tokens: Some(40),
                    output_tokens: Some(2),
                    stop_reason: Some("end_turn".into()),
                }),
                None => Err(anyhow!("openai api error (500)")),
            }
        }

        async fn health(&self) -> Result<()> {
            match self.reply {
                Some(_) => Ok(()),
                None => Err(anyhow!("down")),
            }
        }
    }

    fn agent(
        provider: Arc<ScriptedProvider>,
        knowledge: Arc<FakeKnowledge>,
        web: Arc<FakeWeb>,
        sessions: Arc<InMemorySessionStore>,
    ) -> ChatAgent {
        ChatAgent::new(
            Retriever::new(knowledge, web, 3),
            Synthesizer::new(provider, &LlmConfig::default()),
            sessions,
        )
    }

    #[tokio::test]
    async fn knowledge_answer_is_recorded() {
        let sessions = Arc::new(InMemorySessionStore::new(50));
        let agent = agent(
            ScriptedProvider::replying("Use the reset link."),
            FakeKnowledge::with(vec![hit("Reset via settings", 0.9)]),
            FakeWeb::with(vec![]),
            sessions.clone(),
        );

        let response = agent
            .generate_response(ChatRequest {
                user_id: Some("u-7".into()),
                ..ChatRequest::new("How do I reset my password?").with_session("s-1")
            })
            .await;

        assert_eq!(response.response, "Use the reset link.");
        assert_eq!(response.source, ResponseSource::KnowledgeBase);
        assert!((response.confidence - 0.9).abs() < 1e-9);
        assert_eq!(response.metadata["session_id"], "s-1");
        assert_eq!(response.metadata["user_id"], "u-7");
        assert_eq!(response.metadata["knowledge_results_count"], 1);
        assert_eq!(response.metadata["model_used"], "gpt-4");
        assert_eq!(response.metadata["tokens_used"], 42);

        let history = agent.history("s-1", None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].user_id.as_deref(), Some("u-7"));
        assert_eq!(history[1].source, Some(ResponseSource::KnowledgeBase));
    }

    #[tokio::test]
    async fn history_is_replayed_on_next_turn() {
        let provider = ScriptedProvider::replying("ok");
        let agent = agent(
            provider.clone(),
            FakeKnowledge::with(vec![]),
            FakeWeb::with(vec![]),
            Arc::new(InMemorySessionStore::new(50)),
        );

        agent
            .generate_response(ChatRequest::new("first").with_session("s"))
            .await;
        agent
            .generate_response(ChatRequest::new("second").with_session("s"))
            .await;

        let request = provider.last_request();
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[0], "first");
        assert_eq!(contents[1], "ok");
        assert!(contents[2].ends_with("User Query: second"));
        assert!(contents[2].starts_with(
            "Context: No relevant information found in knowledge base or web search."
        ));
    }

    #[tokio::test]
    async fn caller_context_is_appended() {
        let provider = ScriptedProvider::replying("ok");
        let agent = agent(
            provider.clone(),
            FakeKnowledge::with(vec![]),
            FakeWeb::with(vec![web("status")]),
            Arc::new(InMemorySessionStore::new(50)),
        );

        let response = agent
            .generate_response(ChatRequest {
                context: Some("Customer is on the Pro plan".into()),
                ..ChatRequest::new("Is there an outage?")
            })
            .await;
        assert_eq!(response.source, ResponseSource::WebSearch);
        assert_eq!(response.confidence, 0.6);
        assert!(provider.last_request().messages[0]
            .content
            .contains("\n\nAdditional Context: Customer is on the Pro plan"));
    }

    #[tokio::test]
    async fn missing_session_id_is_generated() {
        let agent = agent(
            ScriptedProvider::replying("ok"),
            FakeKnowledge::with(vec![]),
            FakeWeb::with(vec![]),
            Arc::new(InMemorySessionStore::new(50)),
        );
        let response = agent.generate_response(ChatRequest::new("hello")).await;
        let session_id = response.metadata["session_id"].as_str().unwrap();
        assert!(Uuid::parse_str(session_id).is_ok());
        assert_eq!(response.source, ResponseSource::NoData);
        assert_eq!(response.confidence, 0.3);
    }

    #[tokio::test]
    async fn provider_failure_yields_error_envelope_without_recording() {
        let sessions = Arc::new(InMemorySessionStore::new(50));
        let agent = agent(
            ScriptedProvider::failing(),
            FakeKnowledge::with(vec![hit("a", 0.8)]),
            FakeWeb::with(vec![]),
            sessions.clone(),
        );

        let response = agent
            .generate_response(ChatRequest::new("hello").with_session("s"))
            .await;
        assert_eq!(response.response, ERROR_RESPONSE);
        assert_eq!(response.source, ResponseSource::Error);
        assert_eq!(response.confidence, 0.0);
        assert!(response.metadata["error"]
            .as_str()
            .unwrap()
            .contains("completion request failed"));
        assert!(sessions.get("s", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_and_stats_delegate_to_store() {
        let agent = agent(
            ScriptedProvider::replying("ok"),
            FakeKnowledge::with(vec![]),
            FakeWeb::with(vec![]),
            Arc::new(InMemorySessionStore::new(50)),
        );
        agent
            .generate_response(ChatRequest::new("hi").with_session("s"))
            .await;

        let stats = agent.conversation_stats("s").await.unwrap();
        assert_eq!(stats.message_count, 2);
        assert!(agent.clear_conversation("s").await.unwrap());
        assert_eq!(agent.conversation_stats("s").await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn health_reports_each_collaborator() {
        let healthy = agent(
            ScriptedProvider::replying("ok"),
            FakeKnowledge::with(vec![]),
            FakeWeb::with(vec![]),
            Arc::new(InMemorySessionStore::new(50)),
        )
        .health()
        .await;
        assert!(healthy.is_healthy());

        let degraded = agent(
            ScriptedProvider::failing(),
            FakeKnowledge::failing(),
            FakeWeb::with(vec![]),
            Arc::new(InMemorySessionStore::new(50)),
        )
        .health()
        .await;
        assert!(!degraded.llm_provider);
        assert!(!degraded.knowledge_store);
        assert!(!degraded.is_healthy());
    }
}
