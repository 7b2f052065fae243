//! Waterfall retrieval: knowledge base, then web search, then nothing.
//!
//! Sources are never blended. The first source returning anything supplies
//! both the context handed to the model and the confidence reported back.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use supporthive_knowledge::KnowledgeStore;
use supporthive_schema::{KnowledgeHit, ResponseSource, WebResult};
use supporthive_search::WebSearchClient;

pub const NO_DATA_CONTEXT: &str =
    "No relevant information found in knowledge base or web search.";
pub const WEB_SEARCH_CONFIDENCE: f64 = 0.6;
pub const NO_DATA_CONFIDENCE: f64 = 0.3;
/// Applied to the mean score when at least two knowledge hits agree.
pub const MULTI_HIT_BOOST: f64 = 1.1;

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn search_knowledge(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>>;
    async fn is_available(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait WebSource: Send + Sync {
    /// Never fails; provider errors come back as an empty list.
    async fn search_web(&self, query: &str, limit: usize) -> Vec<WebResult>;
    fn is_configured(&self) -> bool {
        true
    }
}

#[async_trait]
impl KnowledgeSource for KnowledgeStore {
    async fn search_knowledge(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        self.search(query, limit).await
    }

    async fn is_available(&self) -> bool {
        KnowledgeStore::is_available(self).await
    }
}

#[async_trait]
impl WebSource for WebSearchClient {
    async fn search_web(&self, query: &str, limit: usize) -> Vec<WebResult> {
        self.search(query, limit).await
    }

    fn is_configured(&self) -> bool {
        WebSearchClient::is_configured(self)
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub context: String,
    pub source: ResponseSource,
    pub confidence: f64,
    pub knowledge_hits: Vec<KnowledgeHit>,
    pub web_results: Vec<WebResult>,
}

#[derive(Clone)]
pub struct Retriever {
    knowledge: Arc<dyn KnowledgeSource>,
    web: Arc<dyn WebSource>,
    top_k: usize,
}

impl Retriever {
    pub fn new(knowledge: Arc<dyn KnowledgeSource>, web: Arc<dyn WebSource>, top_k: usize) -> Self {
        Self {
            knowledge,
            web,
            top_k: top_k.max(1),
        }
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeSource> {
        &self.knowledge
    }

    pub fn web(&self) -> &Arc<dyn WebSource> {
        &self.web
    }

    pub async fn resolve(&self, query: &str) -> Resolution {
        let hits = match self.knowledge.search_knowledge(query, self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("knowledge search failed, continuing without it: {e:#}");
                Vec::new()
            }
        };

        if !hits.is_empty() {
            let confidence = knowledge_confidence(&hits);
            tracing::debug!(hits = hits.len(), confidence, "answering from knowledge base");
            return Resolution {
                context: format_knowledge_context(&hits),
                source: ResponseSource::KnowledgeBase,
                confidence,
                knowledge_hits: hits,
                web_results: Vec::new(),
            };
        }

        let web_results = self.web.search_web(query, self.top_k).await;
        if !web_results.is_empty() {
            tracing::debug!(results = web_results.len(), "answering from web search");
            return Resolution {
                context: format_web_context(&web_results),
                source: ResponseSource::WebSearch,
                confidence: WEB_SEARCH_CONFIDENCE,
                knowledge_hits: Vec::new(),
                web_results,
            };
        }

        tracing::debug!("no retrieval source produced results");
        Resolution {
            context: NO_DATA_CONTEXT.to_string(),
            source: ResponseSource::NoData,
            confidence: NO_DATA_CONFIDENCE,
            knowledge_hits: Vec::new(),
            web_results: Vec::new(),
        }
    }
}

/// Mean hit score, boosted when two or more hits agree, clamped to [0, 1].
pub fn knowledge_confidence(hits: &[KnowledgeHit]) -> f64 {
    if hits.is_empty() {
        return 0.0;
    }
    let mut confidence = hits.iter().map(|hit| hit.score).sum::<f64>() / hits.len() as f64;
    if hits.len() >= 2 {
        confidence *= MULTI_HIT_BOOST;
    }
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

pub fn format_knowledge_context(hits: &[KnowledgeHit]) -> String {
    let mut lines = vec!["Knowledge Base Information:".to_string()];
    for (i, hit) in hits.iter().enumerate() {
        lines.push(format!("{}. {} (Relevance: {:.2})", i + 1, hit.content, hit.score));
    }
    lines.join("\n")
}

pub fn format_web_context(results: &[WebResult]) -> String {
    let mut lines = vec!["Web Search Results:".to_string()];
    for (i, result) in results.iter().enumerate() {
        lines.push(format!(
            "{}. {}\n   {}\n   Source: {}",
            i + 1,
            result.title,
            result.snippet,
            result.url
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use anyhow::anyhow;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn hit(content: &str, score: f64) -> KnowledgeHit {
        KnowledgeHit {
            id: format!("id-{content}"),
            content: content.to_string(),
            title: "Untitled".into(),
            category: "general".into(),
            tags: Default::default(),
            score,
            created_at: None,
        }
    }

    pub fn web(title: &str) -> WebResult {
        WebResult {
            title: title.to_string(),
            snippet: format!("about {title}"),
            url: format!("https://example.com/{title}"),
            source: "fake".into(),
            timestamp: Utc::now(),
        }
    }

    pub struct FakeKnowledge {
        pub hits: Vec<KnowledgeHit>,
        pub fail: bool,
    }

    impl FakeKnowledge {
        pub fn with(hits: Vec<KnowledgeHit>) -> Arc<Self> {
            Arc::new(Self { hits, fail: false })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                hits: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl KnowledgeSource for FakeKnowledge {
        async fn search_knowledge(&self, _query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
            if self.fail {
                return Err(anyhow!("index offline"));
            }
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        async fn is_available(&self) -> bool {
            !self.fail
        }
    }

    pub struct FakeWeb {
        pub results: Vec<WebResult>,
        pub calls: AtomicUsize,
    }

    impl FakeWeb {
        pub fn with(results: Vec<WebResult>) -> Arc<Self> {
            Arc::new(Self {
                results,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebSource for FakeWeb {
        async fn search_web(&self, _query: &str, limit: usize) -> Vec<WebResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.iter().take(limit).cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    fn retriever(knowledge: Arc<FakeKnowledge>, web: Arc<FakeWeb>) -> Retriever {
        Retriever::new(knowledge, web, 3)
    }

    #[tokio::test]
    async fn single_hit_uses_raw_score() {
        let web = FakeWeb::with(vec![web("ignored")]);
        let resolution = retriever(FakeKnowledge::with(vec![hit("a", 0.8)]), web.clone())
            .resolve("q")
            .await;
        assert_eq!(resolution.source, ResponseSource::KnowledgeBase);
        assert!((resolution.confidence - 0.8).abs() < 1e-9);
        assert_eq!(web.calls(), 0);
    }

    #[tokio::test]
    async fn multiple_hits_are_boosted() {
        let resolution = retriever(
            FakeKnowledge::with(vec![hit("a", 0.6), hit("b", 0.4)]),
            FakeWeb::with(vec![]),
        )
        .resolve("q")
        .await;
        assert!((resolution.confidence - 0.55).abs() < 1e-9);
        assert_eq!(resolution.knowledge_hits.len(), 2);
    }

    #[tokio::test]
    async fn boosted_confidence_is_capped() {
        let resolution = retriever(
            FakeKnowledge::with(vec![hit("a", 0.98), hit("b", 0.97), hit("c", 0.99)]),
            FakeWeb::with(vec![]),
        )
        .resolve("q")
        .await;
        assert_eq!(resolution.confidence, 1.0);
    }

    #[tokio::test]
    async fn web_fallback_has_fixed_confidence() {
        let resolution = retriever(FakeKnowledge::with(vec![]), FakeWeb::with(vec![web("faq")]))
            .resolve("q")
            .await;
        assert_eq!(resolution.source, ResponseSource::WebSearch);
        assert_eq!(resolution.confidence, 0.6);
        assert_eq!(
            resolution.context,
            "Web Search Results:\n1. faq\n   about faq\n   Source: https://example.com/faq"
        );
    }

    #[tokio::test]
    async fn knowledge_failure_falls_through_to_web() {
        let web = FakeWeb::with(vec![web("faq")]);
        let resolution = retriever(FakeKnowledge::failing(), web.clone())
            .resolve("q")
            .await;
        assert_eq!(resolution.source, ResponseSource::WebSearch);
        assert_eq!(web.calls(), 1);
    }

    #[tokio::test]
    async fn nothing_found_is_no_data() {
        let resolution = retriever(FakeKnowledge::with(vec![]), FakeWeb::with(vec![]))
            .resolve("q")
            .await;
        assert_eq!(resolution.source, ResponseSource::NoData);
        assert_eq!(resolution.confidence, 0.3);
        assert_eq!(resolution.context, NO_DATA_CONTEXT);
    }

    #[test]
    fn knowledge_context_format() {
        let context = format_knowledge_context(&[hit("Reset in settings", 0.876), hit("Or email", 0.5)]);
        assert_eq!(
            context,
            "Knowledge Base Information:\n1. Reset in settings (Relevance: 0.88)\n2. Or email (Relevance: 0.50)"
        );
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        for scores in [vec![0.0], vec![1.0, 1.0], vec![0.2, 0.9, 0.95], vec![]] {
            let hits: Vec<_> = scores.iter().map(|s| hit("x", *s)).collect();
            let confidence = knowledge_confidence(&hits);
            assert!((0.0..=1.0).contains(&confidence), "{scores:?} -> {confidence}");
        }
    }
}
