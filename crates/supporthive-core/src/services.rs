use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use supporthive_knowledge::{
    DocumentLoader, EmbeddingProvider, KnowledgeStore, OpenAiEmbeddingProvider, PineconeConfig,
    PineconeIndex, SqliteIndex, StubEmbeddingProvider, VectorIndex,
};
use supporthive_provider::{create_provider, LlmProvider, ProviderConfig, ProviderType};
use supporthive_search::WebSearchClient;

use crate::agent::ChatAgent;
use crate::config::SupportConfig;
use crate::conversation::{InMemorySessionStore, SessionStore};
use crate::retrieval::Retriever;
use crate::synthesizer::Synthesizer;

/// Every long-lived component, wired from one configuration.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<SupportConfig>,
    pub agent: Arc<ChatAgent>,
    pub loader: Arc<DocumentLoader>,
    pub search: Arc<WebSearchClient>,
}

impl Services {
    pub fn build(config: SupportConfig, data_dir: &Path) -> Result<Self> {
        let llm = build_llm_provider(&config)?;
        let embedder = build_embedder(&config);
        let index = build_index(&config, data_dir)?;
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(config.conversation.max_history));
        Ok(Self::assemble(config, llm, embedder, index, sessions))
    }

    /// Wire already-constructed collaborators. Used by tests and embedders.
    pub fn assemble(
        config: SupportConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self::assemble_with_search(config, llm, embedder, index, sessions, None)
    }

    pub fn assemble_with_search(
        config: SupportConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        sessions: Arc<dyn SessionStore>,
        search: Option<WebSearchClient>,
    ) -> Self {
        let store = Arc::new(KnowledgeStore::new(embedder, index));
        let search = Arc::new(search.unwrap_or_else(|| {
            WebSearchClient::from_credentials(
                config.search.google_credentials(),
                config.search.serpapi_api_key.clone(),
            )
        }));
        let retriever = Retriever::new(
            store.clone(),
            search.clone(),
            config.search.retrieval_top_k,
        );
        let synthesizer = Synthesizer::new(llm, &config.llm);
        let agent = Arc::new(ChatAgent::new(retriever, synthesizer, sessions));
        let loader = Arc::new(DocumentLoader::new(store));

        Self {
            config: Arc::new(config),
            agent,
            loader,
            search,
        }
    }
}

fn build_llm_provider(config: &SupportConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider_type = match (&config.llm.provider, &config.llm.api_key) {
        (Some(kind), _) => kind.clone(),
        (None, Some(_)) => ProviderType::OpenAI,
        (None, None) => {
            tracing::warn!("OPENAI_API_KEY not set, using the offline stub provider");
            ProviderType::Stub
        }
    };
    let mut provider_config = ProviderConfig::new(provider_type);
    provider_config.api_key = config.llm.api_key.clone();
    provider_config.base_url = config.llm.base_url.clone();
    create_provider(&provider_config)
}

fn build_embedder(config: &SupportConfig) -> Arc<dyn EmbeddingProvider> {
    match config.embedding_api_key() {
        Some(key) => {
            let mut provider = OpenAiEmbeddingProvider::with_model(
                key.to_string(),
                config.embedding.model.clone(),
                config.embedding.dimensions,
            );
            if let Some(base_url) = config
                .embedding
                .base_url
                .as_ref()
                .or(config.llm.base_url.as_ref())
            {
                provider = provider.with_base_url(base_url.clone());
            }
            Arc::new(provider)
        }
        None => {
            tracing::warn!("no embedding key configured, knowledge search uses hash embeddings");
            Arc::new(StubEmbeddingProvider::new(config.embedding.dimensions))
        }
    }
}

fn build_index(config: &SupportConfig, data_dir: &Path) -> Result<Arc<dyn VectorIndex>> {
    let store = &config.vector_store;
    if let Some(api_key) = &store.pinecone_api_key {
        let pinecone = PineconeConfig {
            api_key: api_key.clone(),
            index_name: store.index_name.clone(),
            environment: store.environment.clone(),
            project_id: store.project_id.clone(),
            host: store.host.clone(),
            dimension: store.dimension,
        };
        match pinecone.resolve_host() {
            Ok(_) => {
                let index = PineconeIndex::new(&pinecone)?;
                tracing::info!(index = %store.index_name, "using pinecone vector index");
                return Ok(Arc::new(index));
            }
            Err(e) => {
                tracing::warn!("pinecone key set but index host unknown, using local sqlite index: {e}");
            }
        }
    }

    let path = store
        .sqlite_path
        .clone()
        .unwrap_or_else(|| data_dir.join("knowledge.db"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let index = SqliteIndex::open(&path, store.index_name.clone(), store.dimension)?;
    tracing::info!(path = %path.display(), "using local sqlite vector index");
    Ok(Arc::new(index))
}
