use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use supporthive_provider::ProviderType;

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_history_turns() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `None` picks openai when a key is present, otherwise the stub.
    #[serde(default)]
    pub provider: Option<ProviderType>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Prior turns replayed into each completion request.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            api_key: None,
            base_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_dimension() -> usize {
    1536
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Falls back to `llm.api_key`; without any key the hash stub is used.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_embedding_model(),
            dimensions: default_dimension(),
        }
    }
}

fn default_index_name() -> String {
    "customer-support".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub pinecone_api_key: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Local index file used when no Pinecone key is configured.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            pinecone_api_key: None,
            environment: None,
            project_id: None,
            host: None,
            index_name: default_index_name(),
            dimension: default_dimension(),
            sqlite_path: None,
        }
    }
}

fn default_max_results() -> usize {
    5
}

fn default_retrieval_top_k() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default)]
    pub google_cse_id: Option<String>,
    #[serde(default)]
    pub serpapi_api_key: Option<String>,
    /// Default `limit` for the search endpoints.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Hits requested from each source while answering a chat query.
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            google_cse_id: None,
            serpapi_api_key: None,
            max_results: default_max_results(),
            retrieval_top_k: default_retrieval_top_k(),
        }
    }
}

impl SearchConfig {
    pub fn google_credentials(&self) -> Option<(String, String)> {
        match (&self.google_api_key, &self.google_cse_id) {
            (Some(key), Some(cx)) => Some((key.clone(), cx.clone())),
            _ => None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_max_history() -> usize {
    50
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_min_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turns kept per session; older turns are dropped first.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Reported in `/config/`; sessions are not expired.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    /// Reported in `/config/`; answers are not filtered on it.
    #[serde(default = "default_min_confidence")]
    pub min_confidence_score: f64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            session_timeout_secs: default_session_timeout(),
            min_confidence_score: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

impl SupportConfig {
    /// Read an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => read_yaml_file(path)?,
            None => Self::default(),
        };
        config.resolve_placeholders();
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` placeholders in credential fields.
    pub fn resolve_placeholders(&mut self) {
        for field in [
            &mut self.llm.api_key,
            &mut self.embedding.api_key,
            &mut self.vector_store.pinecone_api_key,
            &mut self.search.google_api_key,
            &mut self.search.google_cse_id,
            &mut self.search.serpapi_api_key,
        ] {
            if let Some(raw) = field.take() {
                let resolved = resolve_env_var(&raw);
                *field = (!resolved.is_empty()).then_some(resolved);
            }
        }
    }

    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("OPENAI_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("OPENAI_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("OPENAI_TEMPERATURE") {
            self.llm.temperature = parse_env("OPENAI_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("PINECONE_API_KEY") {
            self.vector_store.pinecone_api_key = Some(v);
        }
        if let Some(v) = get("PINECONE_ENV") {
            self.vector_store.environment = Some(v);
        }
        if let Some(v) = get("PINECONE_PROJECT_ID") {
            self.vector_store.project_id = Some(v);
        }
        if let Some(v) = get("PINECONE_HOST") {
            self.vector_store.host = Some(v);
        }
        if let Some(v) = get("PINECONE_INDEX_NAME") {
            self.vector_store.index_name = v;
        }
        if let Some(v) = get("PINECONE_DIMENSION") {
            let dimension = parse_env("PINECONE_DIMENSION", &v)?;
            self.vector_store.dimension = dimension;
            self.embedding.dimensions = dimension;
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.search.google_api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_CSE_ID") {
            self.search.google_cse_id = Some(v);
        }
        if let Some(v) = get("SERPAPI_API_KEY") {
            self.search.serpapi_api_key = Some(v);
        }
        if let Some(v) = get("MAX_SEARCH_RESULTS") {
            self.search.max_results = parse_env("MAX_SEARCH_RESULTS", &v)?;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = get("DEBUG") {
            self.server.debug = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = get("ALLOWED_ORIGINS") {
            self.server.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("MAX_CONVERSATION_HISTORY") {
            self.conversation.max_history = parse_env("MAX_CONVERSATION_HISTORY", &v)?;
        }
        if let Some(v) = get("SESSION_TIMEOUT") {
            self.conversation.session_timeout_secs = parse_env("SESSION_TIMEOUT", &v)?;
        }
        if let Some(v) = get("MIN_CONFIDENCE_SCORE") {
            self.conversation.min_confidence_score = parse_env("MIN_CONFIDENCE_SCORE", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.conversation.max_history == 0 {
            return Err(anyhow!("conversation.max_history must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            ));
        }
        if self.embedding.dimensions != self.vector_store.dimension {
            return Err(anyhow!(
                "embedding.dimensions ({}) does not match vector_store.dimension ({})",
                self.embedding.dimensions,
                self.vector_store.dimension
            ));
        }
        Ok(())
    }

    /// Embedding key, falling back to the completion key.
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding
            .api_key
            .as_deref()
            .or(self.llm.api_key.as_deref())
    }

    /// Configuration echo with secrets replaced by presence flags.
    pub fn public_view(&self) -> serde_json::Value {
        let backend = if self.vector_store.pinecone_api_key.is_some() {
            "pinecone"
        } else {
            "sqlite"
        };
        serde_json::json!({
            "llm": {
                "model": self.llm.model,
                "max_tokens": self.llm.max_tokens,
                "temperature": self.llm.temperature,
                "base_url": self.llm.base_url,
            },
            "embedding": {
                "model": self.embedding.model,
                "dimensions": self.embedding.dimensions,
            },
            "vector_store": {
                "backend": backend,
                "index_name": self.vector_store.index_name,
                "dimension": self.vector_store.dimension,
                "environment": self.vector_store.environment,
            },
            "search": {
                "max_results": self.search.max_results,
                "retrieval_top_k": self.search.retrieval_top_k,
            },
            "server": {
                "host": self.server.host,
                "port": self.server.port,
                "debug": self.server.debug,
                "allowed_origins": self.server.allowed_origins,
            },
            "conversation": {
                "max_history": self.conversation.max_history,
                "session_timeout_secs": self.conversation.session_timeout_secs,
                "min_confidence_score": self.conversation.min_confidence_score,
            },
            "credentials": {
                "openai": self.llm.api_key.is_some(),
                "pinecone": self.vector_store.pinecone_api_key.is_some(),
                "google_search": self.search.google_credentials().is_some(),
                "serpapi": self.search.serpapi_api_key.is_some(),
            },
        })
    }
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("invalid value for {key}: {raw} ({e})"))
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}
