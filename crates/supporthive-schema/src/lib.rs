use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_CATEGORY: &str = "general";

/// A knowledge-base document as held by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for a document that has not been stored yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "document_id")]
    pub id: Option<String>,
}

impl NewDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Materialize into a stored document, filling the id and defaults.
    pub fn into_document(self, now: DateTime<Utc>) -> Document {
        Document {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            content: self.content,
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            category: self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            tags: self.tags.into_iter().collect(),
            created_at: now,
            updated_at: None,
        }
    }
}

/// Partial update of a stored document. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl DocumentPatch {
    /// True when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.title.is_none()
            && self.category.is_none()
            && self.tags.is_none()
    }
}

/// One similarity match returned by the knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeHit {
    pub id: String,
    pub content: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub score: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    /// Provider tag, e.g. `google` or `serpapi`.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Which retrieval path produced an answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    KnowledgeBase,
    WebSearch,
    NoData,
    Error,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::KnowledgeBase => "knowledge_base",
            ResponseSource::WebSearch => "web_search",
            ResponseSource::NoData => "no_data",
            ResponseSource::Error => "error",
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            user_id,
            source: None,
            confidence: None,
        }
    }

    pub fn assistant(content: impl Into<String>, source: ResponseSource, confidence: f64) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            user_id: None,
            source: Some(source),
            confidence: Some(confidence),
        }
    }
}

/// Inbound chat query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The envelope produced once per answered query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub source: ResponseSource,
    pub confidence: f64,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Structured outcome of a knowledge-base mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default)]
    pub document_id: Option<String>,
    pub message: String,
}

impl OperationResult {
    pub fn ok(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            document_id: Some(document_id.into()),
            message: message.into(),
        }
    }

    pub fn failed(document_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            document_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub name: String,
    pub result: OperationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub message: String,
    #[serde(default)]
    pub results: Vec<BatchItem>,
}

impl BatchResult {
    pub fn from_items(items: Vec<BatchItem>) -> Self {
        let succeeded = items.iter().filter(|item| item.result.success).count();
        let total = items.len();
        Self {
            success: true,
            total,
            succeeded,
            failed: total - succeeded,
            message: format!("Processed {total} documents: {succeeded} succeeded"),
            results: items,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            total: 0,
            succeeded: 0,
            failed: 0,
            message: message.into(),
            results: Vec::new(),
        }
    }
}
