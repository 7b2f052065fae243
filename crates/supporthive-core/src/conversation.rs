use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use supporthive_schema::{ConversationTurn, Role};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    /// Seconds between the first and last retained turn.
    pub session_duration_secs: f64,
}

/// Per-session turn history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, session_id: &str, turn: ConversationTurn) -> Result<()>;
    /// Oldest first. `limit` keeps only the most recent turns; `None` or 0 returns all.
    async fn get(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<ConversationTurn>>;
    /// Remove the session. Returns whether it existed.
    async fn clear(&self, session_id: &str) -> Result<bool>;
    async fn stats(&self, session_id: &str) -> Result<SessionStats>;
    async fn session_ids(&self) -> Result<Vec<String>>;
}

/// Process-lifetime store keeping at most `max_turns` turns per session.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, VecDeque<ConversationTurn>>>,
    max_turns: usize,
}

impl InMemorySessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, VecDeque<ConversationTurn>>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("conversation store lock poisoned"))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, turn: ConversationTurn) -> Result<()> {
        let mut sessions = self.lock()?;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push_back(turn);
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
        Ok(())
    }

    async fn get(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<ConversationTurn>> {
        let sessions = self.lock()?;
        let Some(turns) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let skip = match limit {
            Some(limit) if limit > 0 => turns.len().saturating_sub(limit),
            _ => 0,
        };
        Ok(turns.iter().skip(skip).cloned().collect())
    }

    async fn clear(&self, session_id: &str) -> Result<bool> {
        let existed = self.lock()?.remove(session_id).is_some();
        if existed {
            tracing::info!(session_id, "conversation cleared");
        }
        Ok(existed)
    }

    async fn stats(&self, session_id: &str) -> Result<SessionStats> {
        let sessions = self.lock()?;
        let Some(turns) = sessions.get(session_id) else {
            return Ok(SessionStats::default());
        };
        let (Some(first), Some(last)) = (turns.front(), turns.back()) else {
            return Ok(SessionStats::default());
        };

        let duration = last.timestamp - first.timestamp;
        Ok(SessionStats {
            message_count: turns.len(),
            user_messages: turns.iter().filter(|t| t.role == Role::User).count(),
            assistant_messages: turns.iter().filter(|t| t.role == Role::Assistant).count(),
            session_duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        })
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
