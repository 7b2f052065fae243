pub mod agent;
pub mod config;
pub mod conversation;
pub mod retrieval;
pub mod services;
pub mod synthesizer;

pub use agent::{AgentHealth, ChatAgent, ERROR_RESPONSE};
pub use config::SupportConfig;
pub use conversation::{InMemorySessionStore, SessionStats, SessionStore};
pub use retrieval::{KnowledgeSource, Resolution, Retriever, WebSource};
pub use services::Services;
pub use synthesizer::{Synthesis, Synthesizer, SYSTEM_PROMPT};
