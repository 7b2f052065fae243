pub mod embedding;
pub mod index;
pub mod loader;
pub mod normalize;
pub mod pinecone;
pub mod sqlite_index;
pub mod store;

pub use embedding::{
    EmbeddingProvider, EmbeddingResult, OpenAiEmbeddingProvider, StubEmbeddingProvider,
};
pub use index::{IndexMatch, IndexRecord, IndexStats, VectorIndex};
pub use loader::{DocumentLoader, IngestError, LoaderStatistics, MAX_FILE_SIZE};
pub use normalize::{normalize, ContentFormat};
pub use pinecone::{PineconeConfig, PineconeIndex};
pub use sqlite_index::SqliteIndex;
pub use store::{KnowledgeStatistics, KnowledgeStore};
