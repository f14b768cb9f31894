pub mod analyzers;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod edgar;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod resolve;
pub mod segmenter;
pub mod traits;

pub use analyzers::{FinancialAnalyzer, GeneralAnalyzer, RelationshipAnalyzer, RiskAnalyzer};
pub use classifier::CompletionIntentClassifier;
pub use completion::HttpCompletionClient;
pub use config::{IntentRoutes, RetryPolicy, SearchOptions, ANNUAL_REPORT_DOC_TYPE};
pub use edgar::FilingApiClient;
pub use embeddings::{Embedder, HashedTrigramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CollaboratorError, EngineError, StoreError};
pub use index::EmbeddingIndex;
pub use models::{
    AnalysisData, AnalysisOutcome, Chunk, ChunkMetadata, DataType, FilingRef, Intent, Namespace,
    ResolvedEntity, ScoredChunk,
};
pub use orchestrator::AnalysisCoordinator;
pub use resolve::{DirectoryEntry, TickerDirectory};
pub use segmenter::{Segmenter, SegmenterConfig};
pub use traits::{
    Analyzer, CompletionClient, EntityResolver, FilingLocator, IntentClassifier, SectionExtractor,
};
