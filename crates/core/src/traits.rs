use crate::error::CollaboratorError;
use crate::index::EmbeddingIndex;
use crate::models::{AnalysisData, FilingRef, Intent, Namespace, ResolvedEntity};
use async_trait::async_trait;

/// Maps free-form query text to a known company, or `None` when no company
/// can be identified.
#[async_trait]
pub trait EntityResolver {
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedEntity>, CollaboratorError>;
}

/// Classifies the purpose of a query. A failure here is never fatal; the
/// orchestrator substitutes its configured default intent.
#[async_trait]
pub trait IntentClassifier {
    async fn classify(&self, query: &str) -> Result<Intent, CollaboratorError>;
}

/// Finds the most recent primary filing for an entity. Implementations must
/// exclude amended variants.
#[async_trait]
pub trait FilingLocator {
    async fn latest_filing(
        &self,
        entity: &ResolvedEntity,
    ) -> Result<Option<FilingRef>, CollaboratorError>;
}

/// Fetches the raw text of one filing section; `None` when the section is
/// unavailable.
#[async_trait]
pub trait SectionExtractor {
    async fn extract(
        &self,
        filing_url: &str,
        section: &str,
    ) -> Result<Option<String>, CollaboratorError>;
}

/// Per-intent analysis capability. The analyzer owns its retrieval strategy
/// against the index handle it is given; the orchestrator does not prescribe
/// one.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        query: &str,
        entity: &ResolvedEntity,
        namespace: &Namespace,
        index: &EmbeddingIndex,
    ) -> Result<AnalysisData, CollaboratorError>;
}

/// Text-generation seam used by analyzers and the bundled intent classifier.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}
