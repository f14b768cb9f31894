use super::{assemble_context, DEFAULT_RETRIEVAL_TOP_K, MAX_CONTEXT_CHARS};
use crate::error::CollaboratorError;
use crate::index::EmbeddingIndex;
use crate::models::{AnalysisData, Namespace, ResolvedEntity};
use crate::traits::{Analyzer, CompletionClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Default analyzer: a broad business overview built from the business and
/// MD&A sections.
pub struct GeneralAnalyzer {
    completion: Arc<dyn CompletionClient>,
    sections: Vec<String>,
    top_k: usize,
}

impl GeneralAnalyzer {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            completion,
            sections: vec!["1".to_string(), "7".to_string()],
            top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = sections;
        self
    }
}

#[async_trait]
impl Analyzer for GeneralAnalyzer {
    async fn analyze(
        &self,
        query: &str,
        entity: &ResolvedEntity,
        namespace: &Namespace,
        index: &EmbeddingIndex,
    ) -> Result<AnalysisData, CollaboratorError> {
        let hits = index.search(namespace, query, self.top_k, Some(&self.sections))?;
        let context = assemble_context(
            hits.into_iter().map(|hit| hit.chunk.text),
            MAX_CONTEXT_CHARS,
        );
        if context.is_empty() {
            warn!(%namespace, "no overview context retrieved");
            return Ok(AnalysisData::Text(String::new()));
        }

        let prompt = format!(
            "You are a general business analysis assistant. Provide a comprehensive \
             overview of the company based on the following 10-K filing data.\n\n\
             Company: {company}\n\
             User Question: {query}\n\n\
             10-K Filing Data (business and MD&A sections):\n{context}\n\n\
             Provide a well-rounded summary covering what the company does, its key \
             business segments and operations, recent performance highlights, and its \
             market position and competitive landscape.",
            company = entity.canonical_name,
        );
        self.completion.complete(&prompt).await.map(AnalysisData::Text)
    }
}
