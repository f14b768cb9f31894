use super::{assemble_context, DEFAULT_RETRIEVAL_TOP_K, MAX_CONTEXT_CHARS};
use crate::error::CollaboratorError;
use crate::index::EmbeddingIndex;
use crate::models::{AnalysisData, Namespace, ResolvedEntity};
use crate::traits::{Analyzer, CompletionClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Answers financial-performance questions from a top-k semantic search over
/// the MD&A and financial-statement sections.
pub struct FinancialAnalyzer {
    completion: Arc<dyn CompletionClient>,
    sections: Vec<String>,
    top_k: usize,
}

impl FinancialAnalyzer {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            completion,
            sections: vec!["7".to_string(), "8".to_string()],
            top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl Analyzer for FinancialAnalyzer {
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
            warn!(%namespace, "no financial context retrieved");
            return Ok(AnalysisData::Text(String::new()));
        }

        let prompt = format!(
            "You are a financial analysis assistant. Analyze the following 10-K filing data \
             and answer the user's question about the company's financial status.\n\n\
             Company: {company}\n\
             User Question: {query}\n\n\
             10-K Filing Data:\n{context}\n\n\
             Provide a clear, concise analysis focusing on key financial metrics and \
             performance, revenue trends and profitability, financial health indicators, \
             and important financial highlights.",
            company = entity.canonical_name,
        );
        self.completion.complete(&prompt).await.map(AnalysisData::Text)
    }
}
