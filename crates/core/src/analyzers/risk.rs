use super::{assemble_context, MAX_CONTEXT_CHARS};
use crate::error::CollaboratorError;
use crate::index::EmbeddingIndex;
use crate::models::{AnalysisData, Namespace, ResolvedEntity};
use crate::traits::{Analyzer, CompletionClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

const RISK_SECTION: &str = "1A";

/// Summarizes the risk-factors section. Risk questions are answered from the
/// whole section rather than a similarity sample, so this analyzer pulls
/// every stored chunk of item 1A in order.
pub struct RiskAnalyzer {
    completion: Arc<dyn CompletionClient>,
    section: String,
}

impl RiskAnalyzer {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            completion,
            section: RISK_SECTION.to_string(),
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }
}

#[async_trait]
impl Analyzer for RiskAnalyzer {
    async fn analyze(
        &self,
        query: &str,
        entity: &ResolvedEntity,
        namespace: &Namespace,
        index: &EmbeddingIndex,
    ) -> Result<AnalysisData, CollaboratorError> {
        let chunks = index.chunks_for_section(namespace, &self.section)?;
        let context = assemble_context(chunks.into_iter().map(|chunk| chunk.text), MAX_CONTEXT_CHARS);
        if context.is_empty() {
            warn!(%namespace, section = %self.section, "no risk-factor text indexed");
            return Ok(AnalysisData::Text(String::new()));
        }

        let prompt = format!(
            "You are a risk analysis assistant. Analyze the following 10-K risk factors \
             section and summarize the key risks facing the company.\n\n\
             Company: {company}\n\
             User Question: {query}\n\n\
             Risk Factors Section:\n{context}\n\n\
             Summarize the main risks in categories such as market and competitive risks, \
             operational risks, financial risks, regulatory and compliance risks, and \
             technology and cybersecurity risks. Provide a clear, organized summary of the \
             most significant risks.",
            company = entity.canonical_name,
        );
        self.completion.complete(&prompt).await.map(AnalysisData::Text)
    }
}
