use super::{assemble_context, DEFAULT_RETRIEVAL_TOP_K, MAX_CONTEXT_CHARS};
use crate::error::CollaboratorError;
use crate::index::EmbeddingIndex;
use crate::models::{AnalysisData, Namespace, ResolvedEntity};
use crate::traits::{Analyzer, CompletionClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Extracts corporate relationships from the business sections. When the
/// completion client answers with a relationship object the result is
/// structured; otherwise its prose is passed through.
pub struct RelationshipAnalyzer {
    completion: Arc<dyn CompletionClient>,
    sections: Vec<String>,
    top_k: usize,
}

impl RelationshipAnalyzer {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            completion,
            sections: vec!["1".to_string(), "2".to_string()],
            top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = sections;
        self
    }
}

#[async_trait]
impl Analyzer for RelationshipAnalyzer {
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
            warn!(%namespace, "no business-section context retrieved");
            return Ok(AnalysisData::Text(String::new()));
        }

        let prompt = format!(
            "You are a relationship analysis assistant. Analyze the following 10-K filing \
             data to identify company relationships, subsidiaries, partnerships, and \
             investments.\n\n\
             Company: {company}\n\
             User Question: {query}\n\n\
             10-K Filing Data (business section and subsidiaries):\n{context}\n\n\
             Identify subsidiaries and controlled companies, joint ventures and \
             partnerships, major investments and holdings, and strategic relationships. \
             If possible, answer with a JSON object of the form \
             {{\"relationships\": [{{\"source\": ..., \"target\": ..., \"kind\": ...}}]}}; \
             otherwise present the relationships as organized prose.",
            company = entity.canonical_name,
        );

        let answer = self.completion.complete(&prompt).await?;
        Ok(match parse_relationship_payload(&answer) {
            Some(value) => AnalysisData::Structured(value),
            None => AnalysisData::Text(answer),
        })
    }
}

/// Accepts a bare or code-fenced JSON object carrying a `relationships` key.
fn parse_relationship_payload(answer: &str) -> Option<Value> {
    let trimmed = strip_code_fence(answer.trim());
    let value: Value = serde_json::from_str(trimmed).ok()?;
    value.get("relationships")?;
    Some(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .trim_end()
        .trim_end_matches("```")
        .trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashedTrigramEmbedder;
    use crate::models::{Chunk, ChunkMetadata};
    use tempfile::tempdir;

    struct CannedCompletion(&'static str);

    #[async_trait]
    impl CompletionClient for CannedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Ok(self.0.to_string())
        }
    }

    fn seeded_index(dir: &std::path::Path) -> (EmbeddingIndex, Namespace) {
        let index = EmbeddingIndex::new(dir, Arc::new(HashedTrigramEmbedder { dimensions: 16 }));
        let namespace = Namespace::new("ACME", "2024", "10k");
        index
            .create(
                &namespace,
                &[Chunk {
                    text: "Acme operates through its subsidiary Acme Labs".to_string(),
                    metadata: ChunkMetadata {
                        entity_id: "ACME".to_string(),
                        period: "2024".to_string(),
                        section: "1".to_string(),
                        sequence: 0,
                    },
                }],
            )
            .unwrap();
        (index, namespace)
    }

    fn entity() -> ResolvedEntity {
        ResolvedEntity {
            ticker: "ACME".to_string(),
            canonical_name: "Acme Corp".to_string(),
            cik: None,
        }
    }

    #[tokio::test]
    async fn json_answers_become_structured_data() {
        let dir = tempdir().unwrap();
        let (index, namespace) = seeded_index(dir.path());
        let analyzer = RelationshipAnalyzer::new(Arc::new(CannedCompletion(
            "```json\n{\"relationships\": [{\"source\": \"Acme Corp\", \"target\": \"Acme Labs\", \"kind\": \"subsidiary\"}]}\n```",
        )));

        let data = analyzer
            .analyze("who does Acme own?", &entity(), &namespace, &index)
            .await
            .unwrap();

        match data {
            AnalysisData::Structured(value) => {
                assert_eq!(value["relationships"][0]["target"], "Acme Labs");
            }
            other => panic!("expected structured data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prose_answers_pass_through_as_text() {
        let dir = tempdir().unwrap();
        let (index, namespace) = seeded_index(dir.path());
        let analyzer = RelationshipAnalyzer::new(Arc::new(CannedCompletion(
            "Acme Corp wholly owns Acme Labs.",
        )));

        let data = analyzer
            .analyze("who does Acme own?", &entity(), &namespace, &index)
            .await
            .unwrap();
        assert_eq!(
            data,
            AnalysisData::Text("Acme Corp wholly owns Acme Labs.".to_string())
        );
    }

    #[test]
    fn payload_parsing_requires_the_relationships_key() {
        assert!(parse_relationship_payload("{\"relationships\": []}").is_some());
        assert!(parse_relationship_payload("{\"nodes\": []}").is_none());
        assert!(parse_relationship_payload("not json at all").is_none());
    }
}
