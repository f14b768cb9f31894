use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-shape provenance for one indexed chunk. Chunk identity within a
/// namespace is `(section, sequence)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub entity_id: String,
    pub period: String,
    pub section: String,
    pub sequence: u32,
}

/// A bounded text segment plus its provenance; the unit of embedding and
/// retrieval. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Composite key identifying one indexed document instance, rendered as
/// `{entity}_{period}_{doc_type}` on disk (e.g. `ACME_2024_10k`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub entity_id: String,
    pub period: String,
    pub doc_type: String,
}

impl Namespace {
    pub fn new(
        entity_id: impl Into<String>,
        period: impl Into<String>,
        doc_type: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            period: period.into(),
            doc_type: doc_type.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.entity_id, self.period, self.doc_type)
    }

    /// Inverse of [`Namespace::key`] for keys whose entity id carries no
    /// underscore.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, '_');
        let entity_id = parts.next()?;
        let period = parts.next()?;
        let doc_type = parts.next()?;
        if entity_id.is_empty() || period.is_empty() || doc_type.is_empty() {
            return None;
        }
        Some(Self::new(entity_id, period, doc_type))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.key())
    }
}

/// The classified purpose of a query; selects required sections and the
/// analyzer that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FinancialStatus,
    RelationshipGraph,
    RiskAnalysis,
    GeneralSummary,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::FinancialStatus,
        Intent::RelationshipGraph,
        Intent::RiskAnalysis,
        Intent::GeneralSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FinancialStatus => "financial_status",
            Intent::RelationshipGraph => "relationship_graph",
            Intent::RiskAnalysis => "risk_analysis",
            Intent::GeneralSummary => "general_summary",
        }
    }

    pub fn from_name(name: &str) -> Option<Intent> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == name.trim())
    }

    /// One-line routing description, used when prompting a classifier.
    pub fn description(&self) -> &'static str {
        match self {
            Intent::FinancialStatus => {
                "questions about financial performance, revenue, profits, metrics, and financial health"
            }
            Intent::RelationshipGraph => {
                "questions about subsidiaries, partnerships, investments, and corporate structure"
            }
            Intent::RiskAnalysis => "questions about risks, threats, challenges, and risk factors",
            Intent::GeneralSummary => {
                "general questions about companies and broad business overviews"
            }
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

/// A company resolved from free-form query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub ticker: String,
    pub canonical_name: String,
    pub cik: Option<String>,
}

/// The most recent primary filing located for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRef {
    pub url: String,
    pub period: String,
}

/// Analyzer output: prose or a structured payload. `Text` is listed first so
/// untagged deserialization maps JSON strings back to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisData {
    Text(String),
    Structured(serde_json::Value),
}

impl AnalysisData {
    pub fn is_empty(&self) -> bool {
        match self {
            AnalysisData::Text(text) => text.trim().is_empty(),
            AnalysisData::Structured(value) => value.is_null(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            AnalysisData::Text(_) => DataType::Text,
            AnalysisData::Structured(_) => DataType::Structured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Structured,
    Unknown,
}

/// What `handle` returns for every query: analysis output on success, a
/// user-facing diagnostic (with `data_type = unknown`) otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub intent: Intent,
    pub entity_name: String,
    pub data: AnalysisData,
    pub data_type: DataType,
    pub success: bool,
}

impl AnalysisOutcome {
    pub fn failure(
        intent: Intent,
        entity_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            intent,
            entity_name: entity_name.into(),
            data: AnalysisData::Text(message.into()),
            data_type: DataType::Unknown,
            success: false,
        }
    }
}

/// One nearest-neighbor hit: the stored chunk and its Euclidean distance to
/// the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_key_round_trips() {
        let namespace = Namespace::new("ACME", "2024", "10k");
        assert_eq!(namespace.key(), "ACME_2024_10k");
        assert_eq!(Namespace::parse("ACME_2024_10k"), Some(namespace));
    }

    #[test]
    fn namespace_parse_rejects_malformed_keys() {
        assert_eq!(Namespace::parse("ACME_2024"), None);
        assert_eq!(Namespace::parse("_2024_10k"), None);
        assert_eq!(Namespace::parse(""), None);
    }

    #[test]
    fn intent_names_round_trip() {
        for intent in Intent::ALL {
            assert_eq!(Intent::from_name(intent.as_str()), Some(intent));
        }
        assert_eq!(Intent::from_name("weather_report"), None);
    }

    #[test]
    fn empty_analysis_data_is_detected() {
        assert!(AnalysisData::Text("   ".to_string()).is_empty());
        assert!(AnalysisData::Structured(serde_json::Value::Null).is_empty());
        assert!(!AnalysisData::Text("revenue grew".to_string()).is_empty());
    }
}
