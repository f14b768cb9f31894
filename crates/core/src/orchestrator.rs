use crate::config::{IntentRoutes, ANNUAL_REPORT_DOC_TYPE};
use crate::error::EngineError;
use crate::index::EmbeddingIndex;
use crate::models::{
    AnalysisData, AnalysisOutcome, Chunk, ChunkMetadata, Intent, Namespace, ResolvedEntity,
};
use crate::segmenter::Segmenter;
use crate::traits::{Analyzer, EntityResolver, FilingLocator, IntentClassifier, SectionExtractor};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// Sequences one query through entity resolution, intent classification,
/// filing location, the cache-completeness check, fetch-and-index of missing
/// sections, and analyzer dispatch.
///
/// Queries are handled one at a time; nothing here locks the on-disk index,
/// so callers running concurrent queries against the same namespace must add
/// a namespace-keyed mutex or two writers can both see a section as missing
/// and append it twice.
pub struct AnalysisCoordinator<R, C, L, X>
where
    R: EntityResolver,
    C: IntentClassifier,
    L: FilingLocator,
    X: SectionExtractor,
{
    resolver: R,
    classifier: C,
    locator: L,
    extractor: X,
    index: EmbeddingIndex,
    segmenter: Segmenter,
    routes: IntentRoutes,
    analyzers: HashMap<Intent, Box<dyn Analyzer>>,
}

impl<R, C, L, X> AnalysisCoordinator<R, C, L, X>
where
    R: EntityResolver + Send + Sync,
    C: IntentClassifier + Send + Sync,
    L: FilingLocator + Send + Sync,
    X: SectionExtractor + Send + Sync,
{
    pub fn new(
        resolver: R,
        classifier: C,
        locator: L,
        extractor: X,
        index: EmbeddingIndex,
        segmenter: Segmenter,
    ) -> Self {
        Self {
            resolver,
            classifier,
            locator,
            extractor,
            index,
            segmenter,
            routes: IntentRoutes::default(),
            analyzers: HashMap::new(),
        }
    }

    pub fn with_routes(mut self, routes: IntentRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn register_analyzer(&mut self, intent: Intent, analyzer: Box<dyn Analyzer>) {
        self.analyzers.insert(intent, analyzer);
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Handles one query to completion. User-facing dead ends (no company
    /// identified, no filing found, no section data) come back as
    /// unsuccessful outcomes; only storage faults surface as errors.
    pub async fn handle(&self, query: &str) -> Result<AnalysisOutcome, EngineError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, query, "handling query");

        let Some(entity) = self.resolve_entity(query).await else {
            return Ok(AnalysisOutcome::failure(
                self.routes.default_intent,
                "",
                "I couldn't identify the company from your query.",
            ));
        };

        let intent = match self.classifier.classify(query).await {
            Ok(intent) => intent,
            Err(error) => {
                warn!(%error, default = %self.routes.default_intent, "intent classification failed");
                self.routes.default_intent
            }
        };
        info!(%intent, ticker = %entity.ticker, "query classified");

        let required = self.routes.required_sections(intent).to_vec();

        let Some(filing) = self.locate_filing(&entity).await else {
            return Ok(AnalysisOutcome::failure(
                intent,
                entity.canonical_name.clone(),
                format!(
                    "Could not find a recent 10-K filing for {}.",
                    entity.canonical_name
                ),
            ));
        };

        let namespace = Namespace::new(
            entity.ticker.clone(),
            filing.period.clone(),
            ANNUAL_REPORT_DOC_TYPE,
        );

        let inventory = self.index.list_sections(&namespace)?;
        let missing: Vec<String> = required
            .iter()
            .filter(|section| !inventory.contains(*section))
            .cloned()
            .collect();

        if missing.is_empty() {
            info!(%namespace, "all required sections already indexed");
        } else {
            info!(%namespace, ?missing, "fetching missing sections");
            let batch = self
                .fetch_and_segment(&entity, &filing.period, &filing.url, &missing)
                .await;

            if batch.is_empty() {
                warn!(%namespace, ?missing, "no data fetched for any missing section");
                return Ok(AnalysisOutcome::failure(
                    intent,
                    entity.canonical_name.clone(),
                    format!(
                        "No filing data could be retrieved for {}.",
                        entity.canonical_name
                    ),
                ));
            }

            // One write for the whole batch; per-section writes would pay the
            // embedding and publish cost once per section.
            if self.index.exists(&namespace) {
                self.index.append(&namespace, &batch)?;
            } else {
                self.index.create(&namespace, &batch)?;
            }
        }

        let data = self.dispatch(intent, query, &entity, &namespace).await;
        let success = !data.is_empty();
        Ok(AnalysisOutcome {
            intent,
            entity_name: entity.canonical_name,
            data_type: data.data_type(),
            data,
            success,
        })
    }

    async fn resolve_entity(&self, query: &str) -> Option<ResolvedEntity> {
        match self.resolver.resolve(query).await {
            Ok(Some(entity)) => {
                info!(ticker = %entity.ticker, name = %entity.canonical_name, "entity resolved");
                Some(entity)
            }
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "entity resolution failed");
                None
            }
        }
    }

    async fn locate_filing(&self, entity: &ResolvedEntity) -> Option<crate::models::FilingRef> {
        match self.locator.latest_filing(entity).await {
            Ok(Some(filing)) if !filing.url.trim().is_empty() => {
                info!(period = %filing.period, "filing located");
                Some(filing)
            }
            Ok(_) => None,
            Err(error) => {
                warn!(%error, ticker = %entity.ticker, "filing lookup failed");
                None
            }
        }
    }

    /// Fetches each missing section, segments it, and tags the chunks.
    /// A section that yields nothing contributes zero chunks and the
    /// pipeline continues.
    async fn fetch_and_segment(
        &self,
        entity: &ResolvedEntity,
        period: &str,
        filing_url: &str,
        missing: &[String],
    ) -> Vec<Chunk> {
        let mut batch = Vec::new();
        for section in missing {
            let text = match self.extractor.extract(filing_url, section).await {
                Ok(Some(text)) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!(section, "section extractor returned no text");
                    continue;
                }
                Err(error) => {
                    warn!(%error, section, "section extraction failed");
                    continue;
                }
            };

            let pieces = match self.segmenter.segment(&text) {
                Ok(pieces) => pieces,
                Err(error) => {
                    warn!(%error, section, "segmentation failed");
                    continue;
                }
            };

            for (sequence, piece) in pieces.into_iter().enumerate() {
                batch.push(Chunk {
                    text: piece,
                    metadata: ChunkMetadata {
                        entity_id: entity.ticker.clone(),
                        period: period.to_string(),
                        section: section.clone(),
                        sequence: sequence as u32,
                    },
                });
            }
        }
        batch
    }

    async fn dispatch(
        &self,
        intent: Intent,
        query: &str,
        entity: &ResolvedEntity,
        namespace: &Namespace,
    ) -> AnalysisData {
        let analyzer = self
            .analyzers
            .get(&intent)
            .or_else(|| self.analyzers.get(&self.routes.default_intent));
        let Some(analyzer) = analyzer else {
            warn!(%intent, "no analyzer registered");
            return AnalysisData::Text(String::new());
        };

        match analyzer.analyze(query, entity, namespace, &self.index).await {
            Ok(data) => data,
            Err(error) => {
                warn!(%error, %intent, "analysis failed");
                AnalysisData::Text(String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchOptions;
    use crate::error::CollaboratorError;
    use crate::models::{DataType, FilingRef};
    use crate::segmenter::SegmenterConfig;
    use crate::traits::CompletionClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FakeResolver {
        entity: Option<ResolvedEntity>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EntityResolver for FakeResolver {
        async fn resolve(&self, _query: &str) -> Result<Option<ResolvedEntity>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entity.clone())
        }
    }

    struct FakeClassifier {
        intent: Option<Intent>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IntentClassifier for FakeClassifier {
        async fn classify(&self, _query: &str) -> Result<Intent, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.intent.ok_or(CollaboratorError::BackendResponse {
                backend: "classifier".to_string(),
                details: "no destination".to_string(),
            })
        }
    }

    struct FakeLocator {
        filing: Option<FilingRef>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FilingLocator for FakeLocator {
        async fn latest_filing(
            &self,
            _entity: &ResolvedEntity,
        ) -> Result<Option<FilingRef>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.filing.clone())
        }
    }

    struct FakeExtractor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SectionExtractor for FakeExtractor {
        async fn extract(
            &self,
            _filing_url: &str,
            section: &str,
        ) -> Result<Option<String>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("text of section {section}")))
        }
    }

    struct EchoAnalyzer;

    #[async_trait]
    impl Analyzer for EchoAnalyzer {
        async fn analyze(
            &self,
            _query: &str,
            entity: &ResolvedEntity,
            namespace: &Namespace,
            index: &EmbeddingIndex,
        ) -> Result<AnalysisData, CollaboratorError> {
            let sections = index.list_sections(namespace)?;
            Ok(AnalysisData::Text(format!(
                "{} has {} indexed sections",
                entity.canonical_name,
                sections.len()
            )))
        }
    }

    struct Harness {
        resolver_calls: Arc<AtomicUsize>,
        classifier_calls: Arc<AtomicUsize>,
        locator_calls: Arc<AtomicUsize>,
        extractor_calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                resolver_calls: Arc::new(AtomicUsize::new(0)),
                classifier_calls: Arc::new(AtomicUsize::new(0)),
                locator_calls: Arc::new(AtomicUsize::new(0)),
                extractor_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn coordinator(
            &self,
            data_dir: &std::path::Path,
            entity: Option<ResolvedEntity>,
            intent: Option<Intent>,
            filing: Option<FilingRef>,
        ) -> AnalysisCoordinator<FakeResolver, FakeClassifier, FakeLocator, FakeExtractor> {
            let index = EmbeddingIndex::with_options(
                data_dir,
                Arc::new(crate::embeddings::HashedTrigramEmbedder { dimensions: 16 }),
                SearchOptions::default(),
            );
            let segmenter = Segmenter::new(SegmenterConfig {
                chunk_tokens: 32,
                overlap_tokens: 4,
            })
            .unwrap();

            let mut coordinator = AnalysisCoordinator::new(
                FakeResolver {
                    entity,
                    calls: self.resolver_calls.clone(),
                },
                FakeClassifier {
                    intent,
                    calls: self.classifier_calls.clone(),
                },
                FakeLocator {
                    filing,
                    calls: self.locator_calls.clone(),
                },
                FakeExtractor {
                    calls: self.extractor_calls.clone(),
                },
                index,
                segmenter,
            );
            for intent in Intent::ALL {
                coordinator.register_analyzer(intent, Box::new(EchoAnalyzer));
            }
            coordinator
        }
    }

    fn acme() -> ResolvedEntity {
        ResolvedEntity {
            ticker: "ACME".to_string(),
            canonical_name: "Acme Corp".to_string(),
            cik: Some("0000000042".to_string()),
        }
    }

    fn filing() -> FilingRef {
        FilingRef {
            url: "https://filings.example/acme-10k".to_string(),
            period: "2024".to_string(),
        }
    }

    #[tokio::test]
    async fn unresolved_entity_stops_the_pipeline() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator = harness.coordinator(dir.path(), None, Some(Intent::RiskAnalysis), Some(filing()));

        let outcome = coordinator.handle("what are the risks for Acme Corp?").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.data_type, DataType::Unknown);
        assert_eq!(harness.classifier_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.locator_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.index().list_namespaces().is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_default_intent() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator = harness.coordinator(dir.path(), Some(acme()), None, Some(filing()));

        let outcome = coordinator.handle("tell me about Acme Corp").await.unwrap();

        assert_eq!(outcome.intent, Intent::GeneralSummary);
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn missing_filing_stops_before_any_extraction() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator =
            harness.coordinator(dir.path(), Some(acme()), Some(Intent::RiskAnalysis), None);

        let outcome = coordinator.handle("what are the risks?").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.entity_name, "Acme Corp");
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.index().list_namespaces().is_empty());
    }

    #[tokio::test]
    async fn first_query_indexes_every_required_section() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator = harness.coordinator(
            dir.path(),
            Some(acme()),
            Some(Intent::FinancialStatus),
            Some(filing()),
        );

        let outcome = coordinator.handle("how is Acme doing financially?").await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.intent, Intent::FinancialStatus);
        // Intent financial_status requires sections 7 and 8.
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 2);

        let namespace = Namespace::new("ACME", "2024", "10k");
        let sections = coordinator.index().list_sections(&namespace).unwrap();
        assert_eq!(
            sections.into_iter().collect::<Vec<_>>(),
            vec!["7".to_string(), "8".to_string()]
        );
    }

    #[tokio::test]
    async fn full_cache_hit_triggers_no_extraction() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator = harness.coordinator(
            dir.path(),
            Some(acme()),
            Some(Intent::FinancialStatus),
            Some(filing()),
        );

        coordinator.handle("how is Acme doing financially?").await.unwrap();
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 2);

        let outcome = coordinator.handle("what about profitability?").await.unwrap();
        assert!(outcome.success);
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn only_missing_sections_are_fetched_and_appended() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator = harness.coordinator(
            dir.path(),
            Some(acme()),
            Some(Intent::GeneralSummary),
            Some(filing()),
        );

        // Seed the namespace with section 1A only.
        let namespace = Namespace::new("ACME", "2024", "10k");
        coordinator
            .index()
            .create(
                &namespace,
                &[Chunk {
                    text: "existing risk factors".to_string(),
                    metadata: ChunkMetadata {
                        entity_id: "ACME".to_string(),
                        period: "2024".to_string(),
                        section: "1A".to_string(),
                        sequence: 0,
                    },
                }],
            )
            .unwrap();

        // general_summary requires {1, 7}; both are missing.
        coordinator.handle("summarize Acme").await.unwrap();
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 2);

        let sections = coordinator.index().list_sections(&namespace).unwrap();
        assert_eq!(
            sections.into_iter().collect::<Vec<_>>(),
            vec!["1".to_string(), "1A".to_string(), "7".to_string()]
        );
    }

    #[tokio::test]
    async fn one_missing_section_means_one_extractor_call() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let coordinator = harness.coordinator(
            dir.path(),
            Some(acme()),
            Some(Intent::GeneralSummary),
            Some(filing()),
        );

        let namespace = Namespace::new("ACME", "2024", "10k");
        coordinator
            .index()
            .create(
                &namespace,
                &[Chunk {
                    text: "the business overview".to_string(),
                    metadata: ChunkMetadata {
                        entity_id: "ACME".to_string(),
                        period: "2024".to_string(),
                        section: "1".to_string(),
                        sequence: 0,
                    },
                }],
            )
            .unwrap();

        // general_summary requires {1, 7}; only 7 is missing.
        coordinator.handle("summarize Acme").await.unwrap();
        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 1);

        let sections = coordinator.index().list_sections(&namespace).unwrap();
        assert_eq!(
            sections.into_iter().collect::<Vec<_>>(),
            vec!["1".to_string(), "7".to_string()]
        );
    }

    struct EmptyExtractor;

    #[async_trait]
    impl SectionExtractor for EmptyExtractor {
        async fn extract(
            &self,
            _filing_url: &str,
            _section: &str,
        ) -> Result<Option<String>, CollaboratorError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn no_extractable_data_degrades_without_creating_an_index() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let index = EmbeddingIndex::new(
            dir.path(),
            Arc::new(crate::embeddings::HashedTrigramEmbedder { dimensions: 16 }),
        );
        let segmenter = Segmenter::new(SegmenterConfig {
            chunk_tokens: 32,
            overlap_tokens: 4,
        })
        .unwrap();
        let mut coordinator = AnalysisCoordinator::new(
            FakeResolver {
                entity: Some(acme()),
                calls: harness.resolver_calls.clone(),
            },
            FakeClassifier {
                intent: Some(Intent::RiskAnalysis),
                calls: harness.classifier_calls.clone(),
            },
            FakeLocator {
                filing: Some(filing()),
                calls: harness.locator_calls.clone(),
            },
            EmptyExtractor,
            index,
            segmenter,
        );
        coordinator.register_analyzer(Intent::RiskAnalysis, Box::new(EchoAnalyzer));

        let outcome = coordinator.handle("what are the risks?").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.data_type, DataType::Unknown);
        assert!(coordinator.index().list_namespaces().is_empty());
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionClient for FailingCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::BackendResponse {
                backend: "completion".to_string(),
                details: "unavailable".to_string(),
            })
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(
            &self,
            _query: &str,
            _entity: &ResolvedEntity,
            _namespace: &Namespace,
            _index: &EmbeddingIndex,
        ) -> Result<AnalysisData, CollaboratorError> {
            FailingCompletion.complete("prompt").await.map(AnalysisData::Text)
        }
    }

    #[tokio::test]
    async fn preseeded_risk_section_leaves_only_the_other_to_fetch() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let mut routes = IntentRoutes::default();
        routes.set_sections(
            Intent::RiskAnalysis,
            vec!["1A".to_string(), "7".to_string()],
        );
        let coordinator = harness
            .coordinator(
                dir.path(),
                Some(acme()),
                Some(Intent::RiskAnalysis),
                Some(filing()),
            )
            .with_routes(routes);

        let namespace = Namespace::new("ACME", "2024", "10k");
        coordinator
            .index()
            .create(
                &namespace,
                &[Chunk {
                    text: "existing risk factors".to_string(),
                    metadata: ChunkMetadata {
                        entity_id: "ACME".to_string(),
                        period: "2024".to_string(),
                        section: "1A".to_string(),
                        sequence: 0,
                    },
                }],
            )
            .unwrap();

        coordinator.handle("what are the risks?").await.unwrap();

        assert_eq!(harness.extractor_calls.load(Ordering::SeqCst), 1);
        let sections = coordinator.index().list_sections(&namespace).unwrap();
        assert_eq!(
            sections.into_iter().collect::<Vec<_>>(),
            vec!["1A".to_string(), "7".to_string()]
        );
    }

    #[tokio::test]
    async fn analyzer_failure_yields_unsuccessful_outcome() {
        let harness = Harness::new();
        let dir = tempdir().unwrap();
        let mut coordinator = harness.coordinator(
            dir.path(),
            Some(acme()),
            Some(Intent::RiskAnalysis),
            Some(filing()),
        );
        coordinator.register_analyzer(Intent::RiskAnalysis, Box::new(FailingAnalyzer));

        let outcome = coordinator.handle("what are the risks?").await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.data.is_empty());
    }
}
