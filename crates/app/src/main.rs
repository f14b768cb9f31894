use chrono::Utc;
use clap::{Parser, Subcommand};
use filing_insight_core::{
    AnalysisCoordinator, AnalysisData, CompletionIntentClassifier, EmbeddingIndex,
    FilingApiClient, FinancialAnalyzer, GeneralAnalyzer, HashedTrigramEmbedder,
    HttpCompletionClient, Intent, Namespace, RelationshipAnalyzer, RetryPolicy, RiskAnalyzer,
    SearchOptions, Segmenter, SegmenterConfig, TickerDirectory,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "filing-insight", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Filing API base URL (query endpoint; `/extractor` is derived from it)
    #[arg(long, env = "FILING_API_URL", default_value = "https://api.sec-api.io")]
    filing_api_url: String,

    /// Filing API key
    #[arg(long, env = "FILING_API_KEY")]
    filing_api_key: Option<String>,

    /// Completion endpoint accepting `{model, prompt}` JSON
    #[arg(long, env = "COMPLETION_URL")]
    completion_url: Option<String>,

    /// Completion API key
    #[arg(long, env = "COMPLETION_API_KEY")]
    completion_api_key: Option<String>,

    /// Completion model name
    #[arg(long, env = "COMPLETION_MODEL", default_value = "gpt-4o-mini")]
    completion_model: String,

    /// Company/ticker directory file (SEC company_tickers.json format)
    #[arg(long, env = "TICKER_DIRECTORY", default_value = "data/company_tickers.json")]
    ticker_directory: String,

    /// Directory holding the per-namespace index artifacts
    #[arg(long, default_value = "vector_db")]
    data_dir: String,

    /// Overfetch factor for section-filtered search
    #[arg(long, default_value = "3")]
    overfetch_factor: usize,

    /// Chunk size in tokens
    #[arg(long, default_value = "2500")]
    chunk_tokens: usize,

    /// Chunk overlap in tokens
    #[arg(long, default_value = "200")]
    overlap_tokens: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question about a public company's latest 10-K.
    Ask {
        /// Natural-language question
        #[arg(long)]
        query: String,
    },
    /// List indexed namespaces, or the section inventory of one namespace.
    Sections {
        /// Namespace key, e.g. ACME_2024_10k
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Run a section-filtered semantic search against one namespace.
    Search {
        /// Namespace key, e.g. ACME_2024_10k
        #[arg(long)]
        namespace: String,
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Restrict hits to these section ids
        #[arg(long)]
        section: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = Arc::new(HashedTrigramEmbedder::default());
    let index = EmbeddingIndex::with_options(
        &cli.data_dir,
        embedder,
        SearchOptions {
            overfetch_factor: cli.overfetch_factor,
        },
    );

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir,
        "filing-insight boot"
    );

    match cli.command {
        Command::Ask { query } => {
            let completion_url = cli
                .completion_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--completion-url (or COMPLETION_URL) is required for ask"))?;
            let completion = Arc::new(
                HttpCompletionClient::new(
                    completion_url,
                    cli.completion_api_key.clone(),
                    cli.completion_model.clone(),
                )
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
                .with_retry(RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_secs(1),
                }),
            );

            let resolver = TickerDirectory::load(Path::new(&cli.ticker_directory))
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let classifier = CompletionIntentClassifier::new(completion.clone());
            let filing_api =
                FilingApiClient::new(&cli.filing_api_url, cli.filing_api_key.clone())
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let extractor_api =
                FilingApiClient::new(&cli.filing_api_url, cli.filing_api_key.clone())
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let segmenter = Segmenter::new(SegmenterConfig {
                chunk_tokens: cli.chunk_tokens,
                overlap_tokens: cli.overlap_tokens,
            })
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let mut coordinator = AnalysisCoordinator::new(
                resolver,
                classifier,
                filing_api,
                extractor_api,
                index,
                segmenter,
            );
            coordinator.register_analyzer(
                Intent::FinancialStatus,
                Box::new(FinancialAnalyzer::new(completion.clone())),
            );
            coordinator.register_analyzer(
                Intent::RelationshipGraph,
                Box::new(RelationshipAnalyzer::new(completion.clone())),
            );
            coordinator
                .register_analyzer(Intent::RiskAnalysis, Box::new(RiskAnalyzer::new(completion.clone())));
            coordinator.register_analyzer(
                Intent::GeneralSummary,
                Box::new(GeneralAnalyzer::new(completion)),
            );

            let outcome = coordinator
                .handle(&query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("intent: {}", outcome.intent);
            if !outcome.entity_name.is_empty() {
                println!("company: {}", outcome.entity_name);
            }
            println!("success: {}", outcome.success);
            match outcome.data {
                AnalysisData::Text(text) => println!("{text}"),
                AnalysisData::Structured(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?)
                }
            }
        }
        Command::Sections { namespace } => match namespace {
            Some(key) => {
                let namespace = Namespace::parse(&key)
                    .ok_or_else(|| anyhow::anyhow!("malformed namespace key: {key}"))?;
                let sections = index
                    .list_sections(&namespace)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                if sections.is_empty() {
                    println!("namespace {key} is not indexed");
                } else {
                    for section in sections {
                        println!("{section}");
                    }
                }
            }
            None => {
                for namespace in index.list_namespaces() {
                    println!("{namespace}");
                }
            }
        },
        Command::Search {
            namespace,
            query,
            top_k,
            section,
        } => {
            let namespace = Namespace::parse(&namespace)
                .ok_or_else(|| anyhow::anyhow!("malformed namespace key: {namespace}"))?;
            let filter = if section.is_empty() {
                None
            } else {
                Some(section.as_slice())
            };
            let hits = index
                .search(&namespace, &query, top_k, filter)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            for hit in hits {
                println!(
                    "[section {}] distance={:.4} sequence={}",
                    hit.chunk.metadata.section, hit.distance, hit.chunk.metadata.sequence
                );
                println!("  {}", hit.chunk.text);
            }
        }
    }

    Ok(())
}
