use thiserror::Error;

/// Failures of the on-disk embedding index. Writes either publish both
/// artifacts or leave the observable state untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("namespace not indexed: {0}")]
    MissingNamespace(String),

    #[error("index artifacts disagree for {namespace}: {details}")]
    Corrupt { namespace: String, details: String },

    #[error("embedding output mismatch: {0}")]
    EmbeddingShape(String),
}

/// Failures of an external collaborator (resolver, locator, extractor,
/// completion client, analyzer). Callers at stage boundaries convert these
/// into empty outcomes; they never cross a stage unhandled.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// What query handling can fail with, fatal for the current request only.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("tokenizer unavailable: {0}")]
    Tokenizer(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
