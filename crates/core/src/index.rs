use crate::config::SearchOptions;
use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{Chunk, Namespace, ScoredChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

const VECTORS_SUFFIX: &str = ".vectors.json";
const META_SUFFIX: &str = ".meta.json";

/// The vector half of a namespace. Row `i` corresponds to metadata entry `i`;
/// position, not an id, is the correspondence key.
#[derive(Debug, Serialize, Deserialize)]
struct VectorArtifact {
    dimensions: usize,
    built_at: DateTime<Utc>,
    vectors: Vec<Vec<f32>>,
}

/// Per-namespace persistent vector store with section-filtered exact
/// nearest-neighbor search.
///
/// Each namespace is two co-located artifacts: `{key}.vectors.json` and
/// `{key}.meta.json`. Both writes stage to a sibling temp file and publish by
/// rename; vectors are published first and the metadata rename is the commit
/// point. A torn append therefore leaves extra vector rows past the metadata
/// length, which loading drops, so readers always observe the last committed
/// state. A namespace is present only when both artifacts exist.
pub struct EmbeddingIndex {
    data_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    options: SearchOptions,
}

impl EmbeddingIndex {
    pub fn new(data_dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_options(data_dir, embedder, SearchOptions::default())
    }

    pub fn with_options(
        data_dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        options: SearchOptions,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            embedder,
            options,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn vectors_path(&self, namespace: &Namespace) -> PathBuf {
        self.data_dir
            .join(format!("{}{VECTORS_SUFFIX}", namespace.key()))
    }

    fn meta_path(&self, namespace: &Namespace) -> PathBuf {
        self.data_dir.join(format!("{}{META_SUFFIX}", namespace.key()))
    }

    /// True only when both artifacts are present.
    pub fn exists(&self, namespace: &Namespace) -> bool {
        self.vectors_path(namespace).exists() && self.meta_path(namespace).exists()
    }

    /// Embeds `chunks` and publishes a fresh namespace.
    pub fn create(&self, namespace: &Namespace, chunks: &[Chunk]) -> Result<(), StoreError> {
        let vectors = self.embed_chunks(chunks)?;
        fs::create_dir_all(&self.data_dir)?;

        let artifact = VectorArtifact {
            dimensions: self.embedder.dimensions(),
            built_at: Utc::now(),
            vectors,
        };
        self.publish(namespace, &artifact, chunks)?;

        info!(namespace = %namespace, chunks = chunks.len(), "created embedding index");
        Ok(())
    }

    /// Embeds and appends new chunks to an existing namespace. Prior entries
    /// never move; incoming chunks whose `(section, sequence)` identity is
    /// already stored are dropped before embedding.
    pub fn append(&self, namespace: &Namespace, chunks: &[Chunk]) -> Result<(), StoreError> {
        if !self.exists(namespace) {
            return Err(StoreError::MissingNamespace(namespace.key()));
        }

        let (mut artifact, mut stored) = self.load(namespace)?;

        let known: HashSet<(&str, u32)> = stored
            .iter()
            .map(|chunk| (chunk.metadata.section.as_str(), chunk.metadata.sequence))
            .collect();
        let fresh: Vec<Chunk> = chunks
            .iter()
            .filter(|chunk| {
                !known.contains(&(chunk.metadata.section.as_str(), chunk.metadata.sequence))
            })
            .cloned()
            .collect();

        if fresh.len() < chunks.len() {
            debug!(
                namespace = %namespace,
                skipped = chunks.len() - fresh.len(),
                "dropped chunks already present in namespace"
            );
        }
        if fresh.is_empty() {
            return Ok(());
        }

        let mut vectors = self.embed_chunks(&fresh)?;
        if artifact.dimensions != self.embedder.dimensions() {
            return Err(StoreError::EmbeddingShape(format!(
                "stored dimension {} does not match embedder dimension {}",
                artifact.dimensions,
                self.embedder.dimensions()
            )));
        }

        artifact.vectors.append(&mut vectors);
        artifact.built_at = Utc::now();
        stored.extend(fresh);
        self.publish(namespace, &artifact, &stored)?;

        info!(namespace = %namespace, total = stored.len(), "appended to embedding index");
        Ok(())
    }

    /// Distinct section ids stored in the namespace; empty when absent.
    pub fn list_sections(&self, namespace: &Namespace) -> Result<BTreeSet<String>, StoreError> {
        if !self.exists(namespace) {
            return Ok(BTreeSet::new());
        }
        let (_, stored) = self.load(namespace)?;
        Ok(stored
            .into_iter()
            .map(|chunk| chunk.metadata.section)
            .collect())
    }

    /// All chunks tagged with `section`, in original insertion order; empty
    /// when the namespace or section is absent.
    pub fn chunks_for_section(
        &self,
        namespace: &Namespace,
        section: &str,
    ) -> Result<Vec<Chunk>, StoreError> {
        if !self.exists(namespace) {
            return Ok(Vec::new());
        }
        let (_, stored) = self.load(namespace)?;
        Ok(stored
            .into_iter()
            .filter(|chunk| chunk.metadata.section == section)
            .collect())
    }

    /// Top-k exact nearest neighbors by ascending Euclidean distance. With a
    /// section filter, a pool of `top_k * overfetch_factor` candidates is
    /// retrieved first and filtered in distance order; if fewer than `top_k`
    /// survive there is no backfill pass, so recall is incomplete when the
    /// wanted sections are sparse in the pool.
    pub fn search(
        &self,
        namespace: &Namespace,
        query_text: &str,
        top_k: usize,
        section_filter: Option<&[String]>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if top_k == 0 || !self.exists(namespace) {
            return Ok(Vec::new());
        }
        let (artifact, stored) = self.load(namespace)?;

        let query = query_text.to_string();
        let mut embedded = self.embedder.embed(std::slice::from_ref(&query));
        let query_vector = match embedded.pop() {
            Some(vector) if embedded.is_empty() => vector,
            _ => {
                return Err(StoreError::EmbeddingShape(
                    "embedder returned an unexpected number of query vectors".to_string(),
                ))
            }
        };
        if query_vector.len() != artifact.dimensions {
            return Err(StoreError::EmbeddingShape(format!(
                "query dimension {} does not match stored dimension {}",
                query_vector.len(),
                artifact.dimensions
            )));
        }

        let mut ranked: Vec<(f32, usize)> = artifact
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (euclidean_distance(&query_vector, vector), position))
            .collect();
        ranked.sort_by(|left, right| left.0.total_cmp(&right.0));

        let pool = top_k.saturating_mul(self.options.overfetch_factor.max(1));
        let mut hits = Vec::new();
        for (distance, position) in ranked.into_iter().take(pool) {
            let chunk = &stored[position];
            if let Some(filter) = section_filter {
                if !filter.iter().any(|section| *section == chunk.metadata.section) {
                    continue;
                }
            }
            hits.push(ScoredChunk {
                chunk: chunk.clone(),
                distance,
            });
            if hits.len() == top_k {
                break;
            }
        }
        Ok(hits)
    }

    /// Namespaces whose two artifacts are both present under the data
    /// directory, sorted by key.
    pub fn list_namespaces(&self) -> Vec<Namespace> {
        let mut namespaces = Vec::new();
        for entry in WalkDir::new(&self.data_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|item| item.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(key) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            if let Some(namespace) = Namespace::parse(key) {
                if self.exists(&namespace) {
                    namespaces.push(namespace);
                }
            }
        }
        namespaces.sort_by_key(Namespace::key);
        namespaces
    }

    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, StoreError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed(&texts);
        if vectors.len() != chunks.len() {
            return Err(StoreError::EmbeddingShape(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let dimensions = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(StoreError::EmbeddingShape(format!(
                "embedder emitted a {}-dimensional vector, expected {dimensions}",
                bad.len()
            )));
        }
        Ok(vectors)
    }

    /// Reads both artifacts, dropping any uncommitted vector tail left by a
    /// write interrupted between the two publishes.
    fn load(&self, namespace: &Namespace) -> Result<(VectorArtifact, Vec<Chunk>), StoreError> {
        let stored: Vec<Chunk> =
            serde_json::from_str(&fs::read_to_string(self.meta_path(namespace))?)?;
        let mut artifact: VectorArtifact =
            serde_json::from_str(&fs::read_to_string(self.vectors_path(namespace))?)?;

        if artifact.vectors.len() > stored.len() {
            debug!(
                namespace = %namespace,
                tail = artifact.vectors.len() - stored.len(),
                "dropping uncommitted vector tail"
            );
            artifact.vectors.truncate(stored.len());
        }
        if artifact.vectors.len() < stored.len() {
            return Err(StoreError::Corrupt {
                namespace: namespace.key(),
                details: format!(
                    "{} vectors for {} metadata entries",
                    artifact.vectors.len(),
                    stored.len()
                ),
            });
        }
        Ok((artifact, stored))
    }

    /// Stage-then-rename both artifacts, vectors first. The metadata rename
    /// commits the write.
    fn publish(
        &self,
        namespace: &Namespace,
        artifact: &VectorArtifact,
        stored: &[Chunk],
    ) -> Result<(), StoreError> {
        stage_then_rename(&self.vectors_path(namespace), &serde_json::to_vec(artifact)?)?;
        stage_then_rename(&self.meta_path(namespace), &serde_json::to_vec(stored)?)?;
        Ok(())
    }
}

fn stage_then_rename(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let staged = path.with_extension("tmp");
    fs::write(&staged, bytes)?;
    fs::rename(&staged, path)?;
    Ok(())
}

fn euclidean_distance(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt()
}
