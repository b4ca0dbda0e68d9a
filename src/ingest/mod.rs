//! Ingestion pipeline
//!
//! Turns a repository plus its issue threads into a published session:
//! fetch -> chunk -> embed -> index -> sample -> summarize -> publish.
//! Source units chunk and embed concurrently under a bounded worker pool;
//! per-unit and per-chunk failures are recovered locally as long as they
//! cannot leave the chunk/vector pairing inconsistent. Anything that would
//! is an abort: no partial session is ever published.

mod sources;

pub use sources::{
    FetchError, Issue, IssueSource, JsonIssueSource, LocalRepoFetcher, NoIssues,
    RepositoryFetcher, SourceUnit,
};

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunker::{Chunk, ChunkOrigin, Chunker, ChunkingConfig};
use crate::embedding::{EmbeddingConfig, EmbeddingError, EmbeddingProvider, VectorIndex};
use crate::error::{RepomindError, Result};
use crate::generation::{
    generate_with_policy, GenerationBackend, GenerationConfig, GenerationTask,
};
use crate::prompt::PromptAssembler;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionStore};

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Abort the whole ingestion when more than this fraction of chunks
    /// fails embedding
    pub max_failure_rate: f32,
    /// Maximum number of chunks sampled into the summary prompt
    pub summary_sample_limit: usize,
    /// Files larger than this are skipped by the local fetcher
    pub max_file_size: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.2,
            summary_sample_limit: 24,
            max_file_size: 512 * 1024,
        }
    }
}

/// What an ingestion produced
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub key: String,
    pub summary: Option<String>,
    pub issues: Vec<Issue>,
    pub indexed_chunks: usize,
    pub dropped_chunks: usize,
    pub skipped_units: usize,
}

/// Runs the ingestion pipeline and publishes sessions
pub struct Ingestor {
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
    generation: GenerationConfig,
    ingest: IngestConfig,
}

impl Ingestor {
    pub fn new(
        chunking: ChunkingConfig,
        embedding: EmbeddingConfig,
        generation: GenerationConfig,
        ingest: IngestConfig,
    ) -> Self {
        Self {
            chunking,
            embedding,
            generation,
            ingest,
        }
    }

    /// Ingest one repository under `key` and publish the session.
    ///
    /// Holds the store's exclusive build claim for `key` for the duration;
    /// a concurrent ingestion for the same key is rejected with
    /// `SessionAlreadyBuilding`. The claim is released on every exit path,
    /// including cancellation of this future.
    pub async fn ingest(
        &self,
        store: &SessionStore,
        key: &str,
        fetcher: &dyn RepositoryFetcher,
        issue_source: &dyn IssueSource,
        provider: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<IngestOutcome> {
        let guard = store.begin_build(key)?;

        tracing::info!("Ingesting repository for key {}", key);
        let units = fetcher.fetch_units().await?;

        // Issue fetch tolerates partial failure: ground on what we have
        let issues = match issue_source.fetch_issues().await {
            Ok(issues) => issues,
            Err(e) => {
                tracing::warn!("Issue fetch failed, proceeding without issues: {}", e);
                Vec::new()
            }
        };

        // Chunk files and issues; unsupported units are skipped, not fatal
        let chunker = Chunker::new(self.chunking.clone());
        let mut next_id = 0u64;
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut skipped_units = 0usize;

        for unit in &units {
            let origin = ChunkOrigin::File {
                path: unit.path.clone(),
            };
            match chunker.chunk(origin, &unit.bytes, &mut next_id) {
                Ok(produced) => chunks.extend(produced),
                Err(e) => {
                    tracing::warn!("Skipping source unit: {}", e);
                    skipped_units += 1;
                }
            }
        }

        for issue in &issues {
            let origin = ChunkOrigin::Issue { id: issue.id };
            match chunker.chunk(origin, issue.full_text().as_bytes(), &mut next_id) {
                Ok(produced) => chunks.extend(produced),
                Err(e) => {
                    tracing::warn!("Skipping issue {}: {}", issue.id, e);
                    skipped_units += 1;
                }
            }
        }

        let total = chunks.len();
        tracing::info!(
            "Chunked {} units and {} issues into {} chunks",
            units.len(),
            issues.len(),
            total
        );

        // Embed with bounded concurrency; failed chunks are dropped
        let embedded = self.embed_chunks(&chunks, Arc::clone(&provider)).await;
        let dropped = total - embedded.len();

        if total > 0 {
            let failure_rate = dropped as f32 / total as f32;
            if failure_rate > self.ingest.max_failure_rate {
                return Err(RepomindError::IngestFailed {
                    reason: format!(
                        "{} of {} chunks failed embedding ({:.0}% > {:.0}% threshold)",
                        dropped,
                        total,
                        failure_rate * 100.0,
                        self.ingest.max_failure_rate * 100.0
                    ),
                });
            }
        }

        // Index and chunk table are built from exactly the embedded set, so
        // the id/vector bijection holds by construction
        let index = VectorIndex::new(provider.dimension());
        let mut by_id: AHashMap<u64, Chunk> =
            chunks.iter().map(|c| (c.id, c.clone())).collect();
        let mut table: AHashMap<u64, Chunk> = AHashMap::with_capacity(embedded.len());

        for (id, vector) in &embedded {
            index.insert(*id, vector)?;
            match by_id.remove(id) {
                Some(chunk) => {
                    table.insert(*id, chunk);
                }
                None => {
                    index.remove(*id);
                    tracing::warn!("Embedded unknown chunk id {}, discarding vector", id);
                }
            }
        }

        // Deterministic summary sample over the surviving file chunks
        let sampled = sample_for_summary(
            chunks.iter().filter(|c| table.contains_key(&c.id)),
            self.ingest.summary_sample_limit,
        );

        let budget = backend.budget();
        let prompt = PromptAssembler::assemble_summary_prompt(&sampled, &budget);
        let summary = match generate_with_policy(
            backend.as_ref(),
            GenerationTask::Summarize,
            &prompt,
            self.generation.timeout(),
            &self.generation.retry_policy(),
        )
        .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Summary generation failed, publishing without one: {}", e);
                None
            }
        };

        let session = Session {
            key: key.to_string(),
            id: uuid::Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            provider,
            backend,
            index,
            chunks: table,
            issues,
            summary,
        };

        let published = guard.publish(session);
        tracing::info!(
            "Published session {}: {} chunks indexed, {} dropped, {} units skipped",
            key,
            published.chunk_count(),
            dropped,
            skipped_units
        );

        Ok(IngestOutcome {
            key: key.to_string(),
            summary: published.summary.clone(),
            issues: published.issues.clone(),
            indexed_chunks: published.chunk_count(),
            dropped_chunks: dropped,
            skipped_units,
        })
    }

    /// Embed all chunks in batches under the bounded worker pool.
    ///
    /// Returns `(chunk_id, vector)` pairs for the successes, in chunk-id
    /// order. A failing batch is retried, then degraded to per-chunk calls so
    /// one poisoned text only drops itself.
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Vec<(u64, Vec<f32>)> {
        let retry = RetryPolicy::new(
            self.embedding.max_retries,
            Duration::from_millis(self.embedding.retry_base_ms),
        );
        let semaphore = Arc::new(Semaphore::new(self.embedding.max_concurrent.max(1)));
        let mut join_set: JoinSet<Vec<(u64, Vec<f32>)>> = JoinSet::new();

        for batch in chunks.chunks(self.embedding.batch_size.max(1)) {
            let ids: Vec<u64> = batch.iter().map(|c| c.id).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let provider = Arc::clone(&provider);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };
                embed_batch_isolating_failures(provider, retry, ids, texts).await
            });
        }

        let mut successes: Vec<(u64, Vec<f32>)> = Vec::with_capacity(chunks.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(mut pairs) => successes.append(&mut pairs),
                Err(e) => tracing::error!("Embedding worker panicked: {}", e),
            }
        }

        successes.sort_by_key(|(id, _)| *id);
        successes
    }
}

/// Embed one batch, falling back to per-chunk embedding when the batch call
/// keeps failing, so a single bad text cannot drop its whole batch
async fn embed_batch_isolating_failures(
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    ids: Vec<u64>,
    texts: Vec<String>,
) -> Vec<(u64, Vec<f32>)> {
    let batch_result = retry
        .run("embed batch", EmbeddingError::is_transient, || async {
            provider.embed_batch(&texts)
        })
        .await;

    match batch_result {
        Ok(vectors) => ids.into_iter().zip(vectors).collect(),
        Err(e) => {
            tracing::warn!("Batch embedding failed, isolating per chunk: {}", e);
            let mut out = Vec::new();
            for (id, text) in ids.iter().zip(texts.iter()) {
                let single = retry
                    .run("embed chunk", EmbeddingError::is_transient, || async {
                        provider.embed(text)
                    })
                    .await;
                match single {
                    Ok(vector) => out.push((*id, vector)),
                    Err(e) => tracing::warn!("Dropping chunk {} after retries: {}", id, e),
                }
            }
            out
        }
    }
}

/// Select chunks for the summary prompt.
///
/// Root-level files and entry-point-named files (readme, manifests, main
/// modules) come first, then the rest in file-traversal order. Input order
/// must be the traversal order; the result is deterministic for a given
/// chunk set.
fn sample_for_summary<'a>(
    chunks: impl Iterator<Item = &'a Chunk>,
    limit: usize,
) -> Vec<Chunk> {
    let key_file = regex::Regex::new(
        r"(?i)(readme|setup|config|main|index|requirements|dockerfile|makefile|package\.json|cargo\.toml|pyproject)",
    )
    .expect("static pattern");

    let mut ranked: Vec<(u8, usize, &Chunk)> = Vec::new();
    for (position, chunk) in chunks.enumerate() {
        let ChunkOrigin::File { path } = &chunk.origin else {
            continue;
        };
        let is_root = !path.contains('/');
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let is_key = key_file.is_match(file_name);

        let priority = match (is_root, is_key) {
            (true, true) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (false, false) => 3,
        };
        ranked.push((priority, position, chunk));
    }

    ranked.sort_by_key(|(priority, position, _)| (*priority, *position));
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, _, chunk)| chunk.clone())
        .collect()
}
