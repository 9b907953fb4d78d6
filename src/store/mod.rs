//! Append-only vector store with filtered cosine search.
//!
//! [`VectorStore`] owns the corpus behind a `tokio::sync::RwLock`:
//!
//! - [`VectorStore::add_documents`] embeds outside the lock, then holds the
//!   write lock across dimension check, durable write, and in-memory commit.
//!   New rows are staged separately and only appended after the write
//!   succeeds, so a failure at any step leaves memory and disk unchanged.
//! - [`VectorStore::search`] embeds the query outside the lock and scores under
//!   a shared read lock. Dropping a search future needs no cleanup.
//!
//! Provider and medium calls run on the blocking pool under a timeout. A
//! durable write that outlives its timeout cannot be interrupted. The store
//! queues a restore of the committed corpus behind it, and every later write
//! or load waits for that restore first. A late write therefore neither
//! resurrects a rejected batch nor overwrites an acknowledged one.
//!
//! Filters that match nothing fall back to searching the whole corpus unless
//! strict filtering is requested. Callers expecting strict filtering should
//! pass [`SearchOptions::strict`].

pub mod codec;
pub mod corpus;
pub mod error;
pub mod medium;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array1;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::embedding::EmbeddingProvider;
use corpus::{l2_normalize, Corpus, StagedBatch};
pub use error::StoreError;
use medium::PersistenceMedium;
use types::{AppendResult, Filters, Metadata, RankedHit, Record};

/// Tunables fixed at construction.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Upper bound on a single provider call.
    pub embed_timeout: Duration,
    /// Upper bound on a single durable read or write.
    pub persist_timeout: Duration,
    /// Default for [`SearchOptions::strict`].
    pub strict_filters: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(30),
            persist_timeout: Duration::from_secs(10),
            strict_filters: false,
        }
    }
}

/// Per-call search switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Return nothing when the filters match nothing, instead of falling back
    /// to the full corpus.
    pub strict: bool,
}

/// Summary counts for `stats` and `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub records: usize,
    pub dimension: Option<usize>,
    pub by_team: BTreeMap<String, usize>,
    pub by_season: BTreeMap<String, usize>,
    pub players: usize,
}

/// A durable write still running after its caller gave up on it.
type PendingWrite = JoinHandle<anyhow::Result<()>>;

pub struct VectorStore {
    corpus: RwLock<Corpus>,
    /// Only touched while holding the corpus write lock.
    pending: Mutex<Option<PendingWrite>>,
    provider: Arc<dyn EmbeddingProvider>,
    medium: Arc<dyn PersistenceMedium>,
    options: StoreOptions,
}

impl VectorStore {
    /// Load the persisted corpus (or start empty when nothing was persisted).
    ///
    /// A corpus that exists but cannot be read is an error, never an empty start.
    pub async fn open(
        provider: Arc<dyn EmbeddingProvider>,
        medium: Arc<dyn PersistenceMedium>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let corpus = load_corpus(Arc::clone(&medium), options.persist_timeout).await?;
        tracing::info!(
            medium = %medium.describe(),
            records = corpus.len(),
            dimension = ?corpus.dimension(),
            "vector store loaded"
        );
        Ok(Self {
            corpus: RwLock::new(corpus),
            pending: Mutex::new(None),
            provider,
            medium,
            options,
        })
    }

    pub async fn len(&self) -> usize {
        self.corpus.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.corpus.read().await.is_empty()
    }

    pub async fn dimension(&self) -> Option<usize> {
        self.corpus.read().await.dimension()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Embed, normalize, persist, and append a batch of records.
    ///
    /// An empty batch is a no-op. Either every record is committed (in memory
    /// and durably) or none is.
    pub async fn add_documents(&self, records: Vec<Record>) -> Result<AppendResult, StoreError> {
        if records.is_empty() {
            let total = self.len().await;
            return Ok(AppendResult { added: 0, total });
        }
        let count = records.len();
        if let Some(i) = records.iter().position(|r| r.text.trim().is_empty()) {
            return Err(StoreError::InvalidArgument(format!(
                "record {i} of {count} has empty text"
            )));
        }

        let (texts, metadata): (Vec<String>, Vec<Metadata>) =
            records.into_iter().map(|r| (r.text, r.metadata)).unzip();
        let vectors = self.embed("embed", texts).await?;
        let staged = StagedBatch::new(vectors, metadata)?;

        let mut corpus = self.corpus.write().await;
        let mut pending = self.pending.lock().await;
        self.settle(&corpus, &mut pending).await?;
        corpus.check_dimension(staged.dimension())?;

        let dim = staged.dimension();
        let encoded = codec::encode(
            dim,
            &[
                (corpus.vectors(), corpus.metadata()),
                (staged.vectors(), staged.metadata()),
            ],
        )
        .map_err(|e| StoreError::persistence("encode", count, e))?;
        self.write_snapshot(&corpus, &mut pending, encoded, count).await?;

        corpus.commit(staged);
        let total = corpus.len();
        tracing::info!(added = count, total, dimension = dim, "documents appended");
        Ok(AppendResult {
            added: count,
            total,
        })
    }

    /// Top-`k` records by cosine similarity among those matching `filters`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &Filters,
    ) -> Result<Vec<RankedHit>, StoreError> {
        let options = SearchOptions {
            strict: self.options.strict_filters,
        };
        self.search_with(query, k, filters, options).await
    }

    /// [`VectorStore::search`] with explicit [`SearchOptions`].
    pub async fn search_with(
        &self,
        query: &str,
        k: usize,
        filters: &Filters,
        options: SearchOptions,
    ) -> Result<Vec<RankedHit>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidArgument("k must be at least 1".into()));
        }
        if self.is_empty().await {
            return Ok(Vec::new());
        }

        let mut query_vector = self
            .embed("embed_query", vec![query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| StoreError::provider("embed_query", 1, "provider returned no vector"))?;
        if query_vector.iter().any(|x| !x.is_finite()) {
            return Err(StoreError::provider("embed_query", 1, "query vector has non-finite values"));
        }
        l2_normalize(&mut query_vector);

        let corpus = self.corpus.read().await;
        corpus.check_dimension(query_vector.len())?;

        let mut candidates = corpus.filter_indices(filters);
        if candidates.is_empty() {
            if options.strict {
                tracing::debug!(?filters, "no records match filters; strict search returns nothing");
                return Ok(Vec::new());
            }
            tracing::debug!(?filters, "no records match filters; searching full corpus");
            candidates = (0..corpus.len()).collect();
        }

        let hits = corpus.top_k(Array1::from(query_vector).view(), &candidates, k);
        tracing::debug!(k, candidates = candidates.len(), returned = hits.len(), "search complete");
        Ok(hits)
    }

    /// Metadata of every record matching `filters`, in insertion order.
    ///
    /// Unlike search, an unmatched filter yields an empty list.
    pub async fn metadata_where(&self, filters: &Filters) -> Vec<Metadata> {
        let corpus = self.corpus.read().await;
        corpus
            .filter_indices(filters)
            .into_iter()
            .map(|i| corpus.metadata()[i].clone())
            .collect()
    }

    /// Write the current corpus through the medium.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let corpus = self.corpus.write().await;
        let mut pending = self.pending.lock().await;
        self.settle(&corpus, &mut pending).await?;

        let count = corpus.len();
        let encoded = encode_committed(&corpus)?;
        self.write_snapshot(&corpus, &mut pending, encoded, count).await?;
        tracing::info!(records = count, "corpus persisted");
        Ok(())
    }

    /// Replace the in-memory corpus with the persisted one.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let mut corpus = self.corpus.write().await;
        let mut pending = self.pending.lock().await;
        self.settle(&corpus, &mut pending).await?;
        *corpus = load_corpus(Arc::clone(&self.medium), self.options.persist_timeout).await?;
        Ok(corpus.len())
    }

    pub async fn stats(&self) -> CorpusStats {
        corpus_stats(&*self.corpus.read().await)
    }

    /// Write both streams, waiting at most the persist timeout.
    ///
    /// `corpus` is the committed corpus, which may differ from `encoded` when a
    /// batch is staged. A write that times out keeps running; `pending` then
    /// holds a task that waits for it and writes `corpus` back over whatever it
    /// left behind.
    async fn write_snapshot(
        &self,
        corpus: &Corpus,
        pending: &mut Option<PendingWrite>,
        encoded: codec::EncodedSnapshot,
        records: usize,
    ) -> Result<(), StoreError> {
        let medium = Arc::clone(&self.medium);
        let mut handle = tokio::task::spawn_blocking(move || write_streams(&*medium, &encoded));
        let after = self.options.persist_timeout;
        match tokio::time::timeout(after, &mut handle).await {
            Err(_) => {
                tracing::warn!(records, timeout = ?after, "persist timed out; write still in flight");
                let committed = encode_committed(corpus)?;
                let medium = Arc::clone(&self.medium);
                *pending = Some(tokio::spawn(async move {
                    let late = handle.await;
                    tracing::info!(
                        landed = matches!(late, Ok(Ok(()))),
                        "late write finished; restoring committed corpus"
                    );
                    match tokio::task::spawn_blocking(move || write_streams(&*medium, &committed)).await {
                        Ok(result) => result,
                        Err(join) => Err(anyhow::anyhow!("restore task failed: {join}")),
                    }
                }));
                Err(StoreError::Timeout {
                    operation: "persist",
                    records,
                    after,
                })
            }
            Ok(Err(join)) => Err(StoreError::persistence(
                "persist",
                records,
                format!("persist task failed: {join}"),
            )),
            Ok(Ok(result)) => result.map_err(|e| StoreError::persistence("persist", records, e)),
        }
    }

    /// Wait for the restore queued by an earlier timeout.
    ///
    /// While it is still running every write path fails with a persist
    /// timeout. If it failed, the committed corpus is written again here.
    async fn settle(&self, corpus: &Corpus, pending: &mut Option<PendingWrite>) -> Result<(), StoreError> {
        let Some(mut handle) = pending.take() else {
            return Ok(());
        };
        let after = self.options.persist_timeout;
        let outcome = match tokio::time::timeout(after, &mut handle).await {
            Err(_) => {
                *pending = Some(handle);
                return Err(StoreError::Timeout {
                    operation: "persist",
                    records: 0,
                    after,
                });
            }
            Ok(outcome) => outcome,
        };
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(error = %format!("{e:#}"), "restoring committed corpus failed; retrying");
                self.write_snapshot(corpus, pending, encode_committed(corpus)?, corpus.len()).await
            }
            Err(join) => {
                tracing::warn!(error = %join, "restore task failed; retrying");
                self.write_snapshot(corpus, pending, encode_committed(corpus)?, corpus.len()).await
            }
        }
    }

    /// Run the provider on the blocking pool under the embed timeout.
    async fn embed(&self, operation: &'static str, texts: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        let count = texts.len();
        let provider = Arc::clone(&self.provider);
        run_blocking(operation, count, self.options.embed_timeout, move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            provider.embed_batch(&refs)
        })
        .await
        .map_err(|e| match e {
            BlockingError::Timeout(after) => StoreError::Timeout {
                operation,
                records: count,
                after,
            },
            BlockingError::Failed(e) => StoreError::provider(operation, count, e),
        })
    }
}

/// Stats of the persisted corpus, read without an embedding provider.
pub async fn persisted_stats(
    medium: Arc<dyn PersistenceMedium>,
    timeout: Duration,
) -> Result<CorpusStats, StoreError> {
    let corpus = load_corpus(medium, timeout).await?;
    Ok(corpus_stats(&corpus))
}

fn write_streams(medium: &dyn PersistenceMedium, encoded: &codec::EncodedSnapshot) -> anyhow::Result<()> {
    medium.write_batch(&[
        (codec::VECTORS_KEY, encoded.vectors.as_slice()),
        (codec::METADATA_KEY, encoded.metadata.as_slice()),
    ])
}

fn encode_committed(corpus: &Corpus) -> Result<codec::EncodedSnapshot, StoreError> {
    codec::encode(
        corpus.dimension().unwrap_or(0),
        &[(corpus.vectors(), corpus.metadata())],
    )
    .map_err(|e| StoreError::persistence("encode", corpus.len(), e))
}

fn corpus_stats(corpus: &Corpus) -> CorpusStats {
    let mut by_team = BTreeMap::new();
    let mut by_season = BTreeMap::new();
    let mut players = BTreeSet::new();
    for m in corpus.metadata() {
        if let Some(team) = m.get("team").and_then(|v| v.as_str()) {
            *by_team.entry(team.to_string()).or_insert(0) += 1;
        }
        if let Some(season) = m.get("season").and_then(|v| v.as_str()) {
            *by_season.entry(season.to_string()).or_insert(0) += 1;
        }
        if let Some(player) = m.get("player") {
            players.insert(player.to_string());
        }
    }
    CorpusStats {
        records: corpus.len(),
        dimension: corpus.dimension(),
        by_team,
        by_season,
        players: players.len(),
    }
}

async fn load_corpus(
    medium: Arc<dyn PersistenceMedium>,
    timeout: Duration,
) -> Result<Corpus, StoreError> {
    let streams = run_blocking("load", 0, timeout, move || {
        let vectors = medium.read_all(codec::VECTORS_KEY)?;
        let metadata = medium.read_all(codec::METADATA_KEY)?;
        Ok((vectors, metadata))
    })
    .await
    .map_err(|e| e.into_store_error("load", 0))?;

    match streams {
        (None, None) => Ok(Corpus::new()),
        (Some(vectors), Some(metadata)) => codec::decode(&vectors, &metadata)
            .map_err(|e| StoreError::persistence("load", 0, e)),
        (Some(_), None) => Err(StoreError::persistence("load", 0, "metadata stream missing")),
        (None, Some(_)) => Err(StoreError::persistence("load", 0, "vector stream missing")),
    }
}

enum BlockingError {
    Timeout(Duration),
    Failed(anyhow::Error),
}

impl BlockingError {
    fn into_store_error(self, operation: &'static str, records: usize) -> StoreError {
        match self {
            Self::Timeout(after) => StoreError::Timeout {
                operation,
                records,
                after,
            },
            Self::Failed(e) => StoreError::persistence(operation, records, e),
        }
    }
}

/// Run `f` on the blocking pool, giving up after `timeout`.
///
/// On timeout the blocking task is detached. Only reads and provider calls go
/// through here; writes use [`VectorStore::write_snapshot`].
async fn run_blocking<T, F>(
    operation: &'static str,
    records: usize,
    timeout: Duration,
    f: F,
) -> Result<T, BlockingError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Err(_) => {
            tracing::warn!(operation, records, ?timeout, "blocking call timed out");
            Err(BlockingError::Timeout(timeout))
        }
        Ok(Err(join)) => Err(BlockingError::Failed(anyhow::anyhow!(
            "{operation} task failed: {join}"
        ))),
        Ok(Ok(result)) => result.map_err(BlockingError::Failed),
    }
}
