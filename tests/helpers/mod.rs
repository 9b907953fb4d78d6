#![allow(dead_code)]

use anyhow::Result;
use courtside::embedding::EmbeddingProvider;
use courtside::store::medium::{MemoryMedium, PersistenceMedium};
use courtside::store::types::{metadata, MetaValue, Record};
use courtside::store::{StoreOptions, VectorStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bag-of-words provider: each token bumps one hashed dimension.
///
/// Deterministic, and texts sharing words score higher than texts that don't.
pub struct KeywordProvider {
    dim: usize,
    calls: AtomicUsize,
}

impl KeywordProvider {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

impl EmbeddingProvider for KeywordProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dim];
                for token in text.split_whitespace() {
                    let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
                    if !token.is_empty() {
                        v[(fnv1a(&token) % self.dim as u64) as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// Returns fixed vectors per text; unknown text is an error.
pub struct ScriptedProvider {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, Vec<f32>)>) -> Self {
        Self {
            vectors: pairs.into_iter().map(|(t, v)| (t.to_string(), v)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for ScriptedProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(*t)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no scripted vector for {t:?}"))
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        "scripted-test"
    }
}

/// Sleeps before delegating, to trip the store's embed timeout.
pub struct SlowProvider {
    pub delay: Duration,
    pub inner: KeywordProvider,
}

impl EmbeddingProvider for SlowProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        std::thread::sleep(self.delay);
        self.inner.embed_batch(texts)
    }

    fn model_name(&self) -> &str {
        "slow-test"
    }
}

/// In-memory medium whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyMedium {
    inner: MemoryMedium,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyMedium {
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PersistenceMedium for FlakyMedium {
    fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read_all(key)
    }

    fn write_all(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.write_batch(&[(key, bytes)])
    }

    fn write_batch(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        anyhow::ensure!(!self.fail_writes.load(Ordering::SeqCst), "disk full");
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_batch(entries)
    }

    fn describe(&self) -> String {
        "flaky".into()
    }
}

/// In-memory medium that can stall its next write.
#[derive(Default)]
pub struct SlowWriteMedium {
    inner: MemoryMedium,
    next_delay_ms: AtomicUsize,
}

impl SlowWriteMedium {
    /// Make the next `write_batch` sleep for `delay` before writing.
    pub fn delay_next_write(&self, delay: Duration) {
        self.next_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }
}

impl PersistenceMedium for SlowWriteMedium {
    fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read_all(key)
    }

    fn write_all(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.write_batch(&[(key, bytes)])
    }

    fn write_batch(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        let delay = self.next_delay_ms.swap(0, Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        self.inner.write_batch(entries)
    }

    fn describe(&self) -> String {
        "slow-write".into()
    }
}

pub fn options() -> StoreOptions {
    StoreOptions {
        embed_timeout: Duration::from_secs(5),
        persist_timeout: Duration::from_secs(5),
        strict_filters: false,
    }
}

/// Open a store over `medium` with test options.
pub async fn open_store(
    provider: Arc<dyn EmbeddingProvider>,
    medium: Arc<dyn PersistenceMedium>,
) -> VectorStore {
    VectorStore::open(provider, medium, options()).await.unwrap()
}

/// Record with string-valued metadata.
pub fn record(text: &str, pairs: &[(&str, &str)]) -> Record {
    Record::new(
        text,
        metadata(pairs.iter().map(|(k, v)| (*k, MetaValue::from(*v)))),
    )
}

/// A 4-dim one-hot vector scaled by `scale`.
pub fn spike(i: usize, scale: f32) -> Vec<f32> {
    let mut v = vec![0.0; 4];
    v[i] = scale;
    v
}

/// One game-log record carrying the fields the recommender reads.
pub fn game(player: &str, team: &str, season: &str, opponent: &str, minutes: f64, pts: f64) -> Record {
    Record::new(
        format!("{player} vs {opponent}: {minutes} MIN, {pts} PTS rotation"),
        metadata([
            ("player", MetaValue::from(player)),
            ("team", team.into()),
            ("season", season.into()),
            ("opponent", opponent.into()),
            ("minutes", minutes.into()),
            ("pts", pts.into()),
            ("reb", 5.0.into()),
            ("ast", 3.0.into()),
        ]),
    )
}
