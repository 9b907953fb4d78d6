//! Record and result types shared by the vector store and the ranking pipeline.
//!
//! Metadata is a key-ordered map of [`MetaValue`] scalars. Filtering compares
//! values with exact type-and-value equality, so `Number(1.0)` never matches
//! `String("1")`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A metadata scalar.
///
/// Serializes as a bare JSON scalar so persisted metadata and HTTP payloads
/// read naturally (`{"team": "BOS", "pts": 24.0, "starter": true}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Per-record metadata, ordered by key.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Equality filters applied to metadata during search.
pub type Filters = BTreeMap<String, MetaValue>;

/// A text record waiting to be embedded and appended to the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// One search result: cosine similarity plus the stored metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub score: f32,
    pub metadata: Metadata,
}

/// Outcome of a successful batch append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendResult {
    /// Records appended by this call.
    pub added: usize,
    /// Corpus size after the append.
    pub total: usize,
}

/// Returns true when every `(key, value)` of `filters` is present and equal in `metadata`.
pub fn matches_filters(metadata: &Metadata, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

/// Build a [`Metadata`] map from `(key, value)` pairs.
///
/// ```
/// use courtside::store::types::{metadata, MetaValue};
/// let m = metadata([("team", "BOS".into()), ("pts", 12.0.into())]);
/// assert_eq!(m.get("team"), Some(&MetaValue::String("BOS".into())));
/// ```
pub fn metadata<K, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    I: IntoIterator<Item = (K, MetaValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
