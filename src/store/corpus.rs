//! In-memory corpus: a row-major vector matrix paired with per-row metadata.
//!
//! The corpus only grows. New rows are first collected into a [`StagedBatch`]
//! (validated and normalized) and are appended with [`Corpus::commit`] once the
//! caller has durably written the combined state.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::error::StoreError;
use super::types::{matches_filters, Filters, Metadata, RankedHit};

/// Norms below this are treated as zero so normalization never divides by ~0.
pub const MIN_NORM: f32 = 1e-12;

/// L2-normalize a vector in place.
///
/// Vectors whose norm is below [`MIN_NORM`] become exact zero vectors instead
/// of blowing up to huge values or NaN.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < MIN_NORM {
        v.iter_mut().for_each(|x| *x = 0.0);
    } else {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Validated, normalized rows that have not been committed yet.
#[derive(Debug, Clone)]
pub struct StagedBatch {
    vectors: Array2<f32>,
    metadata: Vec<Metadata>,
}

impl StagedBatch {
    /// Build a batch from raw provider output.
    ///
    /// Fails if the row count disagrees with the metadata count, if rows have
    /// differing widths, or if any component is not finite.
    pub fn new(vectors: Vec<Vec<f32>>, metadata: Vec<Metadata>) -> Result<Self, StoreError> {
        let rows = vectors.len();
        if rows != metadata.len() {
            return Err(StoreError::provider(
                "embed",
                metadata.len(),
                format!("provider returned {rows} vectors for {} texts", metadata.len()),
            ));
        }

        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if rows > 0 && dim == 0 {
            return Err(StoreError::provider("embed", rows, "provider returned empty vectors"));
        }

        let mut flat = Vec::with_capacity(rows * dim);
        for (i, mut row) in vectors.into_iter().enumerate() {
            if row.len() != dim {
                return Err(StoreError::provider(
                    "embed",
                    rows,
                    format!("row {i} has {} dims, expected {dim}", row.len()),
                ));
            }
            if row.iter().any(|x| !x.is_finite()) {
                return Err(StoreError::provider(
                    "embed",
                    rows,
                    format!("row {i} contains non-finite values"),
                ));
            }
            l2_normalize(&mut row);
            flat.extend_from_slice(&row);
        }

        let vectors = Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| StoreError::provider("embed", rows, e))?;
        Ok(Self { vectors, metadata })
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vectors(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }
}

/// The committed corpus.
#[derive(Debug, Clone)]
pub struct Corpus {
    vectors: Array2<f32>,
    metadata: Vec<Metadata>,
}

impl Default for Corpus {
    fn default() -> Self {
        Self::new()
    }
}

impl Corpus {
    pub fn new() -> Self {
        Self {
            vectors: Array2::zeros((0, 0)),
            metadata: Vec::new(),
        }
    }

    /// Assemble a corpus from decoded parts. Rows are re-normalized so that a
    /// loaded corpus satisfies the same invariants as a freshly built one.
    pub fn from_parts(mut vectors: Array2<f32>, metadata: Vec<Metadata>) -> Result<Self, String> {
        if vectors.nrows() != metadata.len() {
            return Err(format!(
                "vector rows ({}) and metadata records ({}) disagree",
                vectors.nrows(),
                metadata.len()
            ));
        }
        for mut row in vectors.axis_iter_mut(Axis(0)) {
            if let Some(slice) = row.as_slice_mut() {
                l2_normalize(slice);
            }
        }
        Ok(Self { vectors, metadata })
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Vector width, or `None` while the corpus is empty.
    pub fn dimension(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.vectors.ncols())
    }

    pub fn vectors(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// Reject widths that disagree with the established corpus dimension.
    pub fn check_dimension(&self, actual: usize) -> Result<(), StoreError> {
        match self.dimension() {
            Some(expected) if expected != actual => {
                Err(StoreError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Append a staged batch. Callers must have run [`Corpus::check_dimension`].
    pub fn commit(&mut self, batch: StagedBatch) {
        if batch.is_empty() {
            return;
        }
        if self.is_empty() {
            self.vectors = batch.vectors;
        } else {
            // Widths were checked by the caller; a failure here is a logic bug.
            if let Err(e) = self.vectors.append(Axis(0), batch.vectors.view()) {
                tracing::error!(error = %e, "corpus append rejected a checked batch");
                return;
            }
        }
        self.metadata.extend(batch.metadata);
    }

    /// Indices whose metadata satisfies every filter, in insertion order.
    pub fn filter_indices(&self, filters: &Filters) -> Vec<usize> {
        self.metadata
            .iter()
            .enumerate()
            .filter(|(_, m)| matches_filters(m, filters))
            .map(|(i, _)| i)
            .collect()
    }

    /// Score `candidates` against a normalized query and return the top `k`.
    ///
    /// Ties on score are broken by ascending insertion index.
    pub fn top_k(&self, query: ArrayView1<'_, f32>, candidates: &[usize], k: usize) -> Vec<RankedHit> {
        let sub = self.vectors.select(Axis(0), candidates);
        let sims: Array1<f32> = sub.dot(&query);

        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .copied()
            .zip(sims.iter().map(|s| s.clamp(-1.0, 1.0)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| RankedHit {
                score,
                metadata: self.metadata[idx].clone(),
            })
            .collect()
    }
}
