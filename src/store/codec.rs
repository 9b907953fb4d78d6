//! Byte encoding for the two persisted streams.
//!
//! - `vectors`: `b"CSVM"`, version `u32`, dimension `u32`, rows `u64`, a 16-byte
//!   snapshot id, then the row-major matrix as little-endian `f32`.
//! - `metadata`: JSON envelope `{version, snapshot, records}`.
//!
//! Both streams of one snapshot carry the same id and count, so a torn write
//! (one stream updated, the other not) is detected on decode.

use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::corpus::Corpus;
use super::types::Metadata;

pub const VECTORS_KEY: &str = "vectors";
pub const METADATA_KEY: &str = "metadata";

const MAGIC: &[u8; 4] = b"CSVM";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 16;

#[derive(Serialize)]
struct MetadataEnvelopeRef<'a> {
    version: u32,
    snapshot: Uuid,
    records: Vec<&'a Metadata>,
}

#[derive(Deserialize)]
struct MetadataEnvelope {
    version: u32,
    snapshot: Uuid,
    records: Vec<Metadata>,
}

/// Encoded form of one corpus snapshot.
pub struct EncodedSnapshot {
    pub snapshot: Uuid,
    pub vectors: Vec<u8>,
    pub metadata: Vec<u8>,
}

/// Encode the concatenation of `parts` as one snapshot.
///
/// Each part is a `(matrix, metadata)` pair; the committed corpus and a staged
/// batch can be written together without first merging them in memory.
pub fn encode(dim: usize, parts: &[(ArrayView2<'_, f32>, &[Metadata])]) -> Result<EncodedSnapshot> {
    let rows: usize = parts.iter().map(|(_, m)| m.len()).sum();
    for (matrix, meta) in parts {
        ensure!(
            matrix.nrows() == meta.len(),
            "part has {} vector rows but {} metadata records",
            matrix.nrows(),
            meta.len()
        );
        ensure!(
            meta.is_empty() || matrix.ncols() == dim,
            "part has width {}, expected {dim}",
            matrix.ncols()
        );
    }

    let snapshot = Uuid::now_v7();

    let mut vectors = Vec::with_capacity(HEADER_LEN + rows * dim * 4);
    vectors.extend_from_slice(MAGIC);
    vectors.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    vectors.extend_from_slice(&u32::try_from(dim).context("dimension overflows u32")?.to_le_bytes());
    vectors.extend_from_slice(&(rows as u64).to_le_bytes());
    vectors.extend_from_slice(snapshot.as_bytes());
    for (matrix, meta) in parts {
        if meta.is_empty() {
            continue;
        }
        // Logical iteration order is row-major regardless of memory layout.
        for x in matrix.iter() {
            vectors.extend_from_slice(&x.to_le_bytes());
        }
    }

    let envelope = MetadataEnvelopeRef {
        version: FORMAT_VERSION,
        snapshot,
        records: parts.iter().flat_map(|(_, m)| m.iter()).collect(),
    };
    let metadata = serde_json::to_vec(&envelope).context("failed to serialize metadata")?;

    Ok(EncodedSnapshot {
        snapshot,
        vectors,
        metadata,
    })
}

/// Decode both streams into a corpus, verifying they describe the same snapshot.
pub fn decode(vectors: &[u8], metadata: &[u8]) -> Result<Corpus> {
    ensure!(vectors.len() >= HEADER_LEN, "vector stream truncated: {} bytes", vectors.len());
    ensure!(&vectors[0..4] == MAGIC, "vector stream has bad magic");

    let version = u32::from_le_bytes(vectors[4..8].try_into()?);
    ensure!(version == FORMAT_VERSION, "unsupported vector stream version {version}");
    let dim = u32::from_le_bytes(vectors[8..12].try_into()?) as usize;
    let rows = usize::try_from(u64::from_le_bytes(vectors[12..20].try_into()?))
        .context("row count overflows usize")?;
    let snapshot = Uuid::from_slice(&vectors[20..36])?;

    let body = &vectors[HEADER_LEN..];
    let expected_len = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .context("vector stream size overflows")?;
    ensure!(
        body.len() == expected_len,
        "vector stream holds {} bytes, expected {expected_len} for {rows}x{dim}",
        body.len()
    );

    let flat: Vec<f32> = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let matrix = Array2::from_shape_vec((rows, dim), flat)?;

    let envelope: MetadataEnvelope =
        serde_json::from_slice(metadata).context("failed to parse metadata stream")?;
    ensure!(
        envelope.version == FORMAT_VERSION,
        "unsupported metadata stream version {}",
        envelope.version
    );
    if envelope.snapshot != snapshot {
        bail!(
            "streams belong to different snapshots (vectors {snapshot}, metadata {})",
            envelope.snapshot
        );
    }
    ensure!(
        envelope.records.len() == rows,
        "vector stream has {rows} rows but metadata stream has {} records",
        envelope.records.len()
    );

    Corpus::from_parts(matrix, envelope.records).map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::corpus::StagedBatch;
    use crate::store::types::{metadata, MetaValue};

    fn sample() -> StagedBatch {
        StagedBatch::new(
            vec![vec![1.0, 2.0, 2.0], vec![0.0, 0.0, 5.0]],
            vec![
                metadata([("player", MetaValue::from("X")), ("pts", 10.0.into())]),
                metadata([("player", MetaValue::from("Y")), ("starter", true.into())]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn encode_then_decode_preserves_rows_and_order() {
        let batch = sample();
        let encoded = encode(3, &[(batch.vectors(), batch.metadata())]).unwrap();
        let corpus = decode(&encoded.vectors, &encoded.metadata).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimension(), Some(3));
        assert_eq!(corpus.metadata(), batch.metadata());
        for (a, b) in corpus.vectors().iter().zip(batch.vectors().iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn encode_concatenates_parts() {
        let first = sample();
        let second = sample();
        let encoded = encode(
            3,
            &[
                (first.vectors(), first.metadata()),
                (second.vectors(), second.metadata()),
            ],
        )
        .unwrap();
        let corpus = decode(&encoded.vectors, &encoded.metadata).unwrap();
        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.metadata()[2], first.metadata()[0]);
    }

    #[test]
    fn decode_rejects_mismatched_snapshots() {
        let batch = sample();
        let a = encode(3, &[(batch.vectors(), batch.metadata())]).unwrap();
        let b = encode(3, &[(batch.vectors(), batch.metadata())]).unwrap();
        let err = decode(&a.vectors, &b.metadata).unwrap_err();
        assert!(err.to_string().contains("different snapshots"));
    }

    #[test]
    fn decode_rejects_truncated_matrix() {
        let batch = sample();
        let encoded = encode(3, &[(batch.vectors(), batch.metadata())]).unwrap();
        let truncated = &encoded.vectors[..encoded.vectors.len() - 4];
        assert!(decode(truncated, &encoded.metadata).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"nope", b"{}").is_err());
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let encoded = encode(0, &[]).unwrap();
        let corpus = decode(&encoded.vectors, &encoded.metadata).unwrap();
        assert!(corpus.is_empty());
    }
}
