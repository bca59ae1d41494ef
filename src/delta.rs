//! Delta codec: canonical encode/decode, Merkle root, and chunking for
//! out-of-band transport (spec §4.4, §6).

use crate::config::DeltaConfig;
use crate::error::{ChunkError, DecodeError, SizeError};
use crate::hashing::{sha256_bytes, sha256_hex};
use crate::types::{Block, ChunkFrame, Delta, DeltaMetadata, Timestamp, Transaction, DELTA_VERSION};
use std::collections::HashSet;
use tracing::debug;

/// An encoded delta payload ready for transport. `compressed` records
/// which wire form was used so callers can report it, even though
/// `decode_delta` detects the form itself from the leading marker byte.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDelta {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

const FORMAT_RAW: u8 = 0;
const FORMAT_ZSTD: u8 = 1;
const ZSTD_LEVEL: i32 = 19;

/// §4.4 step 4: Merkle root over SHA-256 digests of each item's canonical
/// encoding, transactions first (timestamp order), then blocks
/// (timestamp order).
pub fn merkle_root(transactions: &[Transaction], blocks: &[Block]) -> String {
    let mut ordered_transactions: Vec<&Transaction> = transactions.iter().collect();
    ordered_transactions.sort_by_key(|tx| tx.timestamp);

    let mut ordered_blocks: Vec<&Block> = blocks.iter().collect();
    ordered_blocks.sort_by_key(|b| b.timestamp);

    let mut concatenated = Vec::new();
    for tx in ordered_transactions {
        concatenated.extend_from_slice(&sha256_bytes(&tx.canonical().encode()));
    }
    for block in ordered_blocks {
        concatenated.extend_from_slice(&sha256_bytes(&block.canonical().encode()));
    }

    sha256_hex(&concatenated)
}

/// §4.4 steps 1-5: assembles a `Delta` from everything newer than
/// `peer_timestamp`.
pub fn build_delta(
    all_transactions: &[Transaction],
    all_blocks: &[Block],
    peer_timestamp: Timestamp,
    now: Timestamp,
) -> Delta {
    let transactions: Vec<Transaction> = all_transactions
        .iter()
        .filter(|tx| tx.timestamp > peer_timestamp)
        .cloned()
        .collect();
    let blocks: Vec<Block> = all_blocks
        .iter()
        .filter(|b| b.timestamp > peer_timestamp)
        .cloned()
        .collect();

    let merkle_root = merkle_root(&transactions, &blocks);

    Delta {
        version: DELTA_VERSION.to_string(),
        timestamp: now,
        merkle_root,
        metadata: DeltaMetadata {
            transaction_count: transactions.len(),
            block_count: blocks.len(),
            encoded_size: 0,
        },
        transactions,
        blocks,
    }
}

/// Canonically encodes a delta, attempting zstd compression first and
/// falling back to the raw form when compression doesn't help. Fails the
/// 500-byte size contract (spec §4.4, §8 property 7) as `SizeError`.
pub fn encode_delta(delta: &Delta, cfg: &DeltaConfig) -> Result<EncodedDelta, SizeError> {
    let mut delta = delta.clone();
    // `encoded_size` reports the canonical (pre-compression) size; the
    // merkle root covers transactions/blocks content only (spec §3
    // invariant), so filling this in after the fact cannot change it.
    let canonical_json = serde_json::to_vec(&delta).expect("Delta serialization is infallible");
    delta.metadata.encoded_size = canonical_json.len();

    let json = serde_json::to_vec(&delta).expect("Delta serialization is infallible");
    let compressed = zstd::stream::encode_all(&json[..], ZSTD_LEVEL).unwrap_or_else(|_| json.clone());

    let (body, marker) = if compressed.len() < json.len() {
        (compressed, FORMAT_ZSTD)
    } else {
        (json, FORMAT_RAW)
    };

    let mut framed = Vec::with_capacity(body.len() + 1);
    framed.push(marker);
    framed.extend(body);

    if framed.len() > cfg.max_encoded_bytes {
        debug!(actual_bytes = framed.len(), limit = cfg.max_encoded_bytes, "delta exceeds size budget");
        return Err(SizeError { actual_bytes: framed.len() });
    }

    debug!(bytes = framed.len(), compressed = marker == FORMAT_ZSTD, "encoded delta");

    Ok(EncodedDelta {
        bytes: framed,
        compressed: marker == FORMAT_ZSTD,
    })
}

/// Reverses `encode_delta`, rejecting malformed bytes or a version other
/// than `"1.0"`.
pub fn decode_delta(bytes: &[u8]) -> Result<Delta, DecodeError> {
    let (marker, body) = bytes.split_first().ok_or(DecodeError::InvalidEncoding)?;

    let json = match *marker {
        FORMAT_RAW => body.to_vec(),
        FORMAT_ZSTD => zstd::stream::decode_all(body).map_err(|_| DecodeError::InvalidEncoding)?,
        _ => return Err(DecodeError::InvalidEncoding),
    };

    let value: serde_json::Value = serde_json::from_slice(&json).map_err(|_| DecodeError::InvalidEncoding)?;
    for field in ["version", "timestamp", "merkle_root", "transactions", "blocks", "metadata"] {
        if value.get(field).is_none() {
            return Err(DecodeError::MissingField(field));
        }
    }

    let delta: Delta = serde_json::from_value(value).map_err(|_| DecodeError::InvalidEncoding)?;

    if delta.version != DELTA_VERSION {
        return Err(DecodeError::VersionMismatch {
            expected: DELTA_VERSION.to_string(),
            found: delta.version,
        });
    }

    Ok(delta)
}

/// Splits an encoded payload into ordered, hash-tagged chunks for a
/// fixed-capacity carrier (e.g. an optical code).
pub fn chunk_payload(encoded: &EncodedDelta, max_chunk_bytes: usize) -> Vec<ChunkFrame> {
    let payload_hash = sha256_hex(&encoded.bytes);
    let chunks: Vec<&[u8]> = if encoded.bytes.is_empty() {
        vec![&[]]
    } else {
        encoded.bytes.chunks(max_chunk_bytes.max(1)).collect()
    };
    let total_chunks = chunks.len() as u32;

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, bytes)| ChunkFrame {
            version: DELTA_VERSION.to_string(),
            total_chunks,
            chunk_index: index as u32,
            payload_hash: payload_hash.clone(),
            chunk_bytes: bytes.to_vec(),
        })
        .collect()
}

/// Reassembles chunks, requiring every index present exactly once and the
/// recomputed hash of the concatenation to match `payload_hash`.
pub fn reassemble_chunks(chunks: &[ChunkFrame]) -> Result<Vec<u8>, ChunkError> {
    let first = chunks.first().ok_or(ChunkError::InconsistentMetadata)?;
    let total = first.total_chunks;
    let payload_hash = first.payload_hash.clone();

    let mut seen = HashSet::new();
    for chunk in chunks {
        if chunk.total_chunks != total || chunk.payload_hash != payload_hash {
            return Err(ChunkError::InconsistentMetadata);
        }
        if !seen.insert(chunk.chunk_index) {
            return Err(ChunkError::DuplicateIndex(chunk.chunk_index));
        }
    }
    for index in 0..total {
        if !seen.contains(&index) {
            return Err(ChunkError::MissingChunk(index));
        }
    }

    let mut ordered: Vec<&ChunkFrame> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);

    let mut out = Vec::new();
    for chunk in ordered {
        out.extend_from_slice(&chunk.chunk_bytes);
    }

    if sha256_hex(&out) != payload_hash {
        return Err(ChunkError::HashMismatch);
    }

    Ok(out)
}
