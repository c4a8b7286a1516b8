#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use canon_kernel_contracts::chunk::{
    Chunk, ChunkDraft, ChunkGraph, ContentHash, IntegrityIndex,
};
use canon_kernel_contracts::{ContractViolation, Validate};

const HEX: &[u8; 16] = b"0123456789abcdef";

fn hex_lower(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// NFC-normalized text with uniform line endings. Chunk text is
/// canonicalized once, at sealing, so equal content always hashes equal.
pub fn canonical_text(raw: &str) -> String {
    raw.replace("\r\n", "\n").nfc().collect()
}

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let digest = Sha256::digest(bytes);
    // The digest is always 32 bytes of valid lowercase hex.
    match ContentHash::new(hex_lower(&digest)) {
        Ok(hash) => hash,
        Err(_) => unreachable!("sha256 digest always encodes to 64 lowercase hex chars"),
    }
}

pub fn hash_text(text: &str) -> ContentHash {
    hash_bytes(text.as_bytes())
}

/// Seals a draft into a content-addressed chunk: canonicalizes the text,
/// computes its hash, and freezes both together.
pub fn seal_chunk(draft: ChunkDraft) -> Result<Chunk, ContractViolation> {
    draft.validate()?;
    let text = canonical_text(&draft.text);
    let content_hash = hash_text(&text);
    Chunk::v1(
        draft.chunk_id,
        text,
        draft.text_span,
        draft.resolution,
        content_hash,
        draft.policy_area_id,
        draft.dimension_id,
        draft.expected_elements,
    )
}

/// Recomputes a chunk's hash from its text and compares it to the stored
/// one. A mismatch means the chunk was not produced by `seal_chunk`.
pub fn verify_chunk(chunk: &Chunk) -> Result<(), ContractViolation> {
    if &hash_text(chunk.text()) != chunk.content_hash() {
        return Err(ContractViolation::InvalidValue {
            field: "chunk.content_hash",
            reason: "must equal the hash of the chunk text",
        });
    }
    Ok(())
}

fn root_from_hashes(hashes: &mut Vec<&ContentHash>) -> ContentHash {
    // Sort before combining: the root is invariant under insertion order.
    hashes.sort();
    let mut concat = String::with_capacity(hashes.len() * 64);
    for hash in hashes.iter() {
        concat.push_str(hash.as_str());
    }
    hash_text(&concat)
}

/// Builds the integrity index over a graph, verifying every chunk's own
/// hash along the way.
pub fn build_index(graph: &ChunkGraph) -> Result<IntegrityIndex, ContractViolation> {
    if graph.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "chunk_graph",
            reason: "must not be empty when indexing",
        });
    }
    let mut by_chunk = BTreeMap::new();
    for (chunk_id, chunk) in graph.iter() {
        verify_chunk(chunk)?;
        by_chunk.insert(chunk_id.clone(), chunk.content_hash().clone());
    }
    let mut hashes: Vec<&ContentHash> = by_chunk.values().collect();
    let root = root_from_hashes(&mut hashes);
    IntegrityIndex::v1(root, by_chunk)
}

/// Full recomputation check of an index against its graph.
pub fn verify_index(
    graph: &ChunkGraph,
    index: &IntegrityIndex,
) -> Result<(), ContractViolation> {
    let recomputed = build_index(graph)?;
    if recomputed.root != index.root {
        return Err(ContractViolation::InvalidValue {
            field: "integrity_index.root",
            reason: "must match recomputation from the chunk set",
        });
    }
    if recomputed.by_chunk != index.by_chunk {
        return Err(ContractViolation::InvalidValue {
            field: "integrity_index.by_chunk",
            reason: "must match recomputation from the chunk set",
        });
    }
    Ok(())
}
