#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{validate_id_str, ContractViolation, SchemaVersion, Validate};
use crate::question::{DimensionId, PolicyAreaId};

pub const CHUNK_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        validate_id_str("chunk_id", &id, 128)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ChunkId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_str("chunk_id", &self.0, 128)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChunkId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> String {
        id.0
    }
}

/// Lowercase hex sha256 digest, exactly 64 chars.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hex: impl Into<String>) -> Result<Self, ContractViolation> {
        let hex = hex.into();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ContractViolation::InvalidValue {
                field: "content_hash",
                reason: "must be lowercase hex sha256 (64 chars)",
            });
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ContentHash {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != 64
            || !self
                .0
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ContractViolation::InvalidValue {
                field: "content_hash",
                reason: "must be lowercase hex sha256 (64 chars)",
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> String {
        hash.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: u64,
    pub end: u64,
}

impl TextSpan {
    pub fn new(start: u64, end: u64) -> Result<Self, ContractViolation> {
        let span = Self { start, end };
        span.validate()?;
        Ok(span)
    }
}

impl Validate for TextSpan {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.start > self.end {
            return Err(ContractViolation::InvalidValue {
                field: "text_span",
                reason: "start must be <= end",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkResolution {
    Micro,
    Meso,
    Macro,
}

impl ChunkResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkResolution::Micro => "micro",
            ChunkResolution::Meso => "meso",
            ChunkResolution::Macro => "macro",
        }
    }
}

/// Sorted set of element names a chunk (or question) schema declares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedElements(BTreeSet<String>);

impl ExpectedElements {
    pub fn new(
        elements: impl IntoIterator<Item = String>,
    ) -> Result<Self, ContractViolation> {
        let set: BTreeSet<String> = elements.into_iter().collect();
        let e = Self(set);
        e.validate()?;
        Ok(e)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Validate for ExpectedElements {
    fn validate(&self) -> Result<(), ContractViolation> {
        for element in &self.0 {
            validate_id_str("expected_elements.element", element, 64)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExpectedElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("[")?;
        for element in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(element)?;
            first = false;
        }
        f.write_str("]")
    }
}

/// Chunk fields before content addressing. The integrity runtime seals a
/// draft into a `Chunk` by canonicalizing the text and computing its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub chunk_id: ChunkId,
    pub text: String,
    pub text_span: TextSpan,
    pub resolution: ChunkResolution,
    pub policy_area_id: Option<PolicyAreaId>,
    pub dimension_id: Option<DimensionId>,
    pub expected_elements: ExpectedElements,
}

impl Validate for ChunkDraft {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.chunk_id.validate()?;
        if self.text.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "chunk_draft.text",
                reason: "must not be empty",
            });
        }
        self.text_span.validate()?;
        if let Some(area) = &self.policy_area_id {
            area.validate()?;
        }
        if let Some(dimension) = &self.dimension_id {
            dimension.validate()?;
        }
        self.expected_elements.validate()
    }
}

/// Content-addressed span of document text. Fields are private: `text` is
/// frozen at construction, so `content_hash` stays the hash of `text` for
/// the lifetime of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    schema_version: SchemaVersion,
    chunk_id: ChunkId,
    text: String,
    text_span: TextSpan,
    resolution: ChunkResolution,
    content_hash: ContentHash,
    policy_area_id: Option<PolicyAreaId>,
    dimension_id: Option<DimensionId>,
    expected_elements: ExpectedElements,
}

impl Chunk {
    /// Assembles a sealed chunk. `content_hash` must be the digest of
    /// `text`; the integrity runtime is the only producer of that pairing.
    pub fn v1(
        chunk_id: ChunkId,
        text: String,
        text_span: TextSpan,
        resolution: ChunkResolution,
        content_hash: ContentHash,
        policy_area_id: Option<PolicyAreaId>,
        dimension_id: Option<DimensionId>,
        expected_elements: ExpectedElements,
    ) -> Result<Self, ContractViolation> {
        let c = Self {
            schema_version: CHUNK_CONTRACT_VERSION,
            chunk_id,
            text,
            text_span,
            resolution,
            content_hash,
            policy_area_id,
            dimension_id,
            expected_elements,
        };
        c.validate()?;
        Ok(c)
    }

    pub fn chunk_id(&self) -> &ChunkId {
        &self.chunk_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_span(&self) -> TextSpan {
        self.text_span
    }

    pub fn resolution(&self) -> ChunkResolution {
        self.resolution
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn policy_area_id(&self) -> Option<&PolicyAreaId> {
        self.policy_area_id.as_ref()
    }

    pub fn dimension_id(&self) -> Option<&DimensionId> {
        self.dimension_id.as_ref()
    }

    pub fn expected_elements(&self) -> &ExpectedElements {
        &self.expected_elements
    }

    pub fn coordinate(&self) -> Option<(&PolicyAreaId, &DimensionId)> {
        match (&self.policy_area_id, &self.dimension_id) {
            (Some(area), Some(dimension)) => Some((area, dimension)),
            _ => None,
        }
    }
}

impl Validate for Chunk {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != CHUNK_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "chunk.schema_version",
                reason: "must match CHUNK_CONTRACT_VERSION",
            });
        }
        self.chunk_id.validate()?;
        if self.text.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "chunk.text",
                reason: "must not be empty",
            });
        }
        self.text_span.validate()?;
        self.content_hash.validate()?;
        if let Some(area) = &self.policy_area_id {
            area.validate()?;
        }
        if let Some(dimension) = &self.dimension_id {
            dimension.validate()?;
        }
        self.expected_elements.validate()
    }
}

/// Owning map of all chunks in a package. Duplicate ids are rejected at
/// insertion, never silently overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkGraph {
    chunks: BTreeMap<ChunkId, Chunk>,
}

impl ChunkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk: Chunk) -> Result<(), ContractViolation> {
        chunk.validate()?;
        let id = chunk.chunk_id().clone();
        if self.chunks.contains_key(&id) {
            return Err(ContractViolation::DuplicateValue {
                field: "chunk_graph.chunk_id",
                key: id.as_str().to_string(),
            });
        }
        self.chunks.insert(id, chunk);
        Ok(())
    }

    pub fn get(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChunkId, &Chunk)> {
        self.chunks.iter()
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = &ChunkId> {
        self.chunks.keys()
    }
}

impl Validate for ChunkGraph {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (id, chunk) in &self.chunks {
            chunk.validate()?;
            if id != chunk.chunk_id() {
                return Err(ContractViolation::InvalidValue {
                    field: "chunk_graph",
                    reason: "key must equal chunk.chunk_id",
                });
            }
        }
        Ok(())
    }
}

/// Root hash over the full chunk set plus the per-chunk hash map. The root
/// is derived from the sorted chunk hashes, so recomputation is invariant
/// under insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIndex {
    pub schema_version: SchemaVersion,
    pub root: ContentHash,
    pub by_chunk: BTreeMap<ChunkId, ContentHash>,
}

impl IntegrityIndex {
    pub fn v1(
        root: ContentHash,
        by_chunk: BTreeMap<ChunkId, ContentHash>,
    ) -> Result<Self, ContractViolation> {
        let index = Self {
            schema_version: CHUNK_CONTRACT_VERSION,
            root,
            by_chunk,
        };
        index.validate()?;
        Ok(index)
    }
}

impl Validate for IntegrityIndex {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != CHUNK_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "integrity_index.schema_version",
                reason: "must match CHUNK_CONTRACT_VERSION",
            });
        }
        self.root.validate()?;
        if self.by_chunk.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "integrity_index.by_chunk",
                reason: "must not be empty",
            });
        }
        for (id, hash) in &self.by_chunk {
            id.validate()?;
            hash.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(byte: u8) -> ContentHash {
        ContentHash::new(format!("{:02x}", byte).repeat(32)).unwrap()
    }

    fn chunk(id: &str) -> Chunk {
        Chunk::v1(
            ChunkId::new(id).unwrap(),
            "Budget allocations are published quarterly.".to_string(),
            TextSpan::new(0, 43).unwrap(),
            ChunkResolution::Micro,
            hash_of(0xab),
            None,
            None,
            ExpectedElements::default(),
        )
        .unwrap()
    }

    #[test]
    fn at_chunk_01_content_hash_requires_lowercase_hex_64() {
        assert!(ContentHash::new("ab".repeat(32)).is_ok());
        assert!(ContentHash::new("AB".repeat(32)).is_err());
        assert!(ContentHash::new("ab".repeat(31)).is_err());
        assert!(ContentHash::new("zz".repeat(32)).is_err());
    }

    #[test]
    fn at_chunk_02_text_span_rejects_inverted_offsets() {
        assert!(TextSpan::new(10, 4).is_err());
        assert!(TextSpan::new(4, 4).is_ok());
    }

    #[test]
    fn at_chunk_03_graph_rejects_duplicate_chunk_id() {
        let mut graph = ChunkGraph::new();
        graph.insert(chunk("c1")).unwrap();
        let err = graph.insert(chunk("c1")).unwrap_err();
        assert!(matches!(err, ContractViolation::DuplicateValue { .. }));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn at_chunk_04_empty_chunk_text_rejected() {
        let result = Chunk::v1(
            ChunkId::new("c2").unwrap(),
            "   ".to_string(),
            TextSpan::new(0, 3).unwrap(),
            ChunkResolution::Meso,
            hash_of(0xcd),
            None,
            None,
            ExpectedElements::default(),
        );
        assert!(result.is_err());
    }
}
