#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use canon_engines::signal::SignalProbe;
use canon_kernel_contracts::chunk::{Chunk, ChunkId};
use canon_kernel_contracts::signal::{Signal, SignalPack, SignalType};
use canon_kernel_contracts::ContractViolation;

/// Signal packs precomputed by the external extraction pipeline and
/// shipped as a JSON file: `{ chunk_id: { signal_type: content|null } }`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSignalPacks {
    packs: BTreeMap<ChunkId, SignalPack>,
}

impl FileSignalPacks {
    pub fn from_json_str(raw: &str) -> Result<Self, ContractViolation> {
        let parsed: BTreeMap<String, BTreeMap<String, Option<String>>> =
            serde_json::from_str(raw).map_err(|_| ContractViolation::InvalidValue {
                field: "signal_packs_file",
                reason: "must map chunk ids to signal type/content objects",
            })?;
        let mut packs = BTreeMap::new();
        for (chunk_name, entries) in parsed {
            let chunk_id = ChunkId::new(chunk_name)?;
            let mut signals = BTreeMap::new();
            for (type_name, content) in entries {
                let signal_type = SignalType::new(type_name)?;
                signals.insert(
                    signal_type.clone(),
                    Signal::v1(signal_type, content)?,
                );
            }
            let pack = SignalPack::v1(chunk_id.clone(), signals)?;
            packs.insert(chunk_id, pack);
        }
        Ok(Self { packs })
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

impl SignalProbe for FileSignalPacks {
    fn compute_pack(&self, chunk: &Chunk) -> Result<SignalPack, ContractViolation> {
        self.packs
            .get(chunk.chunk_id())
            .cloned()
            .ok_or(ContractViolation::InvalidValue {
                field: "signal_packs_file",
                reason: "must carry a pack for every routed chunk",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_engines::integrity::seal_chunk;
    use canon_kernel_contracts::chunk::{
        ChunkDraft, ChunkResolution, ExpectedElements, TextSpan,
    };

    fn chunk(id: &str) -> Chunk {
        seal_chunk(ChunkDraft {
            chunk_id: ChunkId::new(id).unwrap(),
            text: "Oversight board publishes minutes.".to_string(),
            text_span: TextSpan::new(0, 34).unwrap(),
            resolution: ChunkResolution::Micro,
            policy_area_id: None,
            dimension_id: None,
            expected_elements: ExpectedElements::default(),
        })
        .unwrap()
    }

    #[test]
    fn at_probe_01_packs_load_and_answer_by_chunk() {
        let packs = FileSignalPacks::from_json_str(
            r#"{
                "c1": { "quote_extract": "\"minutes are published\"", "entity_mentions": null }
            }"#,
        )
        .unwrap();
        assert_eq!(packs.len(), 1);
        let pack = packs.compute_pack(&chunk("c1")).unwrap();
        assert_eq!(pack.signals.len(), 2);
        assert!(packs.compute_pack(&chunk("c2")).is_err());
    }
}
