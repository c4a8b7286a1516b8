#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkId;
use crate::common::{validate_id_str, ContractViolation, SchemaVersion, Validate};

pub const SIGNAL_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SignalType(String);

impl SignalType {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = name.into();
        validate_id_str("signal_type", &name, 64)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SignalType {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_str("signal_type", &self.0, 64)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SignalType {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SignalType> for String {
    fn from(name: SignalType) -> String {
        name.0
    }
}

/// Immutable (type, content) pair. `None` content is a valid-but-empty
/// signal, distinct from a missing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    signal_type: SignalType,
    content: Option<String>,
}

impl Signal {
    pub fn v1(
        signal_type: SignalType,
        content: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let s = Self {
            signal_type,
            content,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn signal_type(&self) -> &SignalType {
        &self.signal_type
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl Validate for Signal {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.signal_type.validate()?;
        if let Some(content) = &self.content {
            if content.len() > 16384 {
                return Err(ContractViolation::InvalidValue {
                    field: "signal.content",
                    reason: "must be <= 16384 bytes",
                });
            }
        }
        Ok(())
    }
}

/// All signals resolvable for one chunk, keyed by type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPack {
    pub schema_version: SchemaVersion,
    pub chunk_id: ChunkId,
    pub signals: BTreeMap<SignalType, Signal>,
}

impl SignalPack {
    pub fn v1(
        chunk_id: ChunkId,
        signals: BTreeMap<SignalType, Signal>,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: SIGNAL_CONTRACT_VERSION,
            chunk_id,
            signals,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn resolved_types(&self) -> impl Iterator<Item = &SignalType> {
        self.signals.keys()
    }

    pub fn get(&self, signal_type: &SignalType) -> Option<&Signal> {
        self.signals.get(signal_type)
    }
}

impl Validate for SignalPack {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != SIGNAL_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "signal_pack.schema_version",
                reason: "must match SIGNAL_CONTRACT_VERSION",
            });
        }
        self.chunk_id.validate()?;
        for (signal_type, signal) in &self.signals {
            signal.validate()?;
            if signal_type != signal.signal_type() {
                return Err(ContractViolation::InvalidValue {
                    field: "signal_pack.signals",
                    reason: "key must equal signal.signal_type",
                });
            }
        }
        Ok(())
    }
}
