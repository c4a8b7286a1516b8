#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::ExpectedElements;
use crate::common::{validate_id_str, ContractViolation, SchemaVersion, Validate};
use crate::signal::SignalType;

pub const QUESTION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

macro_rules! id_newtype {
    ($name:ident, $field:literal, $max:literal) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
                let id = id.into();
                validate_id_str($field, &id, $max)?;
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Validate for $name {
            fn validate(&self) -> Result<(), ContractViolation> {
                validate_id_str($field, &self.0, $max)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ContractViolation;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

id_newtype!(PolicyAreaId, "policy_area_id", 64);
id_newtype!(DimensionId, "dimension_id", 64);
id_newtype!(QuestionId, "question_id", 128);
id_newtype!(PatternId, "pattern_id", 128);

/// 1-based ordinal of a question in the canonical catalog. Bounded so it
/// zero-pads to three digits inside task ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct QuestionGlobal(u16);

impl QuestionGlobal {
    pub fn new(value: u16) -> Result<Self, ContractViolation> {
        if value == 0 || value > 999 {
            return Err(ContractViolation::InvalidValue {
                field: "question_global",
                reason: "must be within 1..=999",
            });
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl Validate for QuestionGlobal {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 || self.0 > 999 {
            return Err(ContractViolation::InvalidValue {
                field: "question_global",
                reason: "must be within 1..=999",
            });
        }
        Ok(())
    }
}

impl TryFrom<u16> for QuestionGlobal {
    type Error = ContractViolation;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QuestionGlobal> for u16 {
    fn from(global: QuestionGlobal) -> u16 {
        global.0
    }
}

/// Matching pattern attached to a question. `policy_area_id` is optional at
/// the contract level; the pattern filter treats absence as a hard error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: PatternId,
    pub policy_area_id: Option<PolicyAreaId>,
    pub expression: String,
}

impl Pattern {
    pub fn v1(
        pattern_id: PatternId,
        policy_area_id: Option<PolicyAreaId>,
        expression: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            pattern_id,
            policy_area_id,
            expression: expression.into(),
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for Pattern {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.pattern_id.validate()?;
        if let Some(area) = &self.policy_area_id {
            area.validate()?;
        }
        if self.expression.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "pattern.expression",
                reason: "must not be empty",
            });
        }
        if self.expression.len() > 512 {
            return Err(ContractViolation::InvalidValue {
                field: "pattern.expression",
                reason: "must be <= 512 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub schema_version: SchemaVersion,
    pub question_id: QuestionId,
    pub question_global: QuestionGlobal,
    pub policy_area_id: PolicyAreaId,
    pub dimension_id: DimensionId,
    pub signal_requirements: BTreeSet<SignalType>,
    pub patterns: Vec<Pattern>,
    pub expected_elements: ExpectedElements,
}

impl Question {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        question_id: QuestionId,
        question_global: QuestionGlobal,
        policy_area_id: PolicyAreaId,
        dimension_id: DimensionId,
        signal_requirements: BTreeSet<SignalType>,
        patterns: Vec<Pattern>,
        expected_elements: ExpectedElements,
    ) -> Result<Self, ContractViolation> {
        let q = Self {
            schema_version: QUESTION_CONTRACT_VERSION,
            question_id,
            question_global,
            policy_area_id,
            dimension_id,
            signal_requirements,
            patterns,
            expected_elements,
        };
        q.validate()?;
        Ok(q)
    }
}

impl Validate for Question {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != QUESTION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "question.schema_version",
                reason: "must match QUESTION_CONTRACT_VERSION",
            });
        }
        self.question_id.validate()?;
        self.question_global.validate()?;
        self.policy_area_id.validate()?;
        self.dimension_id.validate()?;
        for requirement in &self.signal_requirements {
            requirement.validate()?;
        }
        if self.patterns.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "question.patterns",
                reason: "must be <= 64",
            });
        }
        for pattern in &self.patterns {
            pattern.validate()?;
        }
        self.expected_elements.validate()
    }
}

/// The questionnaire as loaded from its canonical file. Question ids and
/// globals must be unique across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCatalog {
    pub schema_version: SchemaVersion,
    pub questions: Vec<Question>,
}

impl QuestionCatalog {
    pub fn v1(questions: Vec<Question>) -> Result<Self, ContractViolation> {
        let c = Self {
            schema_version: QUESTION_CONTRACT_VERSION,
            questions,
        };
        c.validate()?;
        Ok(c)
    }
}

impl Validate for QuestionCatalog {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != QUESTION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "question_catalog.schema_version",
                reason: "must match QUESTION_CONTRACT_VERSION",
            });
        }
        if self.questions.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "question_catalog.questions",
                reason: "must not be empty",
            });
        }
        let mut ids = BTreeSet::new();
        let mut globals = BTreeSet::new();
        for question in &self.questions {
            question.validate()?;
            if !ids.insert(question.question_id.clone()) {
                return Err(ContractViolation::DuplicateValue {
                    field: "question_catalog.question_id",
                    key: question.question_id.as_str().to_string(),
                });
            }
            if !globals.insert(question.question_global) {
                return Err(ContractViolation::DuplicateValue {
                    field: "question_catalog.question_global",
                    key: question.question_global.value().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, global: u16) -> Question {
        Question::v1(
            QuestionId::new(id).unwrap(),
            QuestionGlobal::new(global).unwrap(),
            PolicyAreaId::new("PA01").unwrap(),
            DimensionId::new("D1").unwrap(),
            BTreeSet::new(),
            vec![],
            ExpectedElements::default(),
        )
        .unwrap()
    }

    #[test]
    fn at_question_01_global_bounds_enforced() {
        assert!(QuestionGlobal::new(0).is_err());
        assert!(QuestionGlobal::new(1).is_ok());
        assert!(QuestionGlobal::new(999).is_ok());
        assert!(QuestionGlobal::new(1000).is_err());
    }

    #[test]
    fn at_question_02_catalog_rejects_duplicate_globals() {
        let err =
            QuestionCatalog::v1(vec![question("q1", 7), question("q2", 7)]).unwrap_err();
        assert!(matches!(err, ContractViolation::DuplicateValue { .. }));
    }

    #[test]
    fn at_question_03_pattern_expression_must_be_non_empty() {
        let err = Pattern::v1(PatternId::new("p1").unwrap(), None, "  ");
        assert!(err.is_err());
    }
}
