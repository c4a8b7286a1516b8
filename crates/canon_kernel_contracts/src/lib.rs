#![forbid(unsafe_code)]

pub mod audit;
pub mod calib;
pub mod chunk;
pub mod common;
pub mod error;
pub mod phase;
pub mod plan;
pub mod question;
pub mod signal;
pub mod task;

pub use common::{
    ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, UnitScore, Validate,
};
pub use error::PlanError;
