#![forbid(unsafe_code)]

pub mod adapter;
pub mod context;
pub mod ph0gate;
pub mod ph1canon;
pub mod ph2micro;
pub mod ph3route;
pub mod ph6schema;
pub mod ph7task;
pub mod ph8plan;
pub mod phase;
pub mod pipeline;

pub use context::RuntimeContext;
pub use phase::{Clock, PhaseContract, PhaseLedger, PipelineError, SystemClock};
pub use pipeline::{CanonPipeline, PipelineInput, PipelineRun};
