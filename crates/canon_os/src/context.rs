#![forbid(unsafe_code)]

use std::sync::{Arc, OnceLock};

use canon_engines::calib::CalibrationRuntime;

/// Dependency-injected runtime context: one instance per run, owned by
/// the process entry point. The process-wide accessor exists for
/// deployments that need "one instance per process" semantics; tests
/// construct fresh contexts instead.
#[derive(Debug)]
pub struct RuntimeContext {
    pub calibration: CalibrationRuntime,
}

static SHARED: OnceLock<Arc<RuntimeContext>> = OnceLock::new();

impl RuntimeContext {
    pub fn new(calibration: CalibrationRuntime) -> Self {
        Self { calibration }
    }

    /// Installs the process-wide context. The first install wins; every
    /// call returns the installed instance (atomic check-and-set, not a
    /// bare exists-then-create).
    pub fn install(context: RuntimeContext) -> Arc<RuntimeContext> {
        SHARED.get_or_init(|| Arc::new(context)).clone()
    }

    /// The installed process-wide context, if any. Two acquisitions
    /// always return the identical instance.
    pub fn shared() -> Option<Arc<RuntimeContext>> {
        SHARED.get().cloned()
    }
}
