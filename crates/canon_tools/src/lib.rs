#![forbid(unsafe_code)]

pub mod coverage;
pub mod files;
pub mod probe;

use std::sync::Arc;

use canon_os::RuntimeContext;

/// Two acquisitions of the process-wide context must return the
/// identical instance.
pub fn assert_shared_context() -> Result<(), String> {
    let first = RuntimeContext::shared()
        .ok_or_else(|| "no shared runtime context installed".to_string())?;
    let second = RuntimeContext::shared()
        .ok_or_else(|| "no shared runtime context installed".to_string())?;
    if !Arc::ptr_eq(&first, &second) {
        return Err("shared context acquisitions returned distinct instances".to_string());
    }
    Ok(())
}
