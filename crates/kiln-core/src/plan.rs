//! Saved build plans
//!
//! `kiln plan --json` writes a [`Schedule`]; these helpers read one back so
//! `kiln run --plan` can execute it without re-planning.

use crate::error::PlanFileError;
use kiln_kernel::Schedule;
use std::path::Path;

/// Parse a schedule from its JSON form
///
/// # Errors
/// Returns `PlanFileError::Json` if the text is not a serialized schedule
pub fn schedule_from_json(text: &str) -> Result<Schedule, PlanFileError> {
    Ok(serde_json::from_str(text)?)
}

/// Read a schedule saved with `kiln plan --json`
///
/// # Errors
/// - `PlanFileError::Io` if the file cannot be read
/// - `PlanFileError::Json` if it does not hold a schedule
pub fn load_schedule(path: impl AsRef<Path>) -> Result<Schedule, PlanFileError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| PlanFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let schedule = schedule_from_json(&text)?;
    tracing::debug!(path = %path.display(), waves = schedule.waves.len(), "plan loaded");
    Ok(schedule)
}
