//! Executable lookup.

use log::debug;
use std::path::{Path, PathBuf};

use crate::errors::{CommandError, Result};

/// Locate `identifier` using the effective `PATH`.
pub fn locate(identifier: &str) -> Result<PathBuf> {
    let search_path = crate::env::get("PATH");
    locate_in(identifier, search_path.as_deref())
}

/// Locate `identifier` against an explicit search path.
///
/// - A missing search path is an error even for explicit paths.
/// - Identifiers starting with `/` or `.` are checked as given.
/// - Anything else is joined onto each `:`-separated entry.
pub fn locate_in(identifier: &str, search_path: Option<&str>) -> Result<PathBuf> {
    let search_path = search_path.ok_or(CommandError::MissingSearchPath)?;

    if identifier.starts_with('/') || identifier.starts_with('.') {
        let path = Path::new(identifier);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(CommandError::NotFound(identifier.to_string()));
    }

    search_path
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(|entry| Path::new(entry).join(identifier))
        .find(|candidate| candidate.exists())
        .inspect(|found| debug!("resolved {} -> {}", identifier, found.display()))
        .ok_or_else(|| CommandError::NotFound(identifier.to_string()))
}
