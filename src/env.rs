//! Process-wide environment table.
//!
//! A single table shared by the whole process. It is layered over the real process
//! environment and inherited by every spawn that does not pass an explicit
//! `env`. Values set here never touch `std::env`, so nothing in the crate
//! needs `unsafe` `set_var`.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

static OVERRIDES: LazyLock<RwLock<HashMap<String, String>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Read a variable, preferring values set through [`set`].
pub fn get(name: &str) -> Option<String> {
    if let Some(value) = OVERRIDES
        .read()
        .ok()
        .and_then(|table| table.get(name).cloned())
    {
        return Some(value);
    }
    std::env::var(name).ok()
}

/// Set a variable for every subsequently spawned process.
pub fn set(name: &str, value: &str) {
    if let Ok(mut table) = OVERRIDES.write() {
        table.insert(name.to_string(), value.to_string());
    }
}

/// Snapshot of the values set through [`set`].
pub fn overrides() -> HashMap<String, String> {
    OVERRIDES
        .read()
        .map(|table| table.clone())
        .unwrap_or_default()
}

/// Host environment merged with the override table.
pub fn snapshot() -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();
    vars.extend(overrides());
    vars
}
