use anyhow::Result;
use colored::*;
use std::env;

use crate::config::{KilnConfig, load_config};

pub fn handle_env(file_name: &str) -> Result<()> {
    let current_dir = env::current_dir()?;
    // Load config which merges kiln.toml and .env
    let config = load_config(&current_dir, file_name)?;

    println!("{} Environment passed to commands:", "🔍".cyan());
    for (key, value, source) in effective(&config) {
        println!("  {} = {} {}", key.bold(), value, format!("({})", source).dimmed());
    }
    Ok(())
}

/// Variables kiln sets on top of the host environment, sorted, with the
/// file that supplied the final value.
fn effective(config: &KilnConfig) -> Vec<(String, String, String)> {
    let mut vars: Vec<(String, String, String)> = config
        .env
        .iter()
        .map(|(key, value)| {
            let source = config
                .env_provenance
                .get(key)
                .and_then(|history| history.last())
                .map(|(source, _)| source.clone())
                .unwrap_or_default();
            (key.clone(), value.clone(), source)
        })
        .collect();
    vars.sort();
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_effective_values_name_their_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kiln.toml"), "[env]\nA = \"1\"\nC = \"4\"\n").unwrap();
        fs::write(dir.path().join(".env"), "A=2\nB=3\n").unwrap();
        let config = load_config(dir.path(), "kiln.toml").unwrap();

        let vars = effective(&config);
        let row = |k: &str, v: &str, s: &str| (k.to_string(), v.to_string(), s.to_string());
        assert_eq!(
            vars,
            vec![row("A", "2", ".env"), row("B", "3", ".env"), row("C", "4", "kiln.toml")]
        );
    }
}
