use anyhow::Result;
use colored::*;
use crate::config::{KilnConfig, load_config};

use std::env;

pub fn handle_list(file_name: &str) -> Result<()> {
    let current_dir = env::current_dir()?;
    let config = load_config(&current_dir, file_name)?;

    if let Some(p) = &config.project {
        let name = p.name.as_deref().unwrap_or("Unnamed Project");
        let version = p.version.as_deref().unwrap_or("");
        println!("{} {} {}", "📦".green(), name.bold(), version.dimmed());
        if let Some(desc) = &p.description {
            println!("   {}", desc.italic());
        }
        println!();
    }

    print_targets(&config);
    Ok(())
}

/// Target names padded into a column, followed by their descriptions.
pub fn print_targets(config: &KilnConfig) {
    if config.target.is_empty() {
        println!("No targets defined in configuration.");
        return;
    }

    println!("{}", "Available Targets:".bold().underline());

    let max_len = config.target.keys().map(|n| n.len()).max().unwrap_or(0);
    for (name, target) in &config.target {
        let padding = " ".repeat(max_len - name.len() + 2);
        let description = target.description().unwrap_or("");
        println!("  {}{}{}", name.cyan(), padding, description.italic());
    }
}
