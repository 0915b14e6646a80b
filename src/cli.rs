use clap::Parser;

use crate::config::BUILD_FILE;

#[derive(Parser)]
#[command(name = "kiln", version, about = "Kiln: a minimal build runner")]
pub struct Cli {
    /// Targets to run, in order
    pub targets: Vec<String>,

    /// Build file to read from the current directory
    #[arg(short = 'f', long = "file", default_value = BUILD_FILE)]
    pub file: String,

    /// List all available targets
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Inspect environment variables
    #[arg(short = 'e', long = "env")]
    pub env: bool,

    /// Print steps without executing them
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,
}
