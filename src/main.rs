use anyhow::Result;
use clap::Parser;
use colored::*;
use kiln::cli::Cli;
use kiln::errors::CommandError;
use kiln::handlers::{env, list, task};
use std::process;

fn run(cli: Cli) -> Result<()> {
    if cli.list {
        list::handle_list(&cli.file)
    } else if cli.env {
        env::handle_env(&cli.file)
    } else {
        task::handle_runner_entry(cli.targets, &cli.file, cli.dry_run)
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    // Children share the terminal's process group and see the signal too.
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\n{} Interrupted", "⚠️".yellow());
        process::exit(130);
    }) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "❌".red(), format!("{:#}", e).red());
        let code = e
            .downcast_ref::<CommandError>()
            .map(CommandError::exit_code)
            .unwrap_or(1);
        process::exit(code);
    }
}
