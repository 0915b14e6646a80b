use anyhow::Result;
use colored::*;
use std::env;

use crate::handlers::list::print_targets;
use crate::runner::{CallStack, Project, RunOptions, run_target, run_targets};

pub fn handle_runner_entry(targets: Vec<String>, file_name: &str, dry_run: bool) -> Result<()> {
    let current_dir = env::current_dir()?;
    let mut opts = RunOptions::new(file_name);
    opts.dry_run = dry_run;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut call_stack = CallStack::new();

        if !targets.is_empty() {
            return run_targets(&current_dir, &targets, &opts, &mut call_stack).await;
        }

        let project = Project::load(&current_dir, &opts)?;
        if project.has_target("help") {
            return run_target(&project, "help", &opts, &mut call_stack).await;
        }

        println!("{} kiln [OPTIONS] [TARGETS]...", "Usage:".bold());
        println!();
        print_targets(&project.config);
        Ok(())
    })
}
