pub mod common;
pub mod task;

use anyhow::{Result, anyhow, bail};
use colored::*;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::command::exit::describe;
use crate::command::{Command, Console, Mode, declare_command, relay};
use crate::config::{KilnConfig, load_config};
use crate::utils::{expand_vars, split_words};
use self::common::expand_globs;
use self::task::Step;

/// `(directory, target)` pairs currently being run.
pub struct CallStack {
    stack: HashSet<String>,
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            stack: HashSet::new(),
        }
    }

    pub fn push(&mut self, key: &str) -> Result<()> {
        if self.stack.contains(key) {
            bail!("🔄 Circular call detected: {}", key);
        }
        self.stack.insert(key.to_string());
        Ok(())
    }

    pub fn pop(&mut self, key: &str) {
        self.stack.remove(key);
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

/// How targets are run.
#[derive(Clone)]
pub struct RunOptions {
    pub file_name: String,
    pub dry_run: bool,
    pub console: Console,
}

impl RunOptions {
    pub fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            dry_run: false,
            console: Console::host(),
        }
    }
}

/// A loaded build file with every declared command resolved.
pub struct Project {
    pub dir: PathBuf,
    pub config: KilnConfig,
    commands: BTreeMap<String, Command>,
}

impl Project {
    /// Load the build file in `dir`, publish its `[env]` table and declare
    /// all of its commands. A command that cannot be resolved fails the load.
    pub fn load(dir: &Path, opts: &RunOptions) -> Result<Self> {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let dir = dir.as_path();
        let config = load_config(dir, &opts.file_name)?;

        for (key, value) in &config.env {
            crate::env::set(key, value);
        }

        let mut commands = BTreeMap::new();
        for (name, decl) in &config.command {
            let command_config = decl.to_config(dir, &opts.console, opts.dry_run)?;
            // `./script` is relative to the build file, not to the host's cwd.
            let identifier = match decl.identifier(name) {
                rel if rel.starts_with('.') => dir.join(rel).to_string_lossy().to_string(),
                other => other.to_string(),
            };
            let command = declare_command(&identifier, command_config)?;
            commands.insert(name.clone(), command);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            commands,
        })
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.config.target.contains_key(name)
    }
}

type Run<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// Load the build file in `dir` and run `targets` in order.
pub fn run_targets<'a>(
    dir: &'a Path,
    targets: &'a [String],
    opts: &'a RunOptions,
    call_stack: &'a mut CallStack,
) -> Run<'a> {
    Box::pin(async move {
        let project = Project::load(dir, opts)?;
        for target in targets {
            run_target(&project, target, opts, call_stack).await?;
        }
        Ok(())
    })
}

/// Run one target of an already loaded project.
pub async fn run_target(
    project: &Project,
    target_name: &str,
    opts: &RunOptions,
    call_stack: &mut CallStack,
) -> Result<()> {
    let target = project
        .config
        .target
        .get(target_name)
        .ok_or_else(|| anyhow!("Unknown target \"{}\"", target_name))?;

    let key = format!("{}::{}", project.dir.display(), target_name);
    call_stack.push(&key)?;

    info!("{} Running target: {}", "⚡".yellow(), target_name.bold());

    for step in target.steps() {
        run_step(project, target_name, &step, opts, call_stack).await?;
    }

    call_stack.pop(&key);
    Ok(())
}

async fn run_step(
    project: &Project,
    target_name: &str,
    step: &Step,
    opts: &RunOptions,
    call_stack: &mut CallStack,
) -> Result<()> {
    match step {
        Step::Line(line) => {
            let words = split_words(&expand_vars(line))?;
            let Some((name, args)) = words.split_first() else {
                debug!("empty step in target {}", target_name);
                return Ok(());
            };
            run_command(project, target_name, name, args, opts).await
        }
        Step::Call { run, args } => {
            let args: Vec<String> = args.iter().map(|a| expand_vars(a)).collect();
            run_command(project, target_name, run, &args, opts).await
        }
        Step::Enter { enter, targets } => {
            let sub = project.dir.join(enter);
            if !sub.is_dir() {
                warn!("{} No directory \"{}\", skipping", "⚠️".yellow(), sub.display());
                return Ok(());
            }
            info!("Entering \"{}\"", sub.display());
            run_targets(&sub, targets, opts, call_stack).await?;
            info!("Leaving \"{}\"", sub.display());
            Ok(())
        }
    }
}

async fn run_command(
    project: &Project,
    target_name: &str,
    name: &str,
    args: &[String],
    opts: &RunOptions,
) -> Result<()> {
    let command = project
        .command(name)
        .ok_or_else(|| anyhow!("Unknown command \"{}\" in target \"{}\"", name, target_name))?;

    let base = command.config().cwd.as_deref().unwrap_or(&project.dir);
    let args = expand_globs(args, base);
    let line = describe(command.identifier(), &args);

    if opts.dry_run {
        println!("{} [DRY-RUN] Executing: {}", "::".yellow(), line);
        return Ok(());
    }

    info!("{} Executing: {}", "::".blue(), line);

    // Live handles from async manual commands are finished here so steps
    // stay sequential. Their output is read and dropped.
    if let Some(mut handle) = command.invoke(args).await? {
        if handle.is_running() {
            if let Some(input) = handle.input.take() {
                input.close().await?;
            }
            relay::forward_live(&mut handle, Mode::Manual, &opts.console).await?;
            handle.wait().await?;
        }
    }
    Ok(())
}
