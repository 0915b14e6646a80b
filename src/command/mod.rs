// src/command/mod.rs

//! Command factory.
//!
//! [`declare_command`] validates an executable once and returns a reusable
//! [`Command`]. Every call spawns a fresh process with the declared
//! configuration; only the arguments vary.
//!
//! - [`config`] holds the configuration and stream variants.
//! - [`resolve`] finds executables on `PATH`.
//! - [`spawn`] wires standard streams for both scheduling regimes.
//! - [`handle`] is the live or exited [`ProcessHandle`].
//! - [`relay`] forwards output and drives interactive sessions.
//! - [`exit`] decides what a non-zero exit code means.

pub mod config;
pub mod exit;
pub mod handle;
pub mod relay;
pub mod resolve;
pub mod spawn;

use log::debug;
use std::future::Future;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

pub use config::{
    Captured, CommandConfig, Console, Mode, OutputTarget, Produced, Producer, StdinSource,
    StdioPolicy,
};
pub use exit::ExitPolicy;
pub use handle::{ChunkReader, InputWriter, ProcessHandle};
pub use relay::{Relay, RelayStats};

use crate::errors::{CommandError, Result};

pub type Invocation<'a> = Pin<Box<dyn Future<Output = Result<Option<ProcessHandle>>> + 'a>>;

/// A validated executable bound to one configuration.
#[derive(Debug, Clone)]
pub struct Command {
    identifier: String,
    location: PathBuf,
    config: Arc<CommandConfig>,
    policy: ExitPolicy,
}

/// Validate `identifier` and build a reusable command.
///
/// Fails with [`CommandError::MissingSearchPath`] or
/// [`CommandError::NotFound`]; no usable command exists in that case.
pub fn declare_command(identifier: &str, config: CommandConfig) -> Result<Command> {
    let location = resolve::locate(identifier)?;
    debug!(
        "declared {} ({}, mode {:?})",
        identifier,
        if config.asynchronous { "async" } else { "sync" },
        config.mode
    );
    Ok(Command {
        identifier: identifier.to_string(),
        location,
        policy: ExitPolicy::new(config.die_on_failure),
        config: Arc::new(config),
    })
}

fn to_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter().map(|a| a.as_ref().to_string()).collect()
}

impl Command {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Where the executable was found when it was declared.
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    pub fn is_async(&self) -> bool {
        self.config.asynchronous
    }

    fn mismatch(&self) -> CommandError {
        CommandError::VariantMismatch {
            identifier: self.identifier.clone(),
            declared: if self.config.asynchronous { "async" } else { "sync" },
        }
    }

    /// Run with the variant the command was declared with.
    pub fn invoke(&self, args: Vec<String>) -> Invocation<'_> {
        if self.config.asynchronous {
            Box::pin(async move { self.call_async(args.as_slice()).await })
        } else {
            Box::pin(async move { self.call(args.as_slice()) })
        }
    }

    /// Synchronous variant. Blocks until the process exits.
    ///
    /// Returns the exited handle in [`Mode::Manual`], `None` otherwise.
    pub fn call<S: AsRef<str>>(&self, args: &[S]) -> Result<Option<ProcessHandle>> {
        if self.config.asynchronous {
            return Err(self.mismatch());
        }
        let args = to_args(args);
        let config = &*self.config;

        let (code, stdout, stderr) = match &config.stdin {
            // Manual relays nothing: the producer's chunks become one payload
            // and the buffers are captured like any other run.
            StdinSource::Producer(producer) if config.mode == Mode::Manual => {
                let payload = relay::collect_blocking(producer)?;
                let fed = config.clone().stdin(StdinSource::Static(payload));
                let done = spawn::run_blocking(&self.identifier, &args, &fed)?;
                (done.code, done.stdout, done.stderr)
            }
            StdinSource::Producer(producer) => {
                (self.interactive_blocking(&args, producer)?, Vec::new(), Vec::new())
            }
            _ => {
                let done = spawn::run_blocking(&self.identifier, &args, config)?;
                relay::forward_captured(config.mode, &done.stdout, &done.stderr, &config.console)?;
                (done.code, done.stdout, done.stderr)
            }
        };

        self.policy.evaluate(&self.identifier, &args, code)?;

        if config.mode == Mode::Manual {
            return Ok(Some(ProcessHandle::exited(
                &self.identifier,
                &args,
                self.policy,
                code,
                stdout,
                stderr,
            )));
        }
        Ok(None)
    }

    fn interactive_blocking(&self, args: &[String], producer: &Producer) -> Result<Option<i32>> {
        let config = &*self.config;
        let mut child = spawn::spawn_blocking(&self.identifier, args, config)?;
        let pumps = spawn::attach_sinks_blocking(config, &mut child);

        let input = child.stdin.take().ok_or_else(|| {
            CommandError::Io(std::io::Error::other("interactive input was not piped"))
        })?;
        let mut pipes = relay::BlockingPipes {
            input: BufWriter::new(input),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        let stats = relay::drive_blocking(&mut pipes, producer, config.mode, &config.console)?;
        debug!("{}: interactive session done {:?}", self.identifier, stats);
        drop(pipes);

        let status = match child.try_wait()? {
            Some(status) => status,
            None => {
                // Already-exited processes make kill fail; the wait below
                // still reports their status.
                child.kill().ok();
                child.wait()?
            }
        };
        for pump in pumps {
            pump.join().ok();
        }
        Ok(status.code())
    }

    /// Asynchronous variant.
    ///
    /// In [`Mode::Manual`] without interactive input, resolves to the live
    /// handle as soon as the process is spawned. Otherwise resolves once
    /// relay (or the interactive session) completes.
    pub async fn call_async<S: AsRef<str>>(&self, args: &[S]) -> Result<Option<ProcessHandle>> {
        if !self.config.asynchronous {
            return Err(self.mismatch());
        }
        let args = to_args(args);
        let config = &*self.config;

        let (child, pumps) = spawn::spawn_async(&self.identifier, &args, config)?;
        let mut handle = ProcessHandle::live(&self.identifier, &args, self.policy, child, pumps);

        let kind = Relay::for_invocation(config.mode, config.stdin.is_producer());
        match (kind, &config.stdin) {
            (Relay::Piped { restore }, StdinSource::Producer(producer)) => {
                let stats = relay::drive(&mut handle, producer, restore, &config.console).await?;
                debug!("{}: interactive session done {:?}", self.identifier, stats);
                handle.kill().await?;
                if restore == Mode::Manual {
                    return Ok(Some(handle));
                }
                Ok(None)
            }
            (Relay::Direct(mode), _) if mode != Mode::Manual => {
                // Nobody writes to a piped input here; close it so the child
                // sees end-of-file.
                if let Some(input) = handle.input.take() {
                    input.close().await?;
                }
                relay::forward_live(&mut handle, mode, &config.console).await?;
                handle.wait().await?;
                Ok(None)
            }
            _ => Ok(Some(handle)),
        }
    }
}
