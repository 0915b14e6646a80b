// Stream wiring for spawned processes.
use log::debug;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::config::{CommandConfig, OutputTarget, SharedWriter, StdinSource};
use crate::errors::{CommandError, Result};

/// Result of a blocking, non-interactive run.
pub(crate) struct Finished {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

fn stdin_stdio(source: &StdinSource) -> Stdio {
    match source {
        StdinSource::Absent => Stdio::null(),
        StdinSource::Policy(policy) => policy.stdio(),
        StdinSource::Static(_) | StdinSource::Stream(_) | StdinSource::Producer(_) => {
            Stdio::piped()
        }
    }
}

/// Build the process description shared by both scheduling regimes.
///
/// Arguments are passed verbatim; no shell is involved.
pub(crate) fn build(identifier: &str, args: &[String], config: &CommandConfig) -> Command {
    let mut cmd = Command::new(identifier);
    cmd.args(args);

    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }

    match &config.env {
        Some(vars) => {
            cmd.env_clear();
            cmd.envs(vars);
        }
        None => {
            cmd.envs(crate::env::overrides());
        }
    }

    cmd.stdin(stdin_stdio(&config.stdin))
        .stdout(config.stdout.stdio())
        .stderr(config.stderr.stdio());
    cmd
}

fn spawn_error(identifier: &str) -> impl FnOnce(io::Error) -> CommandError + '_ {
    move |source| CommandError::Spawn {
        identifier: identifier.to_string(),
        source,
    }
}

pub(crate) fn spawn_blocking(
    identifier: &str,
    args: &[String],
    config: &CommandConfig,
) -> Result<Child> {
    debug!("spawning {} {:?} (blocking)", identifier, args);
    build(identifier, args, config)
        .spawn()
        .map_err(spawn_error(identifier))
}

/// Feed a static or streamed source into the child on a helper thread.
fn feed_blocking(source: &StdinSource, child: &mut Child) -> Option<JoinHandle<()>> {
    let payload = match source {
        StdinSource::Static(bytes) => Payload::Bytes(bytes.clone()),
        StdinSource::Stream(reader) => Payload::Stream(reader.clone()),
        _ => return None,
    };
    let mut child_in = child.stdin.take()?;
    Some(thread::spawn(move || {
        let res = match payload {
            Payload::Bytes(bytes) => child_in.write_all(&bytes),
            Payload::Stream(reader) => reader
                .contents()
                .and_then(|bytes| child_in.write_all(&bytes)),
        };
        if let Err(e) = res {
            debug!("stdin feed ended early: {}", e);
        }
    }))
}

enum Payload {
    Bytes(Vec<u8>),
    Stream(super::config::SharedReader),
}

fn pump_blocking<R>(target: &OutputTarget, pipe: Option<R>) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let OutputTarget::Sink(sink) = target else {
        return None;
    };
    let mut pipe = pipe?;
    let mut sink = sink.clone();
    Some(thread::spawn(move || {
        io::copy(&mut pipe, &mut sink).ok();
        sink.flush().ok();
    }))
}

/// Attach sink copies to whichever output pipes feed a sink.
pub(crate) fn attach_sinks_blocking(config: &CommandConfig, child: &mut Child) -> Vec<JoinHandle<()>> {
    let mut pumps = Vec::new();
    if matches!(config.stdout, OutputTarget::Sink(_)) {
        pumps.extend(pump_blocking(&config.stdout, child.stdout.take()));
    }
    if matches!(config.stderr, OutputTarget::Sink(_)) {
        pumps.extend(pump_blocking(&config.stderr, child.stderr.take()));
    }
    pumps
}

/// Spawn, feed input, and block until the process exits.
pub(crate) fn run_blocking(
    identifier: &str,
    args: &[String],
    config: &CommandConfig,
) -> Result<Finished> {
    let mut child = spawn_blocking(identifier, args, config)?;

    let feeder = feed_blocking(&config.stdin, &mut child);
    let pumps = attach_sinks_blocking(config, &mut child);

    // Collects whichever of stdout/stderr are still piped.
    let output = child.wait_with_output()?;

    if let Some(handle) = feeder {
        handle.join().ok();
    }
    for handle in pumps {
        handle.join().ok();
    }

    Ok(Finished {
        code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

async fn pump<R>(mut pipe: R, mut sink: SharedWriter)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; super::handle::CHUNK_SIZE];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = sink.write_all(&buf[..n]) {
                    debug!("sink write failed: {}", e);
                    break;
                }
            }
            Err(e) => {
                debug!("sink pump read failed: {}", e);
                break;
            }
        }
    }
    sink.flush().ok();
}

/// Spawn on the tokio runtime.
///
/// Static and streamed input, and sink outputs, are handled by background
/// tasks. Pipes that stay attached to the returned child belong to the
/// caller.
pub(crate) fn spawn_async(
    identifier: &str,
    args: &[String],
    config: &CommandConfig,
) -> Result<(tokio::process::Child, Vec<tokio::task::JoinHandle<()>>)> {
    debug!("spawning {} {:?} (async)", identifier, args);
    let mut cmd = tokio::process::Command::from(build(identifier, args, config));
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn().map_err(spawn_error(identifier))?;

    let mut pumps = Vec::new();

    match &config.stdin {
        StdinSource::Static(bytes) => {
            if let Some(mut child_in) = child.stdin.take() {
                let bytes = bytes.clone();
                pumps.push(tokio::spawn(async move {
                    if let Err(e) = child_in.write_all(&bytes).await {
                        debug!("stdin feed ended early: {}", e);
                    }
                }));
            }
        }
        StdinSource::Stream(reader) => {
            if let Some(mut child_in) = child.stdin.take() {
                let reader = reader.clone();
                pumps.push(tokio::spawn(async move {
                    let bytes = tokio::task::spawn_blocking(move || reader.contents()).await;
                    match bytes {
                        Ok(Ok(bytes)) => {
                            if let Err(e) = child_in.write_all(&bytes).await {
                                debug!("stdin feed ended early: {}", e);
                            }
                        }
                        Ok(Err(e)) => debug!("reading stdin stream failed: {}", e),
                        Err(e) => debug!("stdin stream task failed: {}", e),
                    }
                }));
            }
        }
        _ => {}
    }

    if let OutputTarget::Sink(sink) = &config.stdout {
        if let Some(out) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(out, sink.clone())));
        }
    }
    if let OutputTarget::Sink(sink) = &config.stderr {
        if let Some(err) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(err, sink.clone())));
        }
    }

    Ok((child, pumps))
}
