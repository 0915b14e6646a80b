//! Output relay and the interactive produce/write/read loop.
//!
//! The interactive loop is strictly one-for-one: every produced chunk is
//! written (and flushed when it ends in a newline), then at most one chunk is
//! read from each stream the mode relays, before the producer is called
//! again. It suits line-oriented programs such as REPLs. A process that
//! answers one line with several chunks, or a producer that runs ahead of
//! the process, desynchronises the relay.

use log::debug;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::process::{ChildStderr, ChildStdin, ChildStdout};

use super::config::{Console, Mode, PendingChunk, Produced, Producer};
use super::handle::{ChunkReader, ProcessHandle, CHUNK_SIZE};
use crate::errors::Result;

/// How output is relayed for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// Plain forwarding according to the configured mode.
    Direct(Mode),
    /// Interactive input was requested; the coordinator owns the streams and
    /// relays according to `restore` once they are attached.
    Piped { restore: Mode },
}

impl Relay {
    pub fn for_invocation(mode: Mode, interactive: bool) -> Self {
        if interactive {
            Relay::Piped { restore: mode }
        } else {
            Relay::Direct(mode)
        }
    }
}

/// Counters for one interactive session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub writes: usize,
    pub reads_out: usize,
    pub reads_err: usize,
}

fn is_closed(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset)
}

fn non_empty(chunk: Option<Vec<u8>>) -> Option<Vec<u8>> {
    chunk.filter(|c| !c.is_empty())
}

/// Echo buffers captured by a synchronous run.
pub fn forward_captured(mode: Mode, stdout: &[u8], stderr: &[u8], console: &Console) -> io::Result<()> {
    if mode.forwards_out() && !stdout.is_empty() {
        console.write(stdout)?;
    }
    if mode.forwards_err() && !stderr.is_empty() {
        console.write(stderr)?;
    }
    Ok(())
}

async fn drain<R>(reader: Option<&mut ChunkReader<R>>, forward: bool, console: &Console) -> io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };
    while let Some(chunk) = reader.read().await? {
        if forward {
            console.write(&chunk)?;
        }
    }
    Ok(())
}

/// Drain both output readers of a live handle, echoing what the mode asks
/// for. Streams the mode does not relay are still drained so the child never
/// blocks on a full pipe.
pub async fn forward_live(handle: &mut ProcessHandle, mode: Mode, console: &Console) -> io::Result<()> {
    let out = drain(handle.stdout_reader.as_mut(), mode.forwards_out(), console);
    let err = drain(handle.stderr_reader.as_mut(), mode.forwards_err(), console);
    let (out, err) = tokio::join!(out, err);
    out?;
    err
}

/// Relay one chunk from `reader`, if present. `false` means the stream
/// closed and the session is over.
async fn relay_one<R>(reader: Option<&mut ChunkReader<R>>, console: &Console) -> io::Result<bool>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(true);
    };
    match reader.read().await? {
        Some(chunk) => {
            console.write(&chunk)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Interactive loop, asynchronous variant.
///
/// Returns once the producer is drained or a relayed stream closes. The
/// caller terminates the process afterwards.
pub async fn drive(
    handle: &mut ProcessHandle,
    producer: &Producer,
    mode: Mode,
    console: &Console,
) -> Result<RelayStats> {
    let mut stats = RelayStats::default();

    loop {
        let chunk = match producer.call()? {
            Produced::Ready(chunk) => chunk,
            Produced::Pending(pending) => pending.await,
        };
        let Some(chunk) = non_empty(chunk) else {
            debug!("producer drained after {} writes", stats.writes);
            break;
        };

        let Some(input) = handle.input.as_mut() else {
            debug!("no input attached; ending session");
            break;
        };
        match input.write(&chunk).await {
            Ok(()) => stats.writes += 1,
            Err(e) if is_closed(&e) => break,
            Err(e) => return Err(e.into()),
        }
        if chunk.ends_with(b"\n") {
            match input.flush().await {
                Ok(()) => {}
                Err(e) if is_closed(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if mode.forwards_out() {
            if !relay_one(handle.stdout_reader.as_mut(), console).await? {
                debug!("stdout closed during relay");
                break;
            }
            if handle.stdout_reader.is_some() {
                stats.reads_out += 1;
            }
        }
        if mode.forwards_err() {
            if !relay_one(handle.stderr_reader.as_mut(), console).await? {
                debug!("stderr closed during relay");
                break;
            }
            if handle.stderr_reader.is_some() {
                stats.reads_err += 1;
            }
        }
    }

    Ok(stats)
}

/// Resolve a pending producer result without an ambient runtime.
fn block_on_pending(pending: PendingChunk) -> io::Result<Option<Vec<u8>>> {
    std::thread::spawn(move || -> io::Result<Option<Vec<u8>>> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(rt.block_on(pending))
    })
    .join()
    .map_err(|_| io::Error::other("producer future panicked"))?
}

/// Call the producer until it is drained and join its chunks into one
/// payload. Used when nothing is relayed, so no read has to interleave.
pub fn collect_blocking(producer: &Producer) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    loop {
        let chunk = match producer.call()? {
            Produced::Ready(chunk) => chunk,
            Produced::Pending(pending) => block_on_pending(pending)?,
        };
        match non_empty(chunk) {
            Some(chunk) => payload.extend_from_slice(&chunk),
            None => break,
        }
    }
    debug!("collected {} bytes of producer input", payload.len());
    Ok(payload)
}

/// Read one chunk and forward it. `Ok(None)` means the stream closed.
fn relay_one_blocking<R: Read>(pipe: &mut R, buf: &mut [u8], console: &Console) -> io::Result<Option<usize>> {
    let n = pipe.read(buf)?;
    if n == 0 {
        return Ok(None);
    }
    console.write(&buf[..n])?;
    Ok(Some(n))
}

/// Pipes the synchronous coordinator works with.
pub struct BlockingPipes {
    pub input: BufWriter<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Interactive loop, synchronous variant.
pub fn drive_blocking(
    pipes: &mut BlockingPipes,
    producer: &Producer,
    mode: Mode,
    console: &Console,
) -> Result<RelayStats> {
    let mut stats = RelayStats::default();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let chunk = match producer.call()? {
            Produced::Ready(chunk) => chunk,
            Produced::Pending(pending) => block_on_pending(pending)?,
        };
        let Some(chunk) = non_empty(chunk) else {
            debug!("producer drained after {} writes", stats.writes);
            break;
        };

        match pipes.input.write_all(&chunk) {
            Ok(()) => stats.writes += 1,
            Err(e) if is_closed(&e) => break,
            Err(e) => return Err(e.into()),
        }
        if chunk.ends_with(b"\n") {
            match pipes.input.flush() {
                Ok(()) => {}
                Err(e) if is_closed(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if mode.forwards_out() {
            if let Some(out) = pipes.stdout.as_mut() {
                if relay_one_blocking(out, &mut buf, console)?.is_none() {
                    debug!("stdout closed during relay");
                    break;
                }
                stats.reads_out += 1;
            }
        }
        if mode.forwards_err() {
            if let Some(err) = pipes.stderr.as_mut() {
                if relay_one_blocking(err, &mut buf, console)?.is_none() {
                    debug!("stderr closed during relay");
                    break;
                }
                stats.reads_err += 1;
            }
        }
    }

    Ok(stats)
}
