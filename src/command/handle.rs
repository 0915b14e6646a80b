//! Live or exited representation of one spawned process.

use log::debug;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

use super::exit::ExitPolicy;
use crate::errors::Result;

/// Largest chunk a single [`ChunkReader::read`] returns.
pub const CHUNK_SIZE: usize = 8192;

/// Buffered writer into the process's standard input.
///
/// Bytes stay buffered until [`InputWriter::flush`] is called.
pub struct InputWriter {
    inner: BufWriter<ChildStdin>,
}

impl InputWriter {
    pub fn new(stdin: ChildStdin) -> Self {
        Self {
            inner: BufWriter::new(stdin),
        }
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.write_all(chunk).await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    /// Flush and close the input, signalling end-of-file.
    pub async fn close(mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Pull-based reader yielding at most one chunk per call.
pub struct ChunkReader<R> {
    inner: R,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Next chunk, or `None` once the stream has closed.
    pub async fn read(&mut self) -> io::Result<Option<Vec<u8>>> {
        let n = self.inner.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    /// Everything up to end-of-stream.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut all = Vec::new();
        while let Some(chunk) = self.read().await? {
            all.extend_from_slice(&chunk);
        }
        Ok(all)
    }
}

pub struct ProcessHandle {
    identifier: String,
    args: Vec<String>,
    policy: ExitPolicy,
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    child: Option<Child>,
    pumps: Vec<JoinHandle<()>>,
    pub input: Option<InputWriter>,
    pub stdout_reader: Option<ChunkReader<ChildStdout>>,
    pub stderr_reader: Option<ChunkReader<ChildStderr>>,
}

impl ProcessHandle {
    /// Handle for a process that already ran to completion.
    pub fn exited(
        identifier: &str,
        args: &[String],
        policy: ExitPolicy,
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            args: args.to_vec(),
            policy,
            exit_code,
            stdout,
            stderr,
            child: None,
            pumps: Vec::new(),
            input: None,
            stdout_reader: None,
            stderr_reader: None,
        }
    }

    /// Wrap a running child. Whatever pipes are still attached to it become
    /// the handle's writer and readers.
    pub fn live(
        identifier: &str,
        args: &[String],
        policy: ExitPolicy,
        mut child: Child,
        pumps: Vec<JoinHandle<()>>,
    ) -> Self {
        let input = child.stdin.take().map(InputWriter::new);
        let stdout_reader = child.stdout.take().map(ChunkReader::new);
        let stderr_reader = child.stderr.take().map(ChunkReader::new);
        Self {
            identifier: identifier.to_string(),
            args: args.to_vec(),
            policy,
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            child: Some(child),
            pumps,
            input,
            stdout_reader,
            stderr_reader,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// `None` while running, or when the process was killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Output captured by a synchronous call.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Wait for the process to exit and apply the exit policy.
    ///
    /// The input is closed first so a child reading until end-of-file can
    /// finish.
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        if let Some(input) = self.input.take() {
            if let Err(e) = input.close().await {
                debug!("closing input of {}: {}", self.identifier, e);
            }
        }
        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            self.exit_code = status.code();
            self.join_pumps().await;
        }
        self.policy
            .evaluate(&self.identifier, &self.args, self.exit_code)?;
        Ok(self.exit_code)
    }

    /// Terminate the process explicitly and reap it.
    ///
    /// A process that already exited on its own keeps its real exit code,
    /// and the exit policy sees it.
    pub async fn kill(&mut self) -> Result<Option<i32>> {
        self.input = None;
        if let Some(mut child) = self.child.take() {
            let status = match child.try_wait()? {
                Some(status) => status,
                None => {
                    debug!("killing {} (pid {:?})", self.identifier, child.id());
                    child.kill().await?;
                    child.wait().await?
                }
            };
            self.exit_code = status.code();
            self.join_pumps().await;
        }
        self.policy
            .evaluate(&self.identifier, &self.args, self.exit_code)?;
        Ok(self.exit_code)
    }

    async fn join_pumps(&mut self) {
        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("identifier", &self.identifier)
            .field("args", &self.args)
            .field("exit_code", &self.exit_code)
            .field("running", &self.is_running())
            .finish()
    }
}
