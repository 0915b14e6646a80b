//! Configuration a command is declared with.
//!
//! The stream fields are tagged variants resolved once per spawn:
//! - [`StdinSource`] covers "no input", a static payload, a symbolic policy,
//!   a byte stream and a producer.
//! - [`OutputTarget`] is either a symbolic policy or a sink.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

/// Which captured streams are echoed to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    ForwardBoth,
    ForwardOut,
    ForwardErr,
    /// Nothing is echoed; the caller gets the process handle back.
    Manual,
}

impl Mode {
    pub fn forwards_out(self) -> bool {
        matches!(self, Mode::ForwardBoth | Mode::ForwardOut)
    }

    pub fn forwards_err(self) -> bool {
        matches!(self, Mode::ForwardBoth | Mode::ForwardErr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioPolicy {
    Inherit,
    Pipe,
    Ignore,
}

impl StdioPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inherit" => Some(StdioPolicy::Inherit),
            "pipe" => Some(StdioPolicy::Pipe),
            "ignore" => Some(StdioPolicy::Ignore),
            _ => None,
        }
    }

    pub fn stdio(self) -> Stdio {
        match self {
            StdioPolicy::Inherit => Stdio::inherit(),
            StdioPolicy::Pipe => Stdio::piped(),
            StdioPolicy::Ignore => Stdio::null(),
        }
    }
}

fn poisoned() -> io::Error {
    io::Error::other("stream lock poisoned")
}

/// Writer shared between invocations of the same command.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(w: impl Write + Send + 'static) -> Self {
        let boxed: Box<dyn Write + Send> = Box::new(w);
        Self(Arc::new(Mutex::new(boxed)))
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().map_err(|_| poisoned())?.flush()
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedWriter")
    }
}

/// Byte source shared between invocations of the same command.
///
/// The stream is read to the end on first use. Every invocation, the first
/// included, is fed the same bytes.
#[derive(Clone)]
pub struct SharedReader(Arc<Mutex<ReaderState>>);

enum ReaderState {
    Unread(Box<dyn Read + Send>),
    Read(Arc<[u8]>),
}

impl SharedReader {
    pub fn new(r: impl Read + Send + 'static) -> Self {
        let boxed: Box<dyn Read + Send> = Box::new(r);
        Self(Arc::new(Mutex::new(ReaderState::Unread(boxed))))
    }

    /// All bytes of the stream. Only the first call touches the source.
    pub fn contents(&self) -> io::Result<Arc<[u8]>> {
        let mut state = self.0.lock().map_err(|_| poisoned())?;
        if let ReaderState::Unread(source) = &mut *state {
            let mut buf = Vec::new();
            source.read_to_end(&mut buf)?;
            *state = ReaderState::Read(buf.into());
        }
        match &*state {
            ReaderState::Read(bytes) => Ok(bytes.clone()),
            ReaderState::Unread(_) => Err(io::Error::other("stream was not read")),
        }
    }
}

impl fmt::Debug for SharedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedReader")
    }
}

pub type PendingChunk = Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send>>;

/// One result of calling a producer.
pub enum Produced {
    Ready(Option<Vec<u8>>),
    Pending(PendingChunk),
}

impl Produced {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Option<Vec<u8>>> + Send + 'static,
    {
        Produced::Pending(Box::pin(fut))
    }
}

impl From<Option<Vec<u8>>> for Produced {
    fn from(v: Option<Vec<u8>>) -> Self {
        Produced::Ready(v)
    }
}

impl From<Option<String>> for Produced {
    fn from(v: Option<String>) -> Self {
        Produced::Ready(v.map(String::into_bytes))
    }
}

impl From<Option<&str>> for Produced {
    fn from(v: Option<&str>) -> Self {
        Produced::Ready(v.map(|s| s.as_bytes().to_vec()))
    }
}

type ProducerFn = Box<dyn FnMut() -> Produced + Send>;

/// Caller-supplied function invoked repeatedly for successive input chunks.
///
/// `None` or an empty chunk ends the interactive session.
#[derive(Clone)]
pub struct Producer(Arc<Mutex<ProducerFn>>);

impl Producer {
    pub fn new<F, T>(mut f: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
        T: Into<Produced>,
    {
        let boxed: ProducerFn = Box::new(move || -> Produced { f().into() });
        Self(Arc::new(Mutex::new(boxed)))
    }

    /// Call the producer once. The lock is released before any pending
    /// result is awaited.
    pub fn call(&self) -> io::Result<Produced> {
        let mut f = self.0.lock().map_err(|_| poisoned())?;
        Ok(f())
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Producer")
    }
}

#[derive(Debug, Clone, Default)]
pub enum StdinSource {
    #[default]
    Absent,
    /// Written once, then the input is closed.
    Static(Vec<u8>),
    Policy(StdioPolicy),
    Stream(SharedReader),
    Producer(Producer),
}

impl StdinSource {
    /// Symbolic policy names map to [`StdinSource::Policy`]; anything else
    /// becomes a static payload.
    pub fn text(s: &str) -> Self {
        match StdioPolicy::parse(s) {
            Some(policy) => StdinSource::Policy(policy),
            None => StdinSource::Static(s.as_bytes().to_vec()),
        }
    }

    pub fn number(n: impl fmt::Display) -> Self {
        StdinSource::Static(n.to_string().into_bytes())
    }

    pub fn stream(r: impl Read + Send + 'static) -> Self {
        StdinSource::Stream(SharedReader::new(r))
    }

    pub fn producer<F, T>(f: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
        T: Into<Produced>,
    {
        StdinSource::Producer(Producer::new(f))
    }

    pub fn is_producer(&self) -> bool {
        matches!(self, StdinSource::Producer(_))
    }
}

impl From<&str> for StdinSource {
    fn from(s: &str) -> Self {
        StdinSource::text(s)
    }
}

impl From<StdioPolicy> for StdinSource {
    fn from(p: StdioPolicy) -> Self {
        StdinSource::Policy(p)
    }
}

#[derive(Debug, Clone)]
pub enum OutputTarget {
    Policy(StdioPolicy),
    Sink(SharedWriter),
}

impl OutputTarget {
    pub fn sink(w: impl Write + Send + 'static) -> Self {
        OutputTarget::Sink(SharedWriter::new(w))
    }

    /// Sinks are fed from a pipe by a background copy.
    pub fn stdio(&self) -> Stdio {
        match self {
            OutputTarget::Policy(p) => p.stdio(),
            OutputTarget::Sink(_) => Stdio::piped(),
        }
    }
}

impl Default for OutputTarget {
    fn default() -> Self {
        OutputTarget::Policy(StdioPolicy::Pipe)
    }
}

impl From<StdioPolicy> for OutputTarget {
    fn from(p: StdioPolicy) -> Self {
        OutputTarget::Policy(p)
    }
}

/// In-memory byte buffer, usable as a sink or as the console.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where forwarded output goes. Both streams are written here.
#[derive(Debug, Clone)]
pub struct Console(SharedWriter);

impl Console {
    pub fn host() -> Self {
        Console(SharedWriter::new(io::stdout()))
    }

    pub fn capture() -> (Self, Captured) {
        let buf = Captured::default();
        (Console(SharedWriter::new(buf.clone())), buf)
    }

    pub fn write(&self, chunk: &[u8]) -> io::Result<()> {
        let mut w = self.0.clone();
        w.write_all(chunk)?;
        w.flush()
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::host()
    }
}

#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub asynchronous: bool,
    pub cwd: Option<PathBuf>,
    /// Replaces the inherited environment entirely when set.
    pub env: Option<HashMap<String, String>>,
    pub mode: Mode,
    pub die_on_failure: bool,
    pub stdin: StdinSource,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,
    pub console: Console,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            asynchronous: false,
            cwd: None,
            env: None,
            mode: Mode::default(),
            die_on_failure: true,
            stdin: StdinSource::Absent,
            stdout: OutputTarget::default(),
            stderr: OutputTarget::default(),
            console: Console::host(),
        }
    }
}

impl CommandConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asynchronous(mut self, yes: bool) -> Self {
        self.asynchronous = yes;
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn die_on_failure(mut self, yes: bool) -> Self {
        self.die_on_failure = yes;
        self
    }

    pub fn stdin(mut self, source: impl Into<StdinSource>) -> Self {
        self.stdin = source.into();
        self
    }

    pub fn stdout(mut self, target: impl Into<OutputTarget>) -> Self {
        self.stdout = target.into();
        self
    }

    pub fn stderr(mut self, target: impl Into<OutputTarget>) -> Self {
        self.stderr = target.into();
        self
    }

    pub fn console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_stdin_recognises_policies() {
        assert!(matches!(
            StdinSource::text("inherit"),
            StdinSource::Policy(StdioPolicy::Inherit)
        ));
        assert!(matches!(
            StdinSource::text("ignore"),
            StdinSource::Policy(StdioPolicy::Ignore)
        ));
        match StdinSource::text("y\n") {
            StdinSource::Static(bytes) => assert_eq!(bytes, b"y\n"),
            other => panic!("expected static payload, got {other:?}"),
        }
    }

    #[test]
    fn numeric_stdin_is_formatted() {
        match StdinSource::number(42) {
            StdinSource::Static(bytes) => assert_eq!(bytes, b"42"),
            other => panic!("expected static payload, got {other:?}"),
        }
    }

    #[test]
    fn mode_forwarding_table() {
        assert!(Mode::ForwardBoth.forwards_out() && Mode::ForwardBoth.forwards_err());
        assert!(Mode::ForwardOut.forwards_out() && !Mode::ForwardOut.forwards_err());
        assert!(!Mode::ForwardErr.forwards_out() && Mode::ForwardErr.forwards_err());
        assert!(!Mode::Manual.forwards_out() && !Mode::Manual.forwards_err());
    }

    #[test]
    fn producer_is_shared_between_clones() {
        let mut n = 0;
        let producer = Producer::new(move || {
            n += 1;
            Some(format!("{n}"))
        });
        let other = producer.clone();
        assert!(matches!(producer.call().unwrap(), Produced::Ready(Some(b)) if b == b"1"));
        assert!(matches!(other.call().unwrap(), Produced::Ready(Some(b)) if b == b"2"));
    }

    #[test]
    fn console_capture_collects_writes() {
        let (console, captured) = Console::capture();
        console.write(b"hello ").unwrap();
        console.write(b"world").unwrap();
        assert_eq!(captured.text(), "hello world");
    }
}
