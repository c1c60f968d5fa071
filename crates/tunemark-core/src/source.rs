//! Audio stream sources and cancellation
//!
//! A [`StreamSource`] yields raw PCM bytes (s16le, mono, 44100 Hz) in
//! whatever read sizes it likes. Cancellation flows the other way through a
//! [`CancelHandle`] / [`CancelToken`] pair.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::{Error, Result};

/// Read size for process-backed sources
pub const COMMAND_READ_SIZE: usize = 64 * 1024;

/// A producer of raw PCM bytes
#[async_trait]
pub trait StreamSource: Send {
    /// Next block of bytes, `None` once the stream has ended cleanly
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Stop producing and release resources, waiting at most `grace`
    async fn cancel(&mut self, grace: Duration) -> Result<()>;
}

/// Create a linked cancellation handle and token
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Caller side of a cancellation pair
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Worker side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// Pends forever if the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Stream source reading the stdout of a child process.
///
/// Typical use is a downloader piped into a demuxer that emits
/// `s16le` mono 44100 Hz PCM.
pub struct CommandSource {
    program: String,
    child: Child,
    stdout: ChildStdout,
    finished: bool,
}

impl CommandSource {
    /// Spawn `program` with `args`
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Stream(format!("failed to start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout was not captured".into()))?;

        info!(program, pid = ?child.id(), "Stream process started");

        Ok(Self {
            program: program.to_string(),
            child,
            stdout,
            finished: false,
        })
    }

    /// Process IO failures count as the stream failing
    fn stream_error(&self, action: &str, err: std::io::Error) -> Error {
        Error::Stream(format!("{} {}: {}", action, self.program, err))
    }
}

#[async_trait]
impl StreamSource for CommandSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; COMMAND_READ_SIZE];
        let n = self
            .stdout
            .read(&mut buf)
            .await
            .map_err(|e| self.stream_error("reading output of", e))?;

        if n == 0 {
            self.finished = true;
            let status = match self.child.wait().await {
                Ok(status) => status,
                Err(e) => return Err(self.stream_error("waiting for", e)),
            };
            if !status.success() {
                return Err(Error::Stream(format!("{} exited with {}", self.program, status)));
            }
            debug!(program = %self.program, "Stream process finished");
            return Ok(None);
        }

        buf.truncate(n);
        trace!(bytes = n, "Read from stream process");
        Ok(Some(Bytes::from(buf)))
    }

    async fn cancel(&mut self, grace: Duration) -> Result<()> {
        self.finished = true;
        if let Err(e) = self.child.start_kill() {
            // Already exited
            debug!(error = %e, "Kill skipped");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|e| self.stream_error("waiting for", e))?;
                debug!(?status, "Stream process stopped");
                Ok(())
            }
            Err(_) => {
                warn!(program = %self.program, "Stream process ignored kill");
                Err(Error::StreamTimeout {
                    waited_ms: grace.as_millis() as u64,
                })
            }
        }
    }
}

#[derive(Debug, Default)]
struct StatsState {
    delivered: AtomicUsize,
    cancelled: AtomicBool,
}

/// Observes a [`MemorySource`] after it has been handed away
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    state: Arc<StatsState>,
}

impl SourceStats {
    /// Chunks delivered so far
    pub fn delivered(&self) -> usize {
        self.state.delivered.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// In-memory stream source for tests and demos
#[derive(Debug)]
pub struct MemorySource {
    chunks: VecDeque<Bytes>,
    failure: Option<(usize, String)>,
    delay: Option<Duration>,
    stats: SourceStats,
}

impl MemorySource {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks: chunks.into(),
            failure: None,
            delay: None,
            stats: SourceStats::default(),
        }
    }

    /// Split a byte buffer into reads of `read_size` bytes
    pub fn from_bytes(data: &[u8], read_size: usize) -> Self {
        let chunks = data
            .chunks(read_size.max(1))
            .map(Bytes::copy_from_slice)
            .collect();
        Self::new(chunks)
    }

    /// Fail with a stream error once `after` chunks have been delivered
    pub fn with_failure_after(mut self, after: usize, message: impl Into<String>) -> Self {
        self.failure = Some((after, message.into()));
        self
    }

    /// Sleep before every read
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[async_trait]
impl StreamSource for MemorySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.stats.was_cancelled() {
            return Ok(None);
        }

        let delivered = self.stats.delivered();
        if let Some((after, message)) = &self.failure {
            if delivered >= *after {
                return Err(Error::Stream(message.clone()));
            }
        }

        let chunk = self.chunks.pop_front();
        if chunk.is_some() {
            self.stats.state.delivered.fetch_add(1, Ordering::SeqCst);
        }
        Ok(chunk)
    }

    async fn cancel(&mut self, _grace: Duration) -> Result<()> {
        self.stats.state.cancelled.store(true, Ordering::SeqCst);
        self.chunks.clear();
        Ok(())
    }
}
