//! Stdio transport for tool-provider communication.
//!
//! Talks newline-delimited JSON-RPC over a child process's stdin/stdout.
//! A background reader correlates responses to pending requests by id, and a
//! second task drains the child's stderr into a bounded buffer.

use crate::buffer::LineBuffer;
use crate::config::{ProviderConfig, ShutdownTimeouts, TransportKind};
use crate::error::McpError;
use crate::jsonrpc::{self, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Outcome = Result<serde_json::Value, JsonRpcError>;

/// A request that has been written and is awaiting its response.
struct PendingRequest {
    created_at: Instant,
    completion: oneshot::Sender<Outcome>,
}

/// Never held across an await, so a plain mutex that `Drop` can take.
type PendingMap = Arc<std::sync::Mutex<HashMap<u64, PendingRequest>>>;

fn lock_pending(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<u64, PendingRequest>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's pending entry when the waiting caller goes away,
/// whether it finished, timed out, or was dropped mid-flight.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// The write side of the pipe and the id counter, guarded together so ids
/// are allocated in the same order frames hit the wire.
struct PipeWriter {
    stdin: Option<ChildStdin>,
    next_id: u64,
}

impl PipeWriter {
    async fn write_frame(&mut self, frame: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed")
        })?;
        stdin.write_all(frame.as_bytes()).await?;
        stdin.flush().await
    }
}

/// Spawn a `stdio` provider process with all three standard streams piped.
pub fn spawn_provider_process(name: &str, config: &ProviderConfig) -> Result<Child, McpError> {
    if config.kind != TransportKind::Stdio {
        return Err(McpError::InvalidConfig {
            name: name.to_string(),
            message: "only stdio providers run as a local process".to_string(),
        });
    }
    let command = config
        .command
        .as_deref()
        .ok_or_else(|| McpError::InvalidConfig {
            name: name.to_string(),
            message: "stdio provider requires a 'command'".to_string(),
        })?;

    let mut cmd = Command::new(command);
    cmd.args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(|e| McpError::SpawnFailed {
        name: name.to_string(),
        source: e,
    })
}

/// Async stdio transport for communicating with a provider process.
pub struct StdioTransport {
    name: String,
    writer: Mutex<PipeWriter>,
    pending: PendingMap,
    stderr: Arc<LineBuffer>,
    cancel: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
    request_timeout: Duration,
    shutdown: ShutdownTimeouts,
}

impl StdioTransport {
    /// Take over an already-spawned child and start the background reader
    /// (and stderr drainer, if stderr was piped).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        name: &str,
        mut child: Child,
        request_timeout: Duration,
        shutdown: ShutdownTimeouts,
    ) -> Result<Self, McpError> {
        let stdin = child.stdin.take().ok_or_else(|| McpError::InvalidConfig {
            name: name.to_string(),
            message: "provider process stdin was not piped".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::InvalidConfig {
            name: name.to_string(),
            message: "provider process stdout was not piped".to_string(),
        })?;

        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let stderr_buf = Arc::new(LineBuffer::default());
        let cancel = CancellationToken::new();

        let mut tasks = vec![tokio::spawn(read_responses(
            name.to_string(),
            stdout,
            Arc::clone(&pending),
            cancel.clone(),
        ))];

        match child.stderr.take() {
            Some(stderr) => tasks.push(tokio::spawn(drain_stderr(
                name.to_string(),
                stderr,
                Arc::clone(&stderr_buf),
                cancel.clone(),
            ))),
            None => tracing::debug!("Provider '{name}' stderr not piped; nothing to capture"),
        }

        Ok(Self {
            name: name.to_string(),
            writer: Mutex::new(PipeWriter {
                stdin: Some(stdin),
                next_id: 1,
            }),
            pending,
            stderr: stderr_buf,
            cancel,
            tasks: std::sync::Mutex::new(tasks),
            child: Mutex::new(Some(child)),
            closed: AtomicBool::new(false),
            request_timeout,
            shutdown,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a JSON-RPC request and wait for its response.
    ///
    /// A timeout removes only this request's pending entry; the transport and
    /// any other in-flight requests stay valid. Dropping the returned future
    /// before it resolves removes the entry too.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        if self.is_closed() {
            return Err(McpError::Closed {
                name: self.name.clone(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let _guard = {
            let mut writer = self.writer.lock().await;
            let id = writer.next_id;
            writer.next_id += 1;

            let line = jsonrpc::frame(&JsonRpcRequest::new(id, method, params))?;
            lock_pending(&self.pending).insert(
                id,
                PendingRequest {
                    created_at: Instant::now(),
                    completion: tx,
                },
            );
            let guard = PendingGuard {
                pending: &self.pending,
                id,
            };

            tracing::debug!("-> {} [{id}] {}", self.name, line.trim_end());
            writer
                .write_frame(&line)
                .await
                .map_err(|e| McpError::transport(&self.name, e))?;
            guard
        };

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(err))) => Err(McpError::JsonRpc {
                server: self.name.clone(),
                code: err.code,
                message: err.message,
            }),
            Ok(Err(_)) => Err(McpError::Closed {
                name: self.name.clone(),
            }),
            Err(_) => Err(McpError::Timeout {
                name: self.name.clone(),
                method: method.to_string(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    /// Send a JSON-RPC notification (fire-and-forget, no response expected).
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::Closed {
                name: self.name.clone(),
            });
        }

        let line = jsonrpc::frame(&JsonRpcNotification::new(method, params))?;
        let mut writer = self.writer.lock().await;
        tracing::debug!("-> {} {}", self.name, line.trim_end());
        writer
            .write_frame(&line)
            .await
            .map_err(|e| McpError::transport(&self.name, e))
    }

    /// Drain and return captured stderr lines (non-blocking).
    pub fn stderr_messages(&self) -> Vec<String> {
        self.stderr.drain()
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Shut down the transport: stop the background tasks, close stdin, wait
    /// for the process to exit, then kill it if it does not.
    ///
    /// Idempotent and bounded by the graceful and kill waits.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("Background task for '{}' failed: {e}", self.name);
                }
            }
        }

        // Dropping the senders fails every in-flight request with `Closed`.
        let abandoned = std::mem::take(&mut *lock_pending(&self.pending));
        for (id, request) in abandoned {
            tracing::debug!(
                "Abandoning request {id} to '{}' after {:?}",
                self.name,
                request.created_at.elapsed()
            );
        }

        // A writer stuck on a full pipe still holds the lock; the kill below
        // takes care of that case.
        match self.writer.try_lock() {
            Ok(mut writer) => {
                if let Some(mut stdin) = writer.stdin.take() {
                    let _ = stdin.shutdown().await;
                }
            }
            Err(_) => tracing::debug!("Writer for '{}' busy; skipping stdin close", self.name),
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(self.shutdown.graceful, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Provider '{}' exited with {status}", self.name);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for provider '{}': {e}", self.name);
            }
            Err(_) => {
                tracing::warn!(
                    "Provider '{}' did not exit within {:?}, killing it",
                    self.name,
                    self.shutdown.graceful
                );
                if let Err(e) = child.start_kill() {
                    tracing::warn!("Failed to kill provider '{}': {e}", self.name);
                }
                if tokio::time::timeout(self.shutdown.kill_wait, child.wait())
                    .await
                    .is_err()
                {
                    tracing::warn!("Provider '{}' still running after kill", self.name);
                }
            }
        }
    }
}

/// Read one raw line (lossily decoded), or `None` at end of stream.
async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf).trim_end().to_string()))
}

/// Reader task: parse each stdout line and resolve the matching request.
async fn read_responses<R: AsyncRead + Unpin>(
    name: String,
    stdout: R,
    pending: PendingMap,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Reader for '{name}' cancelled");
                break;
            }
            line = next_line(&mut reader, &mut buf) => line,
        };
        match line {
            Ok(Some(line)) => dispatch_line(&name, &line, &pending),
            Ok(None) => {
                tracing::info!("Provider '{name}' closed stdout");
                break;
            }
            Err(e) => {
                tracing::warn!("Error reading from provider '{name}': {e}");
                break;
            }
        }
    }
}

fn dispatch_line(name: &str, line: &str, pending: &PendingMap) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    tracing::debug!("<- {name} {line}");

    let message: JsonRpcMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Failed to parse message from '{name}': {e}: {line}");
            return;
        }
    };

    let Some(id) = message.response_id() else {
        tracing::debug!(
            "Notification from '{name}': {}",
            message.method.as_deref().unwrap_or("<no method>")
        );
        return;
    };

    let request = lock_pending(pending).remove(&id);
    match request {
        Some(request) => {
            // The receiver may have just timed out; nothing to do then.
            let _ = request.completion.send(message.into_outcome());
        }
        None => tracing::warn!("Discarding response from '{name}' for unknown id {id}"),
    }
}

/// Stderr task: capture each line into the bounded buffer.
async fn drain_stderr<R: AsyncRead + Unpin>(
    name: String,
    stderr: R,
    buffer: Arc<LineBuffer>,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = next_line(&mut reader, &mut buf) => line,
        };
        match line {
            Ok(Some(line)) => {
                tracing::debug!("[{name} stderr] {line}");
                if buffer.push(line) {
                    tracing::trace!("Stderr buffer for '{name}' full; dropped oldest line");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Error reading stderr of provider '{name}': {e}");
                break;
            }
        }
    }
}
