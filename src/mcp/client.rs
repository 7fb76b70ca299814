//! Async MCP client for a tool server speaking NDJSON over stdio.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{McpError, McpResult};
use super::protocol::{
    codes, methods, CallToolParams, CallToolResult, Implementation, Incoming, InitializeParams,
    InitializeResult, ListToolsParams, ListToolsResult, MessageError, NotificationEnvelope,
    RequestEnvelope, ResponseEnvelope, RpcErrorObject, ToolDescriptor, PROTOCOL_VERSION,
};

/// Default timeout for requests (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default wait between closing the server's stdin and killing it.
const DEFAULT_GRACE_SECS: u64 = 5;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// `None` once the session has closed the server's input.
type SharedWriter = Arc<Mutex<Option<BufWriter<BoxedWriter>>>>;

// ============================================================================
// Session state
// ============================================================================

/// Lifecycle of a client session.
///
/// `Uninitialized → Initializing → Ready → Closed`. Calls are only accepted
/// in `Ready`, and any number of them may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Closed = 3,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Uninitialized,
            1 => SessionState::Initializing,
            2 => SessionState::Ready,
            _ => SessionState::Closed,
        }
    }
}

// ============================================================================
// Launch configuration
// ============================================================================

/// How to start the tool server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Tunables for a client session.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline applied to calls that do not supply their own.
    pub request_timeout: Duration,
    /// How long `close` waits for a graceful exit before killing the server.
    pub shutdown_grace: Duration,
    /// Identity sent in the handshake.
    pub client_info: Implementation,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

enum Launch {
    Spawn(ServerCommand),
    Streams {
        reader: BoxedReader,
        writer: BoxedWriter,
    },
}

// ============================================================================
// Pending requests
// ============================================================================

/// Correlation table from request id to the waiting caller.
#[derive(Default)]
struct PendingRequests {
    slots: HashMap<u64, oneshot::Sender<McpResult<Value>>>,
    /// Set once the read loop has stopped; new requests fail immediately.
    closed: Option<String>,
}

impl PendingRequests {
    fn register(&mut self, id: u64) -> McpResult<oneshot::Receiver<McpResult<Value>>> {
        if let Some(reason) = &self.closed {
            return Err(McpError::connection(reason.clone()));
        }
        let (tx, rx) = oneshot::channel();
        self.slots.insert(id, tx);
        Ok(rx)
    }

    /// Hand an outcome to the caller waiting on `id`. Returns false when no
    /// caller is waiting (unknown id, or the caller gave up).
    fn resolve(&mut self, id: u64, outcome: McpResult<Value>) -> bool {
        match self.slots.remove(&id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    fn abandon(&mut self, id: u64) {
        self.slots.remove(&id);
    }

    fn fail_all(&mut self, reason: &str) {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }
        for (_, tx) in self.slots.drain() {
            let _ = tx.send(Err(McpError::connection(reason)));
        }
    }
}

struct Connection {
    writer: SharedWriter,
    pending: Arc<Mutex<PendingRequests>>,
    reader_task: JoinHandle<()>,
}

// ============================================================================
// Client
// ============================================================================

/// Async client for one MCP tool server.
///
/// The server is started lazily by [`initialize`](Self::initialize). A single
/// background task reads responses and resolves the caller whose id matches,
/// so concurrent calls may complete in any order.
///
/// # Example
///
/// ```ignore
/// use pbimeta::mcp::{ClientOptions, McpClient, ServerCommand};
///
/// let client = McpClient::spawn(
///     ServerCommand::new("python").arg("pbixray_server.py"),
///     ClientOptions::default(),
/// );
/// let tools = client
///     .scoped(|c| Box::pin(async move { c.list_tools().await }))
///     .await?;
/// ```
pub struct McpClient {
    state: AtomicU8,
    options: ClientOptions,
    launch: Mutex<Option<Launch>>,
    connection: OnceCell<Connection>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    server_info: OnceCell<InitializeResult>,
    transport: String,
}

impl McpClient {
    /// Create a client that will spawn `command` on initialize.
    pub fn spawn(command: ServerCommand, options: ClientOptions) -> Self {
        let transport = command.to_string();
        Self::with_launch(Launch::Spawn(command), options, transport)
    }

    /// Create a client over already-connected streams.
    pub fn from_streams<R, W>(reader: R, writer: W, options: ClientOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let launch = Launch::Streams {
            reader: Box::new(reader),
            writer: Box::new(writer),
        };
        Self::with_launch(launch, options, "<streams>".to_string())
    }

    fn with_launch(launch: Launch, options: ClientOptions, transport: String) -> Self {
        Self {
            state: AtomicU8::new(SessionState::Uninitialized as u8),
            options,
            launch: Mutex::new(Some(launch)),
            connection: OnceCell::new(),
            child: Mutex::new(None),
            next_id: AtomicU64::new(1),
            server_info: OnceCell::new(),
            transport,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.get()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Check whether the read loop is still running.
    pub fn is_alive(&self) -> bool {
        self.connection
            .get()
            .is_some_and(|c| !c.reader_task.is_finished())
    }

    /// Start the server and perform the handshake.
    ///
    /// On failure the session is closed and cannot be reused.
    pub async fn initialize(&self) -> McpResult<&InitializeResult> {
        self.transition(SessionState::Uninitialized, SessionState::Initializing)?;
        debug!(transport = %self.transport, "initializing tool server session");

        if let Err(err) = self.handshake().await {
            self.close().await;
            return Err(match err {
                McpError::Protocol(message) | McpError::Tool { message, .. } => {
                    McpError::connection(format!("handshake failed: {message}"))
                }
                other => other,
            });
        }

        self.transition(SessionState::Initializing, SessionState::Ready)?;
        let info = self
            .server_info
            .get()
            .ok_or_else(|| McpError::connection("handshake produced no server info"))?;
        info!(
            server = %info.server_info.name,
            version = %info.server_info.version,
            protocol = %info.protocol_version,
            "tool server ready"
        );
        Ok(info)
    }

    async fn handshake(&self) -> McpResult<()> {
        let (reader, writer) = self.open().await?;

        let writer: SharedWriter = Arc::new(Mutex::new(Some(BufWriter::new(writer))));
        let pending = Arc::new(Mutex::new(PendingRequests::default()));
        let reader_task = spawn_reader_task(reader, pending.clone(), writer.clone());
        self.connection
            .set(Connection {
                writer,
                pending,
                reader_task,
            })
            .map_err(|_| McpError::connection("session already connected"))?;

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: self.options.client_info.clone(),
        };
        let result = self
            .send_request(methods::INITIALIZE, params, self.options.request_timeout)
            .await?;
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("invalid initialize result: {e}")))?;
        if result.protocol_version.is_empty() {
            return Err(McpError::protocol("server reported an empty protocol version"));
        }
        if result.protocol_version != PROTOCOL_VERSION {
            debug!(
                requested = PROTOCOL_VERSION,
                negotiated = %result.protocol_version,
                "server negotiated a different protocol version"
            );
        }

        self.notify(methods::INITIALIZED).await?;
        let _ = self.server_info.set(result);
        Ok(())
    }

    async fn open(&self) -> McpResult<(BoxedReader, BoxedWriter)> {
        let launch = self
            .launch
            .lock()
            .await
            .take()
            .ok_or_else(|| McpError::connection("transport already consumed"))?;

        match launch {
            Launch::Streams { reader, writer } => Ok((reader, writer)),
            Launch::Spawn(command) => {
                let mut child = command.to_command().spawn().map_err(|source| McpError::Spawn {
                    command: command.to_string(),
                    source,
                })?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| McpError::connection("server stdin not captured"))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| McpError::connection("server stdout not captured"))?;
                debug!(pid = ?child.id(), command = %command, "spawned tool server");
                *self.child.lock().await = Some(child);
                Ok((Box::new(stdout), Box::new(stdin)))
            }
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> McpResult<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| McpError::InvalidState {
                expected: from,
                actual: SessionState::from(actual),
            })
    }

    fn ensure_ready(&self) -> McpResult<&Connection> {
        let actual = self.state();
        if actual != SessionState::Ready {
            return Err(McpError::InvalidState {
                expected: SessionState::Ready,
                actual,
            });
        }
        self.connection.get().ok_or(McpError::InvalidState {
            expected: SessionState::Ready,
            actual,
        })
    }

    /// Send a request and wait for its response, using the default timeout.
    pub async fn request<P, R>(&self, method: &str, params: P) -> McpResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_with_timeout(method, params, self.options.request_timeout)
            .await
    }

    /// Send a request and wait at most `timeout` for its response.
    ///
    /// On timeout the request's slot is freed and a late answer is dropped by
    /// the read loop; the server keeps running.
    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> McpResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.ensure_ready()?;
        let result = self.send_request(method, params, timeout).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("unexpected result for '{method}': {e}")))
    }

    async fn send_request<P: Serialize>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> McpResult<Value> {
        let connection = self.connection.get().ok_or(McpError::InvalidState {
            expected: SessionState::Ready,
            actual: self.state(),
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let params = serde_json::to_value(params).map_err(McpError::Serialize)?;
        let line = serde_json::to_string(&RequestEnvelope::new(id, method, params))
            .map_err(McpError::Serialize)?;

        let rx = connection.pending.lock().await.register(id)?;
        if let Err(err) = write_line(&connection.writer, &line).await {
            connection.pending.lock().await.abandon(id);
            return Err(err);
        }
        debug!(id, method, "sent request");

        match tokio::time::timeout(timeout, rx).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                connection.pending.lock().await.abandon(id);
                debug!(id, method, ?timeout, "request abandoned after timeout");
                Err(McpError::Timeout {
                    method: method.to_string(),
                    after: timeout,
                })
            }
        }
    }

    async fn notify(&self, method: &str) -> McpResult<()> {
        let connection = self
            .connection
            .get()
            .ok_or_else(|| McpError::connection("not connected"))?;
        let line = serde_json::to_string(&NotificationEnvelope::new(method))
            .map_err(McpError::Serialize)?;
        write_line(&connection.writer, &line).await
    }

    /// List every tool the server advertises, following pagination.
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor = None;

        loop {
            let page: ListToolsResult = self
                .request(methods::LIST_TOOLS, ListToolsParams { cursor })
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.clone()) {
                        return Err(McpError::protocol(format!(
                            "tools/list repeated cursor '{next}'"
                        )));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Invoke a tool with the default timeout.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        self.call_tool_with_timeout(name, arguments, self.options.request_timeout)
            .await
    }

    /// Invoke a tool, giving up after `timeout`.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> McpResult<CallToolResult> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result: CallToolResult = self
            .request_with_timeout(methods::CALL_TOOL, CallToolParams { name, arguments }, timeout)
            .await?;

        if result.is_error {
            let message = result.joined_text();
            return Err(McpError::tool(
                None,
                if message.is_empty() {
                    format!("tool '{name}' reported an error")
                } else {
                    message
                },
            ));
        }
        Ok(result)
    }

    /// Shut the session down.
    ///
    /// Closes the server's stdin, waits up to the grace period for it to
    /// exit, then kills it. Every pending call fails with a connection error.
    /// Calling `close` more than once is a no-op.
    pub async fn close(&self) {
        let previous = SessionState::from(
            self.state
                .swap(SessionState::Closed as u8, Ordering::SeqCst),
        );
        if previous == SessionState::Closed {
            return;
        }

        let grace = self.options.shutdown_grace;
        if let Some(connection) = self.connection.get() {
            // Dropping the writer closes the server's stdin.
            let shutdown = async {
                match connection.writer.lock().await.take() {
                    Some(mut writer) => writer.shutdown().await,
                    None => Ok(()),
                }
            };
            match tokio::time::timeout(grace, shutdown).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "failed to close server input"),
                Err(_) => debug!("timed out closing server input"),
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "tool server exited"),
                Ok(Err(e)) => warn!(error = %e, "failed to wait for tool server"),
                Err(_) => {
                    warn!(?grace, "tool server did not exit in time, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill tool server");
                    }
                }
            }
        }

        if let Some(connection) = self.connection.get() {
            connection.reader_task.abort();
            connection.pending.lock().await.fail_all("session closed");
        }
        info!(transport = %self.transport, "tool server session closed");
    }

    /// Initialize, run `f`, and close on every exit path.
    pub async fn scoped<T, E, F>(self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c McpClient) -> BoxFuture<'c, Result<T, E>>,
        E: From<McpError>,
    {
        let outcome = match self.initialize().await {
            Ok(_) => f(&self).await,
            Err(err) => Err(E::from(err)),
        };
        self.close().await;
        outcome
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get() {
            connection.reader_task.abort();
        }
    }
}

// ============================================================================
// Read loop
// ============================================================================

fn spawn_reader_task(
    reader: BoxedReader,
    pending: Arc<Mutex<PendingRequests>>,
    writer: SharedWriter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();

        let reason = loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        dispatch(line, &pending, &writer).await;
                    }
                }
                Ok(None) => break "tool server closed its output stream".to_string(),
                Err(e) => break format!("failed to read from tool server: {e}"),
            }
        };

        debug!(%reason, "read loop stopped");
        pending.lock().await.fail_all(&reason);
    })
}

async fn dispatch(line: &str, pending: &Mutex<PendingRequests>, writer: &SharedWriter) {
    match Incoming::parse(line) {
        Ok(Incoming::Response { id, outcome }) => {
            let outcome = outcome.map_err(|e| McpError::tool(Some(e.code), e.message));
            if !pending.lock().await.resolve(id, outcome) {
                debug!(id, "discarding response with no waiting caller");
            }
        }
        Ok(Incoming::Request { id, method, .. }) => {
            let response = if method == methods::PING {
                ResponseEnvelope::success(id, json!({}))
            } else {
                debug!(%method, "rejecting unsupported server request");
                ResponseEnvelope::failure(
                    id,
                    RpcErrorObject {
                        code: codes::METHOD_NOT_FOUND,
                        message: format!("method not found: {method}"),
                        data: None,
                    },
                )
            };
            let sent = match serde_json::to_string(&response) {
                Ok(line) => write_line(writer, &line).await,
                Err(e) => Err(McpError::Serialize(e)),
            };
            if let Err(e) = sent {
                warn!(error = %e, "failed to answer server request");
            }
        }
        Ok(Incoming::Notification { method, params }) => {
            debug!(%method, %params, "server notification");
        }
        Err(MessageError::NotJson(e)) => {
            warn!(error = %e, line = %preview(line), "skipping malformed line");
        }
        Err(MessageError::Malformed {
            id: Some(id),
            reason,
        }) => {
            warn!(id, %reason, "malformed response");
            pending
                .lock()
                .await
                .resolve(id, Err(McpError::protocol(reason)));
        }
        Err(MessageError::Malformed { id: None, reason }) => {
            warn!(%reason, line = %preview(line), "skipping malformed message");
        }
    }
}

async fn write_line(writer: &SharedWriter, line: &str) -> McpResult<()> {
    let mut guard = writer.lock().await;
    let Some(writer) = guard.as_mut() else {
        return Err(McpError::connection("server input already closed"));
    };
    let result = async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
    .await;
    result.map_err(|e| McpError::connection(format!("failed to write to tool server: {e}")))
}

fn preview(line: &str) -> &str {
    const MAX: usize = 120;
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

// ============================================================================
// Tool-calling seam
// ============================================================================

/// Anything that can invoke a named tool. Implemented by [`McpClient`];
/// adapters are generic over it.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult>;
}

#[async_trait]
impl ToolCaller for McpClient {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        McpClient::call_tool(self, name, arguments).await
    }
}

#[async_trait]
impl<T: ToolCaller + ?Sized> ToolCaller for &T {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        (**self).call_tool(name, arguments).await
    }
}

#[async_trait]
impl<T: ToolCaller + ?Sized> ToolCaller for Arc<T> {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        (**self).call_tool(name, arguments).await
    }
}
