//! Server handle: owns a language server child process and its JSON-RPC plumbing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::{Value, json};
use tether_types::{ENV_SECRET_DENYLIST, SymbolInfo};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{self, Notification, PublishDiagnosticsParams, Request};
use crate::symbols::flatten_symbols;
use crate::types::{LspEvent, ServerConfig, ServerStopReason};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const WRITER_CHANNEL_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

enum IncomingFrame {
    Response { id: u64, body: Value },
    ServerRequest { id: Value, method: String },
    Notification { method: String, params: Option<Value> },
}

fn parse_incoming(frame: &Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame.get("method").and_then(Value::as_str).map(String::from);
    let is_response = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, is_response) {
        (Some(id), None, true) => Some(IncomingFrame::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id.clone(),
            method,
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Case-insensitive matcher over [`ENV_SECRET_DENYLIST`].
fn secret_env_matcher() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ENV_SECRET_DENYLIST {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid env denylist pattern {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("building env denylist")
}

pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

pub(crate) struct RunningServer {
    name: String,
    language_id: String,
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: u64,
    pending: PendingMap,
    /// URIs we have sent `didOpen` for; later updates go out as `didChange`.
    opened_docs: HashSet<String>,
    doc_versions: HashMap<String, i32>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningServer")
            .field("name", &self.name)
            .field("language_id", &self.language_id)
            .field("open_documents", &self.opened_docs.len())
            .finish_non_exhaustive()
    }
}

impl RunningServer {
    /// Spawn the server and complete the initialize handshake.
    pub async fn start(
        name: String,
        config: &ServerConfig,
        workspace_root: &Path,
        event_tx: mpsc::Sender<LspEvent>,
    ) -> Result<Self> {
        let resolved = which::which(&config.command)
            .with_context(|| format!("{} not found in PATH", config.command))?;
        let mut cmd = Command::new(&resolved);
        cmd.args(&config.args)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let secrets = secret_env_matcher()?;
        for (key, _) in std::env::vars_os() {
            if secrets.is_match(&key) {
                cmd.env_remove(&key);
            }
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", config.command))?;
        let stdout = child.stdout.take().context("no stdout from child")?;
        let stdin = child.stdin.take().context("no stdin from child")?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_name = name.clone();
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!(server = %writer_name, "LSP write error: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader_writer_tx = writer_tx.clone();
        let reader_name = name.clone();
        let reader_root = normalize_path(workspace_root);
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            let reason = loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            &frame,
                            &reader_pending,
                            &event_tx,
                            &reader_writer_tx,
                            &reader_name,
                            &reader_root,
                        )
                        .await;
                    }
                    Ok(None) => break ServerStopReason::Exited,
                    Err(e) => break ServerStopReason::Failed(format!("{e:#}")),
                }
            };
            // Wake any request still waiting on this server.
            reader_pending.lock().await.clear();
            let _ = event_tx
                .send(LspEvent::ServerStopped {
                    server: reader_name,
                    reason,
                })
                .await;
        });

        let mut handle = Self {
            name,
            language_id: config.language_id.clone(),
            child,
            writer_tx,
            next_id: 1,
            pending,
            opened_docs: HashSet::new(),
            doc_versions: HashMap::new(),
            reader_handle,
            writer_handle,
        };
        handle.initialize(workspace_root).await?;
        Ok(handle)
    }

    async fn dispatch_frame(
        frame: &Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<Value>>>,
        event_tx: &mpsc::Sender<LspEvent>,
        writer_tx: &mpsc::Sender<WriterCommand>,
        server_name: &str,
        workspace_root: &Path,
    ) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!("Ignoring malformed JSON-RPC frame from '{server_name}'");
            return;
        };

        match incoming {
            IncomingFrame::Response { id, body } => {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(body);
                }
            }
            IncomingFrame::ServerRequest { id, method } => {
                // Servers block on unanswered requests such as
                // client/registerCapability, so every one gets a reply.
                tracing::debug!("LSP '{server_name}' sent request {method}; replying method not found");
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("Method not found: {method}") }
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            IncomingFrame::Notification { method, params } => {
                if method != "textDocument/publishDiagnostics" {
                    tracing::trace!("Ignoring notification from '{server_name}': {method}");
                    return;
                }
                let Some(params) = params else { return };
                let params = match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!("Bad publishDiagnostics from '{server_name}': {e}");
                        return;
                    }
                };
                let Some(path) = protocol::file_uri_to_path(&params.uri) else {
                    return;
                };
                let path = normalize_path(&path);
                if !path.starts_with(workspace_root) {
                    tracing::warn!(
                        "LSP '{server_name}' reported diagnostics outside workspace: {}",
                        path.display()
                    );
                    return;
                }
                let items = params
                    .diagnostics
                    .iter()
                    .map(protocol::LspDiagnostic::to_server_diagnostic)
                    .collect();
                let _ = event_tx.send(LspEvent::Diagnostics { path, items }).await;
            }
        }
    }

    async fn initialize(&mut self, workspace_root: &Path) -> Result<()> {
        let root_uri = protocol::path_to_file_uri(workspace_root)
            .context("converting workspace root to URI")?;
        self.send_request("initialize", Some(protocol::initialize_params(root_uri.as_str())))
            .await
            .context("LSP initialize failed")?;
        self.send_notification("initialized", Some(json!({})))
            .await
    }

    /// Send a request and wait for its `result`. Error responses become `Err`.
    async fn send_request(&mut self, method: &'static str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))
            .context("serializing request")?;
        if self.writer_tx.send(WriterCommand::Send(frame)).await.is_err() {
            self.pending.lock().await.remove(&id);
            bail!("writer channel closed");
        }

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                bail!("server '{}' went away during {method}", self.name);
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("{method} timed out after {}s", REQUEST_TIMEOUT.as_secs());
            }
        };

        if let Some(message) = protocol::response_error(&response) {
            bail!("{method} failed: {message}");
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn send_notification(&self, method: &'static str, params: Option<Value>) -> Result<()> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .context("serializing notification")?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| anyhow::anyhow!("writer channel closed"))
    }

    /// Push new document content: `didOpen` the first time, `didChange` after.
    pub async fn notify_file_changed(&mut self, uri: &str, text: &str) -> Result<()> {
        if self.opened_docs.contains(uri) {
            let version = self.doc_versions.entry(uri.to_string()).or_insert(0);
            *version += 1;
            let params = protocol::did_change_params(uri, *version, text);
            self.send_notification("textDocument/didChange", Some(params))
                .await
        } else {
            self.doc_versions.insert(uri.to_string(), 1);
            self.opened_docs.insert(uri.to_string());
            let params = protocol::did_open_params(uri, &self.language_id, 1, text);
            self.send_notification("textDocument/didOpen", Some(params))
                .await
        }
    }

    #[must_use]
    pub fn is_open(&self, uri: &str) -> bool {
        self.opened_docs.contains(uri)
    }

    pub async fn document_symbols(&mut self, uri: &str) -> Result<Vec<SymbolInfo>> {
        let result = self
            .send_request(
                "textDocument/documentSymbol",
                Some(protocol::document_symbol_params(uri)),
            )
            .await?;
        Ok(flatten_symbols(&result))
    }

    pub async fn workspace_symbols(&mut self, query: &str) -> Result<Vec<SymbolInfo>> {
        let result = self
            .send_request(
                "workspace/symbol",
                Some(protocol::workspace_symbol_params(query)),
            )
            .await?;
        Ok(flatten_symbols(&result))
    }

    /// Graceful shutdown, escalating to kill after a short grace period.
    pub async fn shutdown(mut self) {
        if self.send_request("shutdown", None).await.is_ok() {
            let _ = self.send_notification("exit", None).await;
        }
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait())
            .await
            .is_err()
        {
            tracing::debug!("LSP '{}' didn't exit in time, killing", self.name);
            let _ = self.child.kill().await;
        }
    }
}
