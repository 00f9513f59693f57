//! LspManager facade: the one type the tool layer talks to.
//!
//! Servers start lazily in the background the first time a file they handle is
//! touched. A server is "attached" once its initialize handshake has finished
//! and it sits in the `servers` map; callers poll [`LspManager::is_attached`]
//! rather than blocking on startup.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tether_types::SymbolInfo;
use tokio::sync::mpsc;

use crate::diagnostics::DiagnosticsStore;
use crate::protocol;
use crate::server::{RunningServer, normalize_path};
use crate::types::{LspConfig, LspEvent, ServerConfig, ServerDiagnostic, ServerStopReason};

/// Channel capacity for the event channel between server tasks and the manager.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events drained per poll; enough to absorb a burst of publishDiagnostics.
const EVENT_BUDGET: usize = 512;

/// Build extension → server name map from config.
fn build_extension_map(config: &LspConfig) -> HashMap<String, String> {
    let mut extension_map = HashMap::new();
    let mut server_names: Vec<&String> = config.servers.keys().collect();
    server_names.sort();
    for name in server_names {
        for ext in &config.servers[name].file_extensions {
            if let Some(existing) = extension_map.get(ext) {
                tracing::warn!(
                    "Multiple LSP servers configured for extension '{ext}': '{existing}' and '{name}'. Using '{existing}'."
                );
                continue;
            }
            extension_map.insert(ext.clone(), name.clone());
        }
    }
    extension_map
}

pub struct LspManager {
    configs: HashMap<String, ServerConfig>,
    workspace_root: PathBuf,
    servers: HashMap<String, RunningServer>,
    /// Startup in flight; the task reports back with `ServerReady` or `ServerStopped`.
    starting: HashSet<String>,
    /// Servers that failed or exited. They are not restarted.
    stopped: HashSet<String>,
    diagnostics: DiagnosticsStore,
    event_rx: mpsc::Receiver<LspEvent>,
    event_tx: mpsc::Sender<LspEvent>,
    /// Maps file extension (e.g. "rs") → server name (e.g. "rust").
    extension_map: HashMap<String, String>,
}

impl LspManager {
    /// Build the manager. No server is spawned until a matching file is touched.
    #[must_use]
    pub fn new(config: LspConfig, workspace_root: &Path) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let extension_map = build_extension_map(&config);
        Self {
            configs: config.servers,
            workspace_root: normalize_path(workspace_root),
            servers: HashMap::new(),
            starting: HashSet::new(),
            stopped: HashSet::new(),
            diagnostics: DiagnosticsStore::default(),
            event_rx,
            event_tx,
            extension_map,
        }
    }

    fn server_for(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.extension_map.get(ext).map(String::as_str)
    }

    /// Start the server for `path` in the background if it is not running yet.
    ///
    /// Must be called from within a Tokio runtime.
    fn ensure_started(&mut self, path: &Path) {
        let Some(name) = self.server_for(path).map(str::to_string) else {
            return;
        };
        if self.servers.contains_key(&name)
            || self.starting.contains(&name)
            || self.stopped.contains(&name)
        {
            return;
        }
        let Some(config) = self.configs.get(&name).cloned() else {
            return;
        };

        let file_dir = path.parent().unwrap_or(&self.workspace_root);
        let root = config.resolve_root(file_dir, &self.workspace_root);
        let tx = self.event_tx.clone();
        self.starting.insert(name.clone());
        tracing::info!("Starting LSP server '{name}' ({}) in {}", config.command, root.display());

        tokio::spawn(async move {
            let event = match RunningServer::start(name.clone(), &config, &root, tx.clone()).await {
                Ok(handle) => LspEvent::ServerReady {
                    server: name,
                    handle: Box::new(handle),
                },
                Err(e) => LspEvent::ServerStopped {
                    server: name,
                    reason: ServerStopReason::Failed(format!("{e:#}")),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    /// Drain pending events from server tasks, up to `budget`. Never blocks.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    fn handle_event(&mut self, event: LspEvent) {
        match event {
            LspEvent::ServerReady { server, handle } => {
                tracing::info!(server = %server, "LSP server ready");
                self.starting.remove(&server);
                self.servers.insert(server, *handle);
            }
            LspEvent::ServerStopped { server, reason } => {
                match &reason {
                    ServerStopReason::Exited => {
                        tracing::info!(server = %server, "LSP server exited");
                    }
                    ServerStopReason::Failed(msg) => {
                        tracing::warn!(server = %server, error = %msg, "LSP server failed");
                    }
                }
                self.starting.remove(&server);
                self.servers.remove(&server);
                self.stopped.insert(server);
            }
            LspEvent::Diagnostics { path, items } => {
                tracing::debug!(path = %path.display(), count = items.len(), "Diagnostics updated");
                self.diagnostics.update(path, items);
            }
        }
    }

    /// Whether a running server handles `path`. Kicks off startup if needed.
    pub fn is_attached(&mut self, path: &Path) -> bool {
        self.poll_events(EVENT_BUDGET);
        let path = normalize_path(path);
        self.ensure_started(&path);
        self.server_for(&path)
            .is_some_and(|name| self.servers.contains_key(name))
    }

    /// Send new content for `path` to its server, if one is running.
    pub async fn on_file_changed(&mut self, path: &Path, text: &str) {
        self.poll_events(EVENT_BUDGET);
        let path = normalize_path(path);
        self.ensure_started(&path);
        let Some(name) = self.server_for(&path).map(str::to_string) else {
            return;
        };
        let Some(server) = self.servers.get_mut(&name) else {
            return;
        };
        let uri = match protocol::path_to_file_uri(&path) {
            Ok(u) => u.to_string(),
            Err(e) => {
                tracing::warn!("Skipping LSP notification: {e}");
                return;
            }
        };
        if let Err(e) = server.notify_file_changed(&uri, text).await {
            tracing::warn!(
                "Failed to notify LSP server '{name}' about {}: {e:#}",
                path.display()
            );
        }
    }

    /// Latest diagnostics published for `path`, all severities.
    pub fn diagnostics_for(&mut self, path: &Path) -> Vec<ServerDiagnostic> {
        self.poll_events(EVENT_BUDGET);
        self.diagnostics.for_file(&normalize_path(path)).to_vec()
    }

    /// Latest error-severity diagnostics for `path`.
    pub fn errors_for_file(&mut self, path: &Path) -> Vec<ServerDiagnostic> {
        self.poll_events(EVENT_BUDGET);
        self.diagnostics.errors_for_file(&normalize_path(path))
    }

    /// Flattened document symbols. Opens the document first if the server
    /// has not seen it yet.
    pub async fn document_symbols(&mut self, path: &Path) -> Result<Vec<SymbolInfo>> {
        self.poll_events(EVENT_BUDGET);
        let path = normalize_path(path);
        let name = self
            .server_for(&path)
            .map(str::to_string)
            .with_context(|| format!("no language server configured for {}", path.display()))?;
        let server = self
            .servers
            .get_mut(&name)
            .with_context(|| format!("language server '{name}' is not running"))?;

        let uri = protocol::path_to_file_uri(&path)?.to_string();
        if !server.is_open(&uri) {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            server.notify_file_changed(&uri, &text).await?;
        }
        server.document_symbols(&uri).await
    }

    /// Workspace symbols from every running server, in server-name order.
    /// A server that errors is logged and skipped.
    pub async fn workspace_symbols(&mut self, query: &str) -> Result<Vec<SymbolInfo>> {
        self.poll_events(EVENT_BUDGET);
        if self.servers.is_empty() {
            bail!("no language server is running");
        }
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();

        let mut out = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;
        for name in names {
            let Some(server) = self.servers.get_mut(&name) else {
                continue;
            };
            match server.workspace_symbols(query).await {
                Ok(symbols) => {
                    any_ok = true;
                    out.extend(symbols);
                }
                Err(e) => {
                    tracing::warn!(server = %name, "workspace/symbol failed: {e:#}");
                    last_err = Some(e);
                }
            }
        }
        match (any_ok, last_err) {
            (false, Some(e)) => Err(e),
            _ => Ok(out),
        }
    }

    /// Gracefully shut down all servers.
    pub async fn shutdown(&mut self) {
        let servers = std::mem::take(&mut self.servers);
        for (name, server) in servers {
            tracing::info!("Shutting down LSP server '{name}'...");
            server.shutdown().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn event_tx(&self) -> &mpsc::Sender<LspEvent> {
        &self.event_tx
    }
}
