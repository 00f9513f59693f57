//! Tether CLI - JSON-lines driver for the tool layer.
//!
//! ```text
//! stdin:  {"id": 1, "tool": "read_file", "input": {"path": "src/lib.rs"}}
//! stdout: {"id": 1, "result": {"success": true, "message": "1| ..."}}
//! ```
//!
//! Every request goes through [`Dispatcher::execute_async`]; responses are
//! written in completion order, so callers match them up by `id`.

mod surface;

use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_config::TetherConfig;
use tether_lsp::LspManager;
use tether_tools::builtins::register_builtins;
use tether_tools::{CodeIntel, Dispatcher, ToolContext, ToolRegistry};
use tether_types::ToolResult;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::surface::TerminalSurface;

const USAGE: &str = "\
Usage: tether [--list-tools]

Reads tool calls as JSON lines on stdin:
  {\"id\": <any>, \"tool\": <name>, \"input\": {...}}
and writes one {\"id\", \"result\"} line per call to stdout.

Options:
  --list-tools   Print the tool definitions as JSON and exit
  -h, --help     Show this help";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default = "empty_object")]
    input: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    result: ToolResult,
}

enum Mode {
    Serve,
    ListTools,
}

fn parse_mode() -> Result<Option<Mode>> {
    let mut mode = Mode::Serve;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--list-tools" => mode = Mode::ListTools,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(None);
            }
            other => anyhow::bail!("unknown argument '{other}'\n\n{USAGE}"),
        }
    }
    Ok(Some(mode))
}

fn main() -> Result<()> {
    let Some(mode) = parse_mode()? else {
        return Ok(());
    };
    init_tracing();

    let config = TetherConfig::load().unwrap_or_else(|e| {
        eprintln!("tether: {e}; continuing with defaults");
        TetherConfig::default()
    });

    // Single-threaded: a spawned callback cannot run until the caller yields.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(config, mode))
}

async fn run(config: TetherConfig, mode: Mode) -> Result<()> {
    let working_dir = env::current_dir().context("failed to read current directory")?;
    let mut ctx = ToolContext::new(
        working_dir.clone(),
        config.tools,
        Arc::new(TerminalSurface),
    )?;

    let lsp = config.lsp.enabled.then(|| {
        Arc::new(tokio::sync::Mutex::new(LspManager::new(
            config.lsp,
            &working_dir,
        )))
    });
    if let Some(lsp) = &lsp {
        let intel: Arc<dyn CodeIntel> = lsp.clone();
        ctx = ctx.with_code_intel(intel);
    }

    let mut registry = ToolRegistry::default();
    register_builtins(&mut registry, config.skills);
    let dispatcher = Arc::new(Dispatcher::new(registry, ctx));
    tracing::info!(
        tools = dispatcher.definitions().len(),
        working_dir = %working_dir.display(),
        "Tether ready"
    );

    match mode {
        Mode::ListTools => {
            let defs = serde_json::to_string_pretty(&dispatcher.definitions())?;
            println!("{defs}");
        }
        Mode::Serve => serve(&dispatcher).await?,
    }

    if let Some(lsp) = lsp {
        lsp.lock().await.shutdown().await;
    }
    Ok(())
}

/// Dispatch stdin requests until EOF, then wait for every call to answer.
async fn serve(dispatcher: &Arc<Dispatcher>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut calls = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Malformed request: {e}");
                let _ = tx.send(Response {
                    id: Value::Null,
                    result: ToolResult::failure(format!("Malformed request: {e}")),
                });
                continue;
            }
        };
        tracing::debug!(tool = %request.tool, id = %request.id, "Dispatching");
        let reply = tx.clone();
        let id = request.id;
        calls.push(
            dispatcher.execute_async(&request.tool, request.input, move |result| {
                let _ = reply.send(Response { id, result });
            }),
        );
    }

    for call in calls {
        if let Err(e) = call.await {
            tracing::warn!("Tool task failed: {e}");
        }
    }
    drop(tx);
    writer.await.context("response writer task failed")??;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries the protocol and stderr the review prompt; no file, no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.tether/logs/tether.log
    if let Some(dir) = tether_config::tether_dir() {
        candidates.push(dir.join("logs").join("tether.log"));
    }

    // Fallback: ./.tether/logs/tether.log
    candidates.push(PathBuf::from(".tether").join("logs").join("tether.log"));

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_input_defaults_to_empty_object() {
        let request: Request = serde_json::from_str(r#"{"id": 7, "tool": "skill"}"#).unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(request.input, serde_json::json!({}));

        let request: Request = serde_json::from_str(r#"{"tool": "x", "input": {"a": 1}}"#).unwrap();
        assert!(request.id.is_null());
        assert_eq!(request.input["a"], 1);
    }

    #[test]
    fn response_serializes_result_envelope() {
        let line = serde_json::to_string(&Response {
            id: Value::from("a"),
            result: ToolResult::failure("Unknown tool: nope"),
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"id":"a","result":{"success":false,"error":"Unknown tool: nope"}}"#
        );
    }

    #[test]
    fn log_candidates_end_with_local_fallback() {
        let candidates = log_file_candidates();
        assert_eq!(
            candidates.last(),
            Some(&PathBuf::from(".tether/logs/tether.log"))
        );
    }
}
