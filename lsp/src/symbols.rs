//! Flattening of `textDocument/documentSymbol` and `workspace/symbol` results.
//!
//! Servers answer with either hierarchical `DocumentSymbol`s (nested under
//! `children`) or flat `SymbolInformation`/`WorkspaceSymbol` records carrying a
//! `location`. Both collapse to a pre-order list of [`SymbolInfo`].

use serde_json::Value;
use tether_types::{SymbolInfo, SymbolKind};

use crate::protocol;

/// Flatten a symbol response. `null` and non-array results yield nothing.
pub(crate) fn flatten_symbols(result: &Value) -> Vec<SymbolInfo> {
    let mut out = Vec::new();
    if let Some(items) = result.as_array() {
        for item in items {
            collect(item, &mut out);
        }
    }
    out
}

fn collect(item: &Value, out: &mut Vec<SymbolInfo>) {
    let Some(name) = item.get("name").and_then(Value::as_str) else {
        return;
    };
    let kind = item
        .get("kind")
        .and_then(Value::as_u64)
        .map_or(SymbolKind::Unknown, SymbolKind::from_lsp);

    let location = item.get("location");
    let file = location
        .and_then(|loc| loc.get("uri"))
        .and_then(Value::as_str)
        .and_then(protocol::file_uri_to_path);
    let line = start_line(item.get("selectionRange"))
        .or_else(|| start_line(item.get("range")))
        .or_else(|| start_line(location.and_then(|loc| loc.get("range"))));

    out.push(SymbolInfo {
        name: name.to_string(),
        kind,
        file,
        line,
    });

    if let Some(children) = item.get("children").and_then(Value::as_array) {
        for child in children {
            collect(child, out);
        }
    }
}

/// 1-indexed start line of an LSP range.
fn start_line(range: Option<&Value>) -> Option<u32> {
    let line = range?.get("start")?.get("line")?.as_u64()?;
    u32::try_from(line).ok().map(|l| l.saturating_add(1))
}
