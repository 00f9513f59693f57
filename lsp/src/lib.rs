//! LSP client backing the code-intelligence tools.
//!
//! Language servers are spawned on demand, speak JSON-RPC over stdio, and feed
//! diagnostics and symbol answers back through [`LspManager`].

pub mod codec;
pub mod types;

pub(crate) mod diagnostics;
pub(crate) mod protocol;
pub(crate) mod server;
pub(crate) mod symbols;

mod manager;

pub use manager::LspManager;
pub use types::{DiagnosticSeverity, LspConfig, ServerConfig, ServerDiagnostic, ServerStopReason};
