//! Shared infrastructure utilities for Tether.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`diff`**: Unified diff rendering and change stats for review prompts

pub mod atomic_write;
pub mod diff;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, atomic_write, atomic_write_new,
    atomic_write_with_options,
};
pub use diff::{DiffStats, compute_diff_stats, format_unified_diff};
