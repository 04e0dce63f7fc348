// src/lib.rs

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Shared cancellation flag. Flipped (e.g. by a signal handler) to ask the
/// runner to forward an interrupt to its subprocess and wind down.
pub type CancellationToken = Arc<AtomicBool>;
