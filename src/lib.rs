//! MailLens - guided ingestion of local mail sources
//!
//! The library holds the ingest wizard, the worker client it drives and the
//! workspace registry it commits into. The `maillens` binary is a thin
//! command line front end over these.

pub mod api;
pub mod config;
pub mod env_vars;
pub mod logging;
pub mod wizard;
pub mod workspace;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
