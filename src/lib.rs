//! RepoStore library -- an object store backed by a repository contents API.
//!
//! This crate provides the pieces for serving uploads, bundle downloads,
//! and nested archive listings out of a single remote repository: a
//! two-token credential rotator, an authenticated transport, the remote
//! object adapter with its bundle exporter and indexer, and an in-memory
//! upload log.

use std::sync::Arc;

pub mod config;
pub mod credentials;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod transport;
pub mod upload_log;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Config;
use crate::storage::contents::ContentsStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Remote object store; owns the transport and the upload log.
    pub store: Arc<ContentsStore>,
}

impl AppState {
    pub fn new(config: Config, store: ContentsStore) -> Self {
        Self {
            config,
            store: Arc::new(store),
        }
    }
}
