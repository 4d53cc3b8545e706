//! HTTP handlers.
//!
//! Each handler takes the shared [`crate::AppState`] plus already-extracted
//! inputs; routing and extraction live in [`crate::server`].

pub mod download;
pub mod status;
pub mod upload;
