//! The remote-backed object store.
//!
//! [`contents::ContentsStore`] maps object names onto files in the
//! upstream repository.  [`bundle`] and [`index`] are read-side views
//! built on its list and fetch operations.

pub mod bundle;
pub mod contents;
pub mod index;
