//! Core types and the versioning/autosave engine for the Folio writing app.
//!
//! This crate has no database dependencies. Storage backends
//! (e.g. `folio-store-sqlite`) implement [`store::DocumentStore`]; everything
//! above the store (snapshot policy, revert, the editor session) is generic
//! over it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod policy;
pub mod revert;
pub mod scene;
pub mod search;
pub mod session;
pub mod store;
pub mod timer;

pub use config::EngineConfig;
pub use error::{Error, Result};
