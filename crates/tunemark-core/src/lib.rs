//! Tunemark Core - shared plumbing for the Tunemark fingerprinting engine
//!
//! This crate holds everything the fingerprinting pipeline talks to but does
//! not compute itself:
//! - Error types shared by every crate
//! - Song, hash-row and match-candidate types
//! - The [`Catalog`](catalog::Catalog) storage/match interface and its backends
//! - Audio stream sources and cancellation tokens
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      Tunemark Core                        │
//! ├───────────────────────────────────────────────────────────┤
//! │                                                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │  │    Stream    │   │   Catalog    │   │    Cancel    │   │
//! │  │   Sources    │   │    trait     │   │    Token     │   │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘   │
//! │                            │                              │
//! │                 ┌──────────┴──────────┐                   │
//! │                 │                     │                   │
//! │          ┌──────┴──────┐       ┌──────┴──────┐            │
//! │          │   Memory    │       │  PostgREST  │            │
//! │          │  (JSON)     │       │   (HTTP)    │            │
//! │          └─────────────┘       └─────────────┘            │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod error;
pub mod source;
pub mod types;

pub use catalog::{Catalog, MemoryCatalog, PostgrestCatalog, PostgrestConfig};
pub use error::{Error, ErrorKind, Result};
pub use source::{cancel_pair, CancelHandle, CancelToken, CommandSource, MemorySource, StreamSource};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library start-up
pub fn init() {
    tracing::info!(version = VERSION, "Tunemark Core initialized");
}
