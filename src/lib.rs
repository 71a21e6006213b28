//! Trellis - Incremental RETE matching core
//!
//! This crate re-exports all layers of the Trellis system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: trellis_engine     — Alpha index, joins, token graph, drive, checker
//! Layer 1: trellis_storage    — Fact store, working memory
//! Layer 0: trellis_foundation — Core types (Value, Fact, Error)
//! ```

pub use trellis_engine as engine;
pub use trellis_foundation as foundation;
pub use trellis_storage as storage;
