//! Working memory fact store for Trellis.
//!
//! This crate provides:
//! - [`FactStore`] - Read access the matching network needs from a fact store
//! - [`WorkingMemory`] - Persistent in-memory store with a template index

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod memory;
pub mod store;

pub use memory::WorkingMemory;
pub use store::FactStore;
