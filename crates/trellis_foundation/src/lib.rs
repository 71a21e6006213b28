//! Core values, facts, errors, and persistent collections for Trellis.
//!
//! This crate provides:
//! - [`Value`] - The value type carried by fact slots and variable bindings
//! - [`FactId`] and [`Fact`] - Identified, templated records in working memory
//! - [`Type`] - Type descriptors and the stable tags used by join hashing
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod fact;
pub mod types;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use error::{Error, ErrorContext, ErrorKind, SemanticLimit};
pub use fact::{Fact, FactId};
pub use types::Type;
pub use value::Value;

/// Result type alias using the Trellis [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
