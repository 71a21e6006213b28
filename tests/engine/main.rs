//! Integration tests for Layer 2: Engine
//!
//! Tests for alpha sharing, joins, negation and existence, and memories.

mod alpha_sharing;
mod joins;
mod memories;
mod negation;
