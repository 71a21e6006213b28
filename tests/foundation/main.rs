//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, FactId, Fact, Error, and persistent collections.

mod facts;
mod values;
