//! Integration tests for Layer 1: Storage
//!
//! Tests for the fact store interface and working memory.

mod store;
mod working_memory;
