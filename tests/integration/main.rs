//! Cross-layer integration tests
//!
//! Drives sessions through long assert/retract sequences and checks the
//! network against a brute-force recomputation after every step.

mod session;
