//! Configuration for the matching network.

/// Configuration for a [`ReteNetwork`](crate::ReteNetwork) and the
/// [`Session`](crate::Session) around it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Run the consistency checker after every session mutation.
    pub verify: bool,

    /// Maximum drive steps for one assert, retract or rule build
    /// (kill switch).
    pub max_drive_steps: usize,

    /// Index into the prime sequence that new memories start at.
    pub initial_memory_prime: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify: false,
            max_drive_steps: 1_000_000,
            initial_memory_prime: 0,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration that verifies every mutation.
    ///
    /// Verification recomputes every rule by brute force, so this is for
    /// tests and debugging only.
    #[must_use]
    pub fn verifying() -> Self {
        Self {
            verify: true,
            ..Self::default()
        }
    }

    /// Creates a configuration with the kill switch disabled.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_drive_steps: usize::MAX,
            ..Self::default()
        }
    }

    /// Builder method to enable/disable verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Builder method to set the drive step limit.
    #[must_use]
    pub fn with_max_drive_steps(mut self, max: usize) -> Self {
        self.max_drive_steps = max;
        self
    }

    /// Builder method to set the starting table size index.
    #[must_use]
    pub fn with_initial_memory_prime(mut self, index: usize) -> Self {
        self.initial_memory_prime = index;
        self
    }
}
