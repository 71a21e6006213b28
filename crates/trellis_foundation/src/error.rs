//! Error types for the Trellis system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::fact::FactId;
use crate::types::Type;

/// The main error type for Trellis operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: Type, actual: Type) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates an unbound variable error.
    #[must_use]
    pub fn unbound_variable(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnboundVariable(name.into()))
    }

    /// Creates an arity mismatch error.
    #[must_use]
    pub fn arity_mismatch(operator: impl Into<String>, expected: String, actual: usize) -> Self {
        Self::new(ErrorKind::ArityMismatch {
            operator: operator.into(),
            expected,
            actual,
        })
    }

    /// Creates a fact not found error.
    #[must_use]
    pub fn fact_not_found(id: FactId) -> Self {
        Self::new(ErrorKind::FactNotFound(id))
    }

    /// Creates a duplicate fact error.
    #[must_use]
    pub fn duplicate_fact(id: FactId) -> Self {
        Self::new(ErrorKind::DuplicateFact(id))
    }

    /// Creates a template mismatch error.
    #[must_use]
    pub fn template_mismatch(id: FactId, expected: &str, actual: &str) -> Self {
        Self::new(ErrorKind::TemplateMismatch {
            id,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }

    /// Creates an invalid rule error.
    #[must_use]
    pub fn invalid_rule(rule: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRule {
            rule: rule.to_string(),
            reason: reason.into(),
        })
    }

    /// Creates an unknown rule error.
    #[must_use]
    pub fn unknown_rule(rule: &str) -> Self {
        Self::new(ErrorKind::UnknownRule(rule.to_string()))
    }

    /// Creates a structural violation error.
    ///
    /// These indicate a bug in network construction or propagation and
    /// leave the network in an unspecified state.
    #[must_use]
    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Structural(message.into()))
    }

    /// Creates a network/naive divergence error.
    #[must_use]
    pub fn unstable(rule: &str) -> Self {
        Self::new(ErrorKind::Unstable(rule.to_string()))
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Returns true if this error is fatal for the network.
    ///
    /// Fatal errors are never rolled back; the network must be rebuilt.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Structural(_))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Type mismatch during expression evaluation.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: Type,
        /// The actual type encountered.
        actual: Type,
    },

    /// Variable referenced by an expression is not bound.
    #[error("unbound variable: {0}")]
    UnboundVariable(String),

    /// Wrong number of arguments to an operator.
    #[error("arity mismatch for {operator}: expected {expected}, got {actual}")]
    ArityMismatch {
        /// The operator being applied.
        operator: String,
        /// Description of expected arity.
        expected: String,
        /// Actual number of arguments.
        actual: usize,
    },

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Index out of bounds.
    #[error("index out of bounds: {index} (length {length})")]
    IndexOutOfBounds {
        /// The index that was accessed.
        index: i64,
        /// The actual length of the sequence.
        length: usize,
    },

    /// Fact was not found in the store.
    #[error("fact not found: {0}")]
    FactNotFound(FactId),

    /// A fact with this id is already asserted.
    #[error("duplicate fact: {0}")]
    DuplicateFact(FactId),

    /// Fact exists but under a different template than the caller named.
    #[error("fact {id} has template {actual}, not {expected}")]
    TemplateMismatch {
        /// The fact that was addressed.
        id: FactId,
        /// Template named by the caller.
        expected: String,
        /// Template the fact actually has.
        actual: String,
    },

    /// Rule failed validation while building the network.
    #[error("invalid rule {rule}: {reason}")]
    InvalidRule {
        /// Rule name.
        rule: String,
        /// Why the rule was rejected.
        reason: String,
    },

    /// Rule is not present in the network.
    #[error("unknown rule: {0}")]
    UnknownRule(String),

    /// Network invariant violated (builder or propagation bug).
    #[error("structural violation: {0}")]
    Structural(String),

    /// Network memories diverged from the naive recomputation.
    #[error("network state for rule {0} diverged from naive matching")]
    Unstable(String),

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// Maximum drive steps for a single assert or retract exceeded.
    MaxDriveSteps {
        /// The configured limit.
        limit: usize,
        /// The fact whose propagation hit the limit.
        fact: Option<FactId>,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxDriveSteps { limit, fact } => {
                write!(f, "max drive steps ({limit}) exceeded")?;
                if let Some(fact) = fact {
                    write!(f, " while propagating {fact}")?;
                }
                Ok(())
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule name, if the error arose inside a rule's network.
    pub rule: Option<String>,
    /// Fact being propagated when the error occurred.
    pub fact: Option<FactId>,
    /// Stack of operations leading to the error.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule name.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets the fact being propagated.
    #[must_use]
    pub fn with_fact(mut self, fact: FactId) -> Self {
        self.fact = Some(fact);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "in rule {rule}")?;
        }
        if let Some(fact) = self.fact {
            write!(f, " while propagating {fact}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
