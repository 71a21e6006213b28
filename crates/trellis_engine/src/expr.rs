//! Test expressions and the evaluator interface.
//!
//! The network never interprets expressions itself. Predicate slot tests and
//! terminal tests are handed to an [`Evaluator`] together with the bindings
//! of the partial match being tested. [`BuiltinEvaluator`] covers the small
//! expression language used by rules built through the Rust API.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use trellis_foundation::{Error, ErrorKind, Result, Type, Value};

use crate::pattern::Bindings;

// =============================================================================
// Expression Tree
// =============================================================================

/// A test expression over variable bindings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    /// A literal value.
    Const(Value),
    /// A variable reference (without the `?` sigil).
    Var(Arc<str>),
    /// An operator applied to argument expressions.
    Call(Op, Vec<Expr>),
}

/// Builtin operators understood by [`BuiltinEvaluator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// `=`: all arguments equal (numbers compare across int/float).
    Eq,
    /// `!=`: two arguments differ.
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-` (unary negation with one argument)
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `mod` (integers only)
    Mod,
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
    /// Logical negation.
    Not,
    /// Length of a sequence or text.
    Length,
    /// `(member x seq)`: true if `x` is an element of `seq`.
    Member,
    /// `(nth seq i)`: zero-based element access.
    Nth,
}

impl Op {
    /// Returns the operator's surface name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "mod",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Length => "length",
            Self::Member => "member",
            Self::Nth => "nth",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Expr {
    /// Creates a variable reference.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var(name.into())
    }

    /// Creates a literal.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    /// Creates an operator call.
    #[must_use]
    pub fn call(op: Op, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::Call(op, args.into_iter().collect())
    }

    /// `(= a b)`
    #[must_use]
    pub fn eq(a: Expr, b: Expr) -> Self {
        Self::call(Op::Eq, [a, b])
    }

    /// `(!= a b)`
    #[must_use]
    pub fn ne(a: Expr, b: Expr) -> Self {
        Self::call(Op::Ne, [a, b])
    }

    /// `(< a b)`
    #[must_use]
    pub fn lt(a: Expr, b: Expr) -> Self {
        Self::call(Op::Lt, [a, b])
    }

    /// `(> a b)`
    #[must_use]
    pub fn gt(a: Expr, b: Expr) -> Self {
        Self::call(Op::Gt, [a, b])
    }

    /// `(not a)`
    #[must_use]
    pub fn not(a: Expr) -> Self {
        Self::call(Op::Not, [a])
    }

    /// Collects every variable this expression references.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<Arc<str>> {
        let mut vars = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Self::Const(_) => {}
                Self::Var(name) => {
                    vars.insert(name.clone());
                }
                Self::Call(_, args) => stack.extend(args),
            }
        }
        vars
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "{v}"),
            Self::Var(name) => write!(f, "?{name}"),
            Self::Call(op, args) => {
                write!(f, "({op}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// =============================================================================
// Evaluator
// =============================================================================

/// Evaluates test expressions against a binding set.
///
/// Only `true` and non-zero integers pass a test; see
/// [`Value::passes_test`].
pub trait Evaluator {
    /// Evaluates `expr` with the given variable bindings.
    ///
    /// # Errors
    /// Returns an error if the expression cannot be evaluated (unbound
    /// variable, type mismatch, division by zero, ...).
    fn evaluate(&self, expr: &Expr, bindings: &Bindings) -> Result<Value>;

    /// Evaluates `expr` and reports whether it passes as a test.
    ///
    /// # Errors
    /// Propagates evaluation errors.
    fn test(&self, expr: &Expr, bindings: &Bindings) -> Result<bool> {
        Ok(self.evaluate(expr, bindings)?.passes_test())
    }
}

/// Evaluator for the builtin [`Op`] set.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinEvaluator;

impl Evaluator for BuiltinEvaluator {
    fn evaluate(&self, expr: &Expr, bindings: &Bindings) -> Result<Value> {
        match expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Var(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| Error::unbound_variable(&**name)),
            Expr::Call(op, args) => self.apply(*op, args, bindings),
        }
    }
}

impl BuiltinEvaluator {
    fn apply(&self, op: Op, args: &[Expr], bindings: &Bindings) -> Result<Value> {
        // Connectives evaluate lazily.
        match op {
            Op::And => {
                for arg in args {
                    if !self.test(arg, bindings)? {
                        return Ok(Value::Bool(false));
                    }
                }
                return Ok(Value::Bool(true));
            }
            Op::Or => {
                for arg in args {
                    if self.test(arg, bindings)? {
                        return Ok(Value::Bool(true));
                    }
                }
                return Ok(Value::Bool(false));
            }
            _ => {}
        }

        let values = args
            .iter()
            .map(|arg| self.evaluate(arg, bindings))
            .collect::<Result<Vec<_>>>()?;

        match op {
            Op::Eq => {
                require_arity(op, &values, 1..)?;
                Ok(Value::Bool(values.windows(2).all(|w| loosely_equal(&w[0], &w[1]))))
            }
            Op::Ne => {
                let [a, b] = exactly::<2>(op, &values)?;
                Ok(Value::Bool(!loosely_equal(a, b)))
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                require_arity(op, &values, 2..)?;
                for pair in values.windows(2) {
                    let ordering = compare(&pair[0], &pair[1])?;
                    let holds = match op {
                        Op::Lt => ordering == Ordering::Less,
                        Op::Le => ordering != Ordering::Greater,
                        Op::Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    };
                    if !holds {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Op::Add | Op::Mul => {
                let identity = if op == Op::Add { 0 } else { 1 };
                values
                    .iter()
                    .try_fold(Value::Int(identity), |acc, v| arithmetic(op, &acc, v))
            }
            Op::Sub | Op::Div => {
                require_arity(op, &values, 1..)?;
                if values.len() == 1 {
                    let unit = if op == Op::Sub { 0 } else { 1 };
                    return arithmetic(op, &Value::Int(unit), &values[0]);
                }
                let (first, rest) = values.split_at(1);
                rest.iter()
                    .try_fold(first[0].clone(), |acc, v| arithmetic(op, &acc, v))
            }
            Op::Mod => {
                let [a, b] = exactly::<2>(op, &values)?;
                let (a, b) = (int_arg(a)?, int_arg(b)?);
                if b == 0 {
                    return Err(Error::new(ErrorKind::DivisionByZero));
                }
                Ok(Value::Int(a.wrapping_rem(b)))
            }
            Op::Not => {
                let [a] = exactly::<1>(op, &values)?;
                Ok(Value::Bool(!a.passes_test()))
            }
            Op::Length => {
                let [a] = exactly::<1>(op, &values)?;
                let length = match a {
                    Value::Seq(items) => items.len(),
                    Value::String(s) | Value::Symbol(s) => s.chars().count(),
                    other => return Err(Error::type_mismatch(Type::Seq, other.value_type())),
                };
                Ok(Value::Int(i64::try_from(length).unwrap_or(i64::MAX)))
            }
            Op::Member => {
                let [needle, haystack] = exactly::<2>(op, &values)?;
                let items = haystack
                    .as_seq()
                    .ok_or_else(|| Error::type_mismatch(Type::Seq, haystack.value_type()))?;
                Ok(Value::Bool(items.iter().any(|item| loosely_equal(item, needle))))
            }
            Op::Nth => {
                let [seq, index] = exactly::<2>(op, &values)?;
                let items = seq
                    .as_seq()
                    .ok_or_else(|| Error::type_mismatch(Type::Seq, seq.value_type()))?;
                let index = int_arg(index)?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        Error::new(ErrorKind::IndexOutOfBounds {
                            index,
                            length: items.len(),
                        })
                    })
            }
            Op::And => Ok(Value::Bool(values.iter().all(Value::passes_test))),
            Op::Or => Ok(Value::Bool(values.iter().any(Value::passes_test))),
        }
    }
}

fn require_arity(op: Op, values: &[Value], range: std::ops::RangeFrom<usize>) -> Result<()> {
    if range.contains(&values.len()) {
        Ok(())
    } else {
        Err(Error::arity_mismatch(
            op.name(),
            format!("at least {}", range.start),
            values.len(),
        ))
    }
}

fn exactly<const N: usize>(op: Op, values: &[Value]) -> Result<&[Value; N]> {
    values
        .try_into()
        .map_err(|_| Error::arity_mismatch(op.name(), N.to_string(), values.len()))
}

fn int_arg(value: &Value) -> Result<i64> {
    value
        .as_int()
        .ok_or_else(|| Error::type_mismatch(Type::Int, value.value_type()))
}

/// Equality where an int and a float with the same numeric value are equal.
#[allow(clippy::float_cmp)]
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            a.as_number() == b.as_number()
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    let comparable = (a.value_type().is_numeric() && b.value_type().is_numeric())
        || a.value_type() == b.value_type();
    if !comparable {
        return Err(Error::type_mismatch(a.value_type(), b.value_type()));
    }
    a.partial_cmp(b)
        .ok_or_else(|| Error::type_mismatch(a.value_type(), b.value_type()))
}

fn arithmetic(op: Op, a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match op {
            Op::Add => Ok(Value::Int(x.wrapping_add(*y))),
            Op::Sub => Ok(Value::Int(x.wrapping_sub(*y))),
            Op::Mul => Ok(Value::Int(x.wrapping_mul(*y))),
            _ if *y == 0 => Err(Error::new(ErrorKind::DivisionByZero)),
            _ => Ok(Value::Int(x.wrapping_div(*y))),
        },
        _ => {
            let x = a
                .as_number()
                .ok_or_else(|| Error::type_mismatch(Type::Float, a.value_type()))?;
            let y = b
                .as_number()
                .ok_or_else(|| Error::type_mismatch(Type::Float, b.value_type()))?;
            Ok(Value::Float(match op {
                Op::Add => x + y,
                Op::Sub => x - y,
                Op::Mul => x * y,
                _ => x / y,
            }))
        }
    }
}
