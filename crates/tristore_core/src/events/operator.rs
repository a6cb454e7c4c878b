//! Event operators and their evaluation.

use std::fmt;
use thiserror::Error;
use tristore_codec::{Value, MAX_BYTES_LENGTH, MAX_CONTAINER_ELEMENTS};

/// The closed set of operations an event can record for an item.
///
/// Each operator has a stable tag that is what the backend persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `state[item] = operand`
    Set,
    /// Removes the item.
    Delete,
    /// Numeric sum, or concatenation of text, bytes and arrays.
    Add,
    /// Numeric difference.
    Subtract,
    /// Numeric product, or repetition of text, bytes and arrays by an integer.
    Multiply,
    /// True division; always yields a float.
    Divide,
    /// Division rounded toward negative infinity.
    FloorDivide,
    /// Remainder with the sign of the divisor.
    Modulo,
    /// Exponentiation.
    Power,
    /// Concatenation of text, bytes or arrays.
    Concat,
    /// Numeric negation; operand ignored.
    Negate,
    /// Logical negation of truthiness; operand ignored.
    Not,
}

impl Operator {
    /// Every operator, in tag order of declaration.
    pub const ALL: [Operator; 12] = [
        Operator::Set,
        Operator::Delete,
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::FloorDivide,
        Operator::Modulo,
        Operator::Power,
        Operator::Concat,
        Operator::Negate,
        Operator::Not,
    ];

    /// Returns the persisted tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Operator::Set => "set",
            Operator::Delete => "delete",
            Operator::Add => "add",
            Operator::Subtract => "subtract",
            Operator::Multiply => "multiply",
            Operator::Divide => "divide",
            Operator::FloorDivide => "floor_divide",
            Operator::Modulo => "modulo",
            Operator::Power => "power",
            Operator::Concat => "concat",
            Operator::Negate => "negate",
            Operator::Not => "not",
        }
    }

    /// Parses a persisted tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag() == tag)
    }

    /// Returns `true` for operators that ignore their operand.
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(self, Operator::Delete | Operator::Negate | Operator::Not)
    }

    /// Computes the new value of an item.
    ///
    /// `current` is the item's value before the event, `None` if unset.
    /// Returns `None` when the item is removed.
    ///
    /// # Errors
    ///
    /// Every operator except [`Set`](Operator::Set) requires the item to be
    /// set. Type mismatches, integer overflow and division by zero fail.
    pub fn evaluate(self, current: Option<&Value>, operand: Value) -> Result<Option<Value>, EvalError> {
        if self == Operator::Set {
            return Ok(Some(operand));
        }
        let current = current.ok_or(EvalError::Unset)?;
        let result = match self {
            Operator::Set => operand,
            Operator::Delete => return Ok(None),
            Operator::Add => add(self, current, &operand)?,
            Operator::Concat => concat(self, current, &operand)?,
            Operator::Subtract => numeric(self, current, &operand, i64::checked_sub, |a, b| a - b)?,
            Operator::Multiply => multiply(self, current, &operand)?,
            Operator::Divide => divide(self, current, &operand)?,
            Operator::FloorDivide => floor_divide(self, current, &operand)?,
            Operator::Modulo => modulo(self, current, &operand)?,
            Operator::Power => power(self, current, &operand)?,
            Operator::Negate => match current {
                Value::Integer(n) => Value::Integer(n.checked_neg().ok_or(EvalError::Overflow { op: self })?),
                Value::Float(f) => Value::Float(-f),
                other => {
                    return Err(EvalError::UnaryType {
                        op: self,
                        operand: other.type_name(),
                    })
                }
            },
            Operator::Not => Value::Bool(!current.is_truthy()),
        };
        if matches!(result, Value::Float(f) if f.is_nan()) {
            return Err(EvalError::NotANumber { op: self });
        }
        Ok(Some(result))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Why an operator could not be applied to an item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The item is not set (never assigned, or deleted).
    #[error("item is not set")]
    Unset,

    /// Operand types do not support the operator.
    #[error("cannot {op} {left} and {right}")]
    TypeMismatch {
        /// Operator applied.
        op: Operator,
        /// Type of the current value.
        left: &'static str,
        /// Type of the operand.
        right: &'static str,
    },

    /// The current value does not support the unary operator.
    #[error("cannot {op} {operand}")]
    UnaryType {
        /// Operator applied.
        op: Operator,
        /// Type of the current value.
        operand: &'static str,
    },

    /// Division or modulo by zero.
    #[error("{op} by zero")]
    DivisionByZero {
        /// Operator applied.
        op: Operator,
    },

    /// Integer result outside the i64 range.
    #[error("integer overflow in {op}")]
    Overflow {
        /// Operator applied.
        op: Operator,
    },

    /// The result is not a number.
    #[error("{op} produced NaN")]
    NotANumber {
        /// Operator applied.
        op: Operator,
    },
}

fn mismatch(op: Operator, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Both operands as floats when at least one is a float and both are numeric.
#[allow(clippy::cast_precision_loss)]
fn as_floats(left: &Value, right: &Value) -> Option<(f64, f64)> {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => Some((*a, *b)),
        (Value::Float(a), Value::Integer(b)) => Some((*a, *b as f64)),
        (Value::Integer(a), Value::Float(b)) => Some((*a as f64, *b)),
        _ => None,
    }
}

fn numeric(
    op: Operator,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return int_op(*a, *b)
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { op });
    }
    as_floats(left, right)
        .map(|(a, b)| Value::Float(float_op(a, b)))
        .ok_or_else(|| mismatch(op, left, right))
}

fn concat(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{a}{b}"))),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(Value::Bytes([a.as_slice(), b.as_slice()].concat())),
        (Value::Array(a), Value::Array(b)) => Ok(Value::Array([a.as_slice(), b.as_slice()].concat())),
        _ => Err(mismatch(op, left, right)),
    }
}

fn add(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Text(_), _) | (Value::Bytes(_), _) | (Value::Array(_), _) => concat(op, left, right),
        _ => numeric(op, left, right, i64::checked_add, |a, b| a + b),
    }
}

fn repeat(op: Operator, sequence: &Value, count: i64) -> Result<Value, EvalError> {
    let count = usize::try_from(count.max(0)).map_err(|_| EvalError::Overflow { op })?;
    let (len, max) = match sequence {
        Value::Text(s) => (s.len(), MAX_BYTES_LENGTH),
        Value::Bytes(b) => (b.len(), MAX_BYTES_LENGTH),
        Value::Array(a) => (a.len(), MAX_CONTAINER_ELEMENTS),
        _ => unreachable!("repeat is only called with sequences"),
    };
    // The result must stay decodable.
    let total = len
        .checked_mul(count)
        .filter(|&total| u64::try_from(total).is_ok_and(|t| t <= max))
        .ok_or(EvalError::Overflow { op })?;
    Ok(match sequence {
        Value::Text(s) => Value::Text(s.repeat(count)),
        Value::Bytes(b) => Value::Bytes(b.repeat(count)),
        Value::Array(a) => {
            let mut out = Vec::with_capacity(total);
            while out.len() < total {
                out.extend_from_slice(a);
            }
            Value::Array(out)
        }
        _ => unreachable!("repeat is only called with sequences"),
    })
}

fn multiply(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (seq @ (Value::Text(_) | Value::Bytes(_) | Value::Array(_)), Value::Integer(n))
        | (Value::Integer(n), seq @ (Value::Text(_) | Value::Bytes(_) | Value::Array(_))) => {
            repeat(op, seq, *n)
        }
        _ => numeric(op, left, right, i64::checked_mul, |a, b| a * b),
    }
}

#[allow(clippy::cast_precision_loss)]
fn divide(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let (a, b) = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => (*a as f64, *b as f64),
        _ => as_floats(left, right).ok_or_else(|| mismatch(op, left, right))?,
    };
    if b == 0.0 {
        return Err(EvalError::DivisionByZero { op });
    }
    Ok(Value::Float(a / b))
}

fn floor_divide(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        if *b == 0 {
            return Err(EvalError::DivisionByZero { op });
        }
        let q = a.checked_div(*b).ok_or(EvalError::Overflow { op })?;
        let floored = if a % b != 0 && ((*a < 0) != (*b < 0)) { q - 1 } else { q };
        return Ok(Value::Integer(floored));
    }
    let (a, b) = as_floats(left, right).ok_or_else(|| mismatch(op, left, right))?;
    if b == 0.0 {
        return Err(EvalError::DivisionByZero { op });
    }
    Ok(Value::Float((a / b).floor()))
}

fn modulo(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        if *b == 0 {
            return Err(EvalError::DivisionByZero { op });
        }
        let r = a.checked_rem(*b).ok_or(EvalError::Overflow { op })?;
        let r = if r != 0 && ((r < 0) != (*b < 0)) { r + b } else { r };
        return Ok(Value::Integer(r));
    }
    let (a, b) = as_floats(left, right).ok_or_else(|| mismatch(op, left, right))?;
    if b == 0.0 {
        return Err(EvalError::DivisionByZero { op });
    }
    let r = a % b;
    Ok(Value::Float(if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn power(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Value::Integer(base), Value::Integer(exp)) = (left, right) {
        if *exp >= 0 {
            let exp = u32::try_from(*exp).map_err(|_| EvalError::Overflow { op })?;
            return base
                .checked_pow(exp)
                .map(Value::Integer)
                .ok_or(EvalError::Overflow { op });
        }
        if *base == 0 {
            return Err(EvalError::DivisionByZero { op });
        }
        return Ok(Value::Float((*base as f64).powf(*exp as f64)));
    }
    let (a, b) = as_floats(left, right).ok_or_else(|| mismatch(op, left, right))?;
    if a == 0.0 && b < 0.0 {
        return Err(EvalError::DivisionByZero { op });
    }
    Ok(Value::Float(a.powf(b)))
}

/// A requested change to one item: a bare value or an explicit operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Assign the value (same as `Op(Operator::Set, value)`).
    Assign(Value),
    /// Apply an operator with an operand.
    Op(Operator, Value),
}

impl Change {
    /// An explicit operation.
    pub fn op(op: Operator, operand: impl Into<Value>) -> Self {
        Change::Op(op, operand.into())
    }

    /// Removes the item.
    #[must_use]
    pub fn delete() -> Self {
        Change::Op(Operator::Delete, Value::Null)
    }

    /// Negates the numeric item.
    #[must_use]
    pub fn negate() -> Self {
        Change::Op(Operator::Negate, Value::Null)
    }

    /// Replaces the item by the negation of its truthiness.
    #[must_use]
    pub fn not() -> Self {
        Change::Op(Operator::Not, Value::Null)
    }

    /// Splits into operator and operand. Unary operators get a null operand.
    #[must_use]
    pub fn into_parts(self) -> (Operator, Value) {
        match self {
            Change::Assign(value) => (Operator::Set, value),
            Change::Op(op, _) if op.is_unary() => (op, Value::Null),
            Change::Op(op, value) => (op, value),
        }
    }
}

impl From<Value> for Change {
    fn from(value: Value) -> Self {
        Change::Assign(value)
    }
}

impl<V: Into<Value>> From<(Operator, V)> for Change {
    fn from((op, operand): (Operator, V)) -> Self {
        Change::Op(op, operand.into())
    }
}

macro_rules! assign_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Change {
                fn from(value: $t) -> Self {
                    Change::Assign(Value::from(value))
                }
            }
        )*
    };
}

assign_from!(bool, i64, i32, u32, f64, String, &str, Vec<u8>, Vec<Value>);
