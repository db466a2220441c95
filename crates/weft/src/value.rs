//! Dynamic values exchanged between coroutines, tasks and asynchronous calls.
//!
//! Coroutines communicate with the framework through [`Value`]s: a completed
//! subcoroutine's result is injected into its caller as a `Value`, and an
//! [`AsynchronousCall`](crate::AsynchronousCall) wakes its task with one.
//! [`Return`] is the envelope a coroutine yields to deliver its final value
//! (or tuple of values) to whoever resumed it.

use std::fmt;

use crate::exception::{ExcType, Exception};

/// A dynamically typed value.
///
/// The recognised payload kinds are deliberately small: whatever richer data a
/// coroutine wants to move around can be closed over inside the coroutine
/// itself; the framework only ever routes values between suspension points.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The absence of a value. Sent into a coroutine on plain resumption.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// An ordered group of values, produced by multi-value [`Return`] envelopes.
    Tuple(Vec<Value>),
}

impl Value {
    /// Short kind name used in diagnostics ("wrong type `int` yielded").
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
        }
    }

    /// Returns true for [`Value::None`].
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Tuple(items)
    }
}

/// The envelope a coroutine yields to terminate with a value.
///
/// One value is carried directly; two or more are wrapped in a
/// [`Value::Tuple`] so the caller can destructure them. Immutable once
/// constructed.
///
/// # Example
/// ```
/// use weft::{Return, Value};
///
/// let single = Return::of(1i64);
/// assert_eq!(*single.value(), Value::Int(1));
///
/// let pair = Return::new(vec![Value::Str("m".into()), Value::Int(2)]).unwrap();
/// assert_eq!(*pair.value(), Value::Tuple(vec![Value::Str("m".into()), Value::Int(2)]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    value: Value,
}

impl Return {
    /// Wraps one or more values into an envelope.
    ///
    /// # Errors
    /// Returns a [`UsageError`](ExcType::UsageError) when `values` is empty:
    /// an empty envelope is meaningless, simply stop resuming instead.
    pub fn new(mut values: Vec<Value>) -> Result<Self, Exception> {
        match values.len() {
            0 => Err(Exception::new(
                ExcType::UsageError,
                "empty Return envelope; finish the coroutine instead of yielding Return with no values",
            )),
            1 => Ok(Self {
                value: values.remove(0),
            }),
            _ => Ok(Self {
                value: Value::Tuple(values),
            }),
        }
    }

    /// Wraps exactly one value. The common case, infallible.
    pub fn of(value: impl Into<Value>) -> Self {
        Self { value: value.into() }
    }

    /// The envelope carrying [`Value::None`], used where a coroutine finished
    /// without delivering anything.
    pub(crate) fn none() -> Self {
        Self { value: Value::None }
    }

    /// The wrapped value (a [`Value::Tuple`] for multi-value envelopes).
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the envelope and returns the wrapped value.
    #[inline]
    pub fn into_value(self) -> Value {
        self.value
    }
}
