//! The object model: the handful of singleton constants every cell's value
//! is drawn from, plus the two families of non-singleton constants (reals
//! and interned strings).
//!
//! A cell's value is always a [`Value`]. Three of its variants —
//! [`Value::True`], [`Value::False`], [`Value::Unknown`] — carry the
//! three-valued logic described in the spec; [`Value::Disabled`] is the
//! fourth sentinel reserved for cells that are not currently enabled
//! (distinct from `Unknown`, which is a *computed* result); and
//! [`Value::Placeholder`] stands in for a term that has been referenced but
//! not yet given a definition cell.
//!
//! Reals and strings are ordinary variants here rather than arena-interned
//! handles: the hash-consing the original C engine performs on interned
//! strings/reals is an identity optimization for pointer-equality checks,
//! not an observable part of the value model, so it lives in
//! [`nb_eval`](../nb_eval/index.html)'s string table instead.

use std::cmp::Ordering;
use std::rc::Rc;

/// The value carried by a cell.
#[derive(Debug, Clone)]
pub enum Value {
    True,
    False,
    Unknown,
    /// Not currently computing — distinct from `Unknown`. A disabled cell
    /// has this value until some rule re-enables it.
    Disabled,
    /// A term that has been referenced but never defined.
    Placeholder,
    Real(f64),
    Str(Rc<str>),
}

impl Value {
    pub fn real(v: f64) -> Self {
        Value::Real(v)
    }

    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// True for any value that counts as "true" for rule-firing and
    /// boolean-operator purposes: everything except `False` and `Unknown`.
    /// `Disabled` cells never reach a rule's alert path, so in practice this
    /// is only ever asked of `True`/`False`/`Unknown`/`Real`/`Str`.
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::False | Value::Unknown)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Value::False)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Value::Disabled)
    }

    /// Three-valued negation: True<->False, Unknown->Unknown. Real/Str
    /// operands outside the boolean family are not defined for `!` and the
    /// cell graph never constructs such a node (the parser only calls this
    /// on boolean subtrees).
    pub fn logical_not(&self) -> Value {
        match self {
            Value::False => Value::True,
            Value::Unknown => Value::Unknown,
            _ => Value::False,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::True | Value::False => "boolean",
            Value::Unknown => "unknown",
            Value::Disabled => "disabled",
            Value::Placeholder => "placeholder",
            Value::Real(_) => "real",
            Value::Str(_) => "string",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::True, Value::True) => true,
            (Value::False, Value::False) => true,
            (Value::Unknown, Value::Unknown) => true,
            (Value::Disabled, Value::Disabled) => true,
            (Value::Placeholder, Value::Placeholder) => true,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

/// Type-checked ordering for the relational operators. Returns `None` when
/// the operands are cross-type or either is non-comparable (`Unknown`
/// propagation is handled by the caller, not here). String comparison is
/// byte-lexicographic per the spec's numeric semantics section.
impl Value {
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::True => write!(f, "!"),
            Value::False => write!(f, "0"),
            Value::Unknown => write!(f, "?"),
            Value::Disabled => write!(f, "#disabled"),
            Value::Placeholder => write!(f, "_"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Str(s) => write!(f, "\"{s}\""),
        }
    }
}
