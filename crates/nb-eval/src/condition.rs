//! Pure three-valued evaluation functions for the unary and binary
//! boolean/relational operators. These are called from
//! [`crate::graph::Graph::compute`] and never touch the graph themselves,
//! so they're straightforward to property-test in isolation.

use nb_common::Value;
use nb_parse::ast::{BinaryOp, UnaryOp};
use regex::Regex;

pub fn eval_unary(op: UnaryOp, v: &Value) -> Value {
    match op {
        UnaryOp::Not => v.logical_not(),
        UnaryOp::TrueOf => {
            if v.is_true() {
                Value::True
            } else {
                v.clone()
            }
        }
        UnaryOp::IsUnknown => bool_value(v.is_unknown()),
        UnaryOp::IsKnown => bool_value(!v.is_unknown()),
        UnaryOp::AssumeFalse => {
            if v.is_unknown() {
                Value::False
            } else {
                v.clone()
            }
        }
        UnaryOp::AssumeTrue => {
            if v.is_unknown() {
                Value::True
            } else {
                v.clone()
            }
        }
        // Arithmetic negation lives in `arithmetic`; the parser only ever
        // routes `Negate` there. Kept out of this match's reach.
        UnaryOp::Negate => Value::Unknown,
        // `~=` pulses are computed by the graph's transition handling, not
        // as a pure function of the child's current value; a bare eval
        // (e.g. at enable time, before any change has occurred) is False.
        UnaryOp::Change => Value::False,
    }
}

fn bool_value(b: bool) -> Value {
    if b { Value::True } else { Value::False }
}

/// Kleene three-valued AND: any `False` dominates, else any `Unknown`
/// dominates, else `True`.
fn kleene_and(a: &Value, b: &Value) -> Value {
    if a.is_false() || b.is_false() {
        Value::False
    } else if a.is_unknown() || b.is_unknown() {
        Value::Unknown
    } else {
        Value::True
    }
}

/// Kleene three-valued OR: any `True` dominates, else any `Unknown`
/// dominates, else `False`.
fn kleene_or(a: &Value, b: &Value) -> Value {
    if a.is_true() || b.is_true() {
        Value::True
    } else if a.is_unknown() || b.is_unknown() {
        Value::Unknown
    } else {
        Value::False
    }
}

fn exactly_one_true(a: &Value, b: &Value) -> Value {
    if a.is_unknown() || b.is_unknown() {
        Value::Unknown
    } else {
        bool_value(a.is_true() != b.is_true())
    }
}

/// Evaluates a strict (non-lazy) binary boolean operator. Lazy variants
/// fall through to the same truth tables once both operands are known; the
/// graph only withholds the right-hand subscription, it does not change
/// the combining rule.
pub fn eval_binary_bool(op: BinaryOp, a: &Value, b: &Value, prev: &Value) -> Value {
    match op {
        BinaryOp::And | BinaryOp::LazyAnd => kleene_and(a, b),
        BinaryOp::Or | BinaryOp::LazyOr => kleene_or(a, b),
        BinaryOp::Nand => kleene_and(a, b).logical_not(),
        BinaryOp::Nor => kleene_or(a, b).logical_not(),
        BinaryOp::Xor => exactly_one_true(a, b),
        BinaryOp::Default => {
            if a.is_unknown() {
                b.clone()
            } else {
                a.clone()
            }
        }
        // Set/reset latch: `a` sets True, `b` resets False, otherwise the
        // cell holds its previous output. No edge detection needed since
        // both operands are re-read level-triggered on every alert.
        BinaryOp::FlipFlop => {
            if a.is_true() {
                Value::True
            } else if b.is_true() {
                Value::False
            } else {
                prev.clone()
            }
        }
        // `a then b`: gate, not latch. Passes `b` through only while `a`
        // holds; otherwise Unknown (grounds the deprecated `andMonitor`).
        BinaryOp::Then => {
            if a.is_true() {
                b.clone()
            } else {
                Value::Unknown
            }
        }
        // `a capture b`: latches the last `b` seen while `a` was true, and
        // holds it after `a` goes false (grounds `andCapture`/`orCapture`).
        BinaryOp::Capture => {
            if a.is_true() {
                b.clone()
            } else {
                prev.clone()
            }
        }
        _ => unreachable!("non-boolean op routed to eval_binary_bool: {op:?}"),
    }
}

/// Type-checked relational comparison: real/real or string/string only;
/// cross-type or either-Unknown yields Unknown rather than an error.
pub fn eval_relational(op: BinaryOp, a: &Value, b: &Value) -> Value {
    if a.is_unknown() || b.is_unknown() {
        return Value::Unknown;
    }
    match op {
        BinaryOp::Eq => match (a, b) {
            (Value::Real(_), Value::Real(_)) | (Value::Str(_), Value::Str(_)) => {
                bool_value(a == b)
            }
            _ => Value::Unknown,
        },
        BinaryOp::Ne => match (a, b) {
            (Value::Real(_), Value::Real(_)) | (Value::Str(_), Value::Str(_)) => {
                bool_value(a != b)
            }
            _ => Value::Unknown,
        },
        BinaryOp::Lt => a
            .partial_compare(b)
            .map(|o| bool_value(o == std::cmp::Ordering::Less))
            .unwrap_or(Value::Unknown),
        BinaryOp::Le => a
            .partial_compare(b)
            .map(|o| bool_value(o != std::cmp::Ordering::Greater))
            .unwrap_or(Value::Unknown),
        BinaryOp::Gt => a
            .partial_compare(b)
            .map(|o| bool_value(o == std::cmp::Ordering::Greater))
            .unwrap_or(Value::Unknown),
        BinaryOp::Ge => a
            .partial_compare(b)
            .map(|o| bool_value(o != std::cmp::Ordering::Less))
            .unwrap_or(Value::Unknown),
        BinaryOp::Match => match (a, b) {
            (Value::Str(s), Value::Str(pat)) => match Regex::new(pat) {
                Ok(re) => bool_value(re.is_match(s)),
                Err(_) => Value::False,
            },
            _ => Value::False,
        },
        _ => unreachable!("non-relational op routed to eval_relational: {op:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_truth_table() {
        assert_eq!(
            kleene_and(&Value::True, &Value::Unknown),
            Value::Unknown
        );
        assert_eq!(kleene_and(&Value::False, &Value::Unknown), Value::False);
        assert_eq!(kleene_and(&Value::True, &Value::True), Value::True);
    }

    #[test]
    fn or_truth_table() {
        assert_eq!(kleene_or(&Value::True, &Value::Unknown), Value::True);
        assert_eq!(kleene_or(&Value::False, &Value::Unknown), Value::Unknown);
        assert_eq!(kleene_or(&Value::False, &Value::False), Value::False);
    }

    #[test]
    fn relational_cross_type_is_unknown() {
        let r = eval_relational(BinaryOp::Lt, &Value::real(1.0), &Value::str("a"));
        assert_eq!(r, Value::Unknown);
    }

    #[test]
    fn regex_match() {
        let r = eval_relational(BinaryOp::Match, &Value::str("hello123"), &Value::str("^hello"));
        assert_eq!(r, Value::True);
    }
}
