//! Real-valued arithmetic cells: `+ - * /` and unary negate. Any non-real
//! operand (including `Unknown`) promotes the result to `Unknown` rather
//! than erroring — arithmetic never raises, matching the spec's "three-
//! valued operators never raise" error-handling rule extended to numerics.

use nb_common::Value;
use nb_parse::ast::BinaryOp;

fn as_real(v: &Value) -> Option<f64> {
    match v {
        Value::Real(r) => Some(*r),
        _ => None,
    }
}

pub fn eval_negate(v: &Value) -> Value {
    match as_real(v) {
        Some(r) => Value::Real(-r),
        None => Value::Unknown,
    }
}

pub fn eval_binary_arith(op: BinaryOp, a: &Value, b: &Value) -> Value {
    match (as_real(a), as_real(b)) {
        (Some(x), Some(y)) => Value::Real(match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            _ => unreachable!("non-arithmetic op routed to eval_binary_arith: {op:?}"),
        }),
        _ => Value::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_numeric_operand_promotes_to_unknown() {
        assert_eq!(
            eval_binary_arith(BinaryOp::Add, &Value::real(1.0), &Value::Unknown),
            Value::Unknown
        );
        assert_eq!(
            eval_binary_arith(BinaryOp::Add, &Value::real(1.0), &Value::str("x")),
            Value::Unknown
        );
    }

    #[test]
    fn basic_arithmetic() {
        assert_eq!(
            eval_binary_arith(BinaryOp::Mul, &Value::real(3.0), &Value::real(4.0)),
            Value::Real(12.0)
        );
    }
}
