#[path = "support.rs"]
mod support;

use nb_eval::Value;

#[test]
fn when_rule_fires_once_then_removes_itself() {
    let mut e = support::engine();
    e.parse("define a cell 0;").unwrap();
    e.parse("define b cell 0;").unwrap();
    e.parse("define r when(a = 1) : assert b=2;").unwrap();

    let b = e.term("b");

    e.assert_and_react("a", Value::real(1.0)).unwrap();
    assert_eq!(e.evaluate(b), Value::real(2.0));

    e.assert_and_react("b", Value::real(0.0)).unwrap();
    e.assert_and_react("a", Value::real(0.0)).unwrap();
    e.assert_and_react("a", Value::real(1.0)).unwrap();

    // `r` already fired and undefined itself; the second 0->1 transition of
    // `a` does not put `b` back to 2.
    assert_eq!(e.evaluate(b), Value::real(0.0));
}
