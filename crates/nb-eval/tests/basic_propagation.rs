#[path = "support.rs"]
mod support;

use nb_eval::Value;

#[test]
fn sum_of_two_terms_propagates_through_a_comparison_rule() {
    let mut e = support::engine();
    e.parse("define a cell 0;").unwrap();
    e.parse("define b cell 0;").unwrap();
    e.parse("define s cell a + b;").unwrap();
    e.parse("define log cell 0;").unwrap();
    e.parse("define r on(s > 3) : assert log=1;").unwrap();

    let s = e.term("s");
    let log = e.term("log");
    assert_eq!(e.evaluate(s), Value::real(0.0));

    e.parse("assert a=2, b=2;").unwrap();

    assert_eq!(e.evaluate(s), Value::real(4.0));
    assert_eq!(e.evaluate(log), Value::real(1.0));
}

#[test]
fn single_assignments_pass_through_the_intermediate_sum() {
    let mut e = support::engine();
    e.parse("define a cell 0;").unwrap();
    e.parse("define b cell 0;").unwrap();
    e.parse("define s cell a + b;").unwrap();
    let s = e.term("s");

    e.assert_and_react("a", Value::real(2.0)).unwrap();
    assert_eq!(e.evaluate(s), Value::real(2.0));

    e.assert_and_react("b", Value::real(2.0)).unwrap();
    assert_eq!(e.evaluate(s), Value::real(4.0));
}
