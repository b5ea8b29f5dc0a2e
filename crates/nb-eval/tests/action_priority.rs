#[path = "support.rs"]
mod support;

use nb_eval::Value;

#[test]
fn higher_priority_rule_runs_first_so_the_lower_priority_write_wins() {
    let mut e = support::engine();
    e.parse("define a cell 0;").unwrap();
    e.parse("define log cell \"\";").unwrap();
    e.parse("define r1 on(a = 1) [5] : assert log=\"r1\";")
        .unwrap();
    e.parse("define r2 on(a = 1) [9] : assert log=\"r2\";")
        .unwrap();

    e.assert_and_react("a", Value::real(1.0)).unwrap();

    let log = e.term("log");
    // Both fire on the same stimulus; the action queue drains `r2` (priority
    // 9) before `r1` (priority 5), so `r1`'s write is the one left standing.
    assert_eq!(e.evaluate(log), Value::str("r1"));
}
