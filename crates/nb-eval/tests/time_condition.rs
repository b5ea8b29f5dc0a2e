#[path = "support.rs"]
mod support;

use nb_eval::Value;

const SECOND: f64 = 1.0;
const HOUR: f64 = 3600.0;

#[test]
fn on_rule_fires_once_when_the_hour_window_opens_and_not_when_it_closes() {
    // Epoch day zero (1970-01-01): 07:59:59 is one second before the
    // window opens, 08:00:00 opens it, 17:00:00 closes it.
    let mut e = support::engine_at(8.0 * HOUR - SECOND);
    e.parse("define c cell ~(h(8_17));").unwrap();
    e.parse("define fires cell 0;").unwrap();
    e.parse("define r on(c) : assert fires = fires + 1;")
        .unwrap();

    let c = e.term("c");
    let fires = e.term("fires");
    assert_eq!(e.evaluate(c), Value::False);
    assert_eq!(e.evaluate(fires), Value::real(0.0));

    e.tick(8.0 * HOUR).unwrap();
    assert_eq!(e.evaluate(c), Value::True);
    assert_eq!(e.evaluate(fires), Value::real(1.0));

    e.tick(17.0 * HOUR).unwrap();
    assert_eq!(e.evaluate(c), Value::False);
    assert_eq!(e.evaluate(fires), Value::real(1.0));
}
