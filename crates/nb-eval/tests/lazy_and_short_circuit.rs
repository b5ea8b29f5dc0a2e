#[path = "support.rs"]
mod support;

use nb_eval::Value;

#[test]
fn lazy_and_leaves_the_right_operand_unsubscribed_while_false() {
    let mut e = support::engine();
    e.parse("define left cell false;").unwrap();
    e.parse("define expensive cell 1;").unwrap();
    e.parse("define g cell left && expensive;").unwrap();

    let expensive = e.term("expensive");
    let g = e.term("g");

    assert_eq!(e.evaluate(g), Value::False);
    assert_eq!(e.graph().subscriber_count(expensive), 0);

    e.assert_and_react("left", Value::True).unwrap();

    assert_eq!(e.evaluate(g), Value::True);
    assert_eq!(e.graph().subscriber_count(expensive), 1);
}
