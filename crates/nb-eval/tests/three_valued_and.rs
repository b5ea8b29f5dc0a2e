#[path = "support.rs"]
mod support;

use nb_eval::Value;

#[test]
fn and_is_unknown_until_a_known_false_operand_dominates() {
    let mut e = support::engine();
    e.parse("define flag cell true;").unwrap();
    e.parse("define n cell 1;").unwrap();
    e.parse("define s cell \"a\";").unwrap();
    // Comparing a number to a string is well-typed but undecidable, so this
    // condition settles at Unknown rather than True or False.
    e.parse("define unk cell n = s;").unwrap();
    e.parse("define both cell unk & flag;").unwrap();

    let both = e.term("both");
    assert_eq!(e.evaluate(both), Value::Unknown);

    e.assert_and_react("flag", Value::False).unwrap();
    assert_eq!(e.evaluate(both), Value::False);
}
