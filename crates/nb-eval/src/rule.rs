//! Rule-firing policy: when a rule cell's value transition should schedule
//! its action, independent of the action queue and the graph itself so it
//! stays simple to test and to reason about the three rule kinds in
//! isolation.

use nb_common::{NbError, NbErrorKind, Value};
use nb_parse::RuleKind;

use crate::cell::CellId;

/// Per-rule bookkeeping the engine keeps alongside the rule's cell in the
/// graph: its kind, priority, the term it's defined under (for `when`
/// self-undefine), and whether it's currently scheduled (the re-entrancy
/// guard from the error-handling design).
#[derive(Debug, Clone)]
pub struct RuleRecord {
    pub kind: RuleKind,
    pub condition: CellId,
    pub priority: i8,
    pub defining_term: CellId,
    pub scheduled: bool,
}

/// Decides whether a rule should fire given its condition's old/new value.
/// Returns `Ok(true)` to fire, `Ok(false)` to stay idle, or `Err` for the
/// "fired twice while Scheduled" cycle error (diagnosed, suppressed: the
/// caller logs it and leaves the action's status as `Error` rather than
/// scheduling a second one).
pub fn should_fire(kind: RuleKind, old: &Value, new: &Value, scheduled: bool) -> Result<bool, NbError> {
    let became_true = !old.is_true() && new.is_true();
    match kind {
        RuleKind::On | RuleKind::When => {
            if !became_true {
                return Ok(false);
            }
            if scheduled {
                return Err(NbError::new(
                    NbErrorKind::Cycle,
                    "rule fired again while its previous action was still scheduled",
                ));
            }
            Ok(true)
        }
        // `if`: present on the active if-list while true, fires on every
        // alert cycle regardless of whether the value itself changed, as
        // long as it's currently true.
        RuleKind::If => Ok(new.is_true()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_rule_fires_only_on_false_to_true_transition() {
        assert!(should_fire(RuleKind::On, &Value::False, &Value::True, false).unwrap());
        assert!(!should_fire(RuleKind::On, &Value::True, &Value::True, false).unwrap());
        assert!(should_fire(RuleKind::On, &Value::Unknown, &Value::True, false).unwrap());
    }

    #[test]
    fn refiring_while_scheduled_is_an_error() {
        assert!(should_fire(RuleKind::On, &Value::False, &Value::True, true).is_err());
    }

    #[test]
    fn if_rule_fires_on_every_alert_while_true() {
        assert!(should_fire(RuleKind::If, &Value::True, &Value::True, false).unwrap());
        assert!(!should_fire(RuleKind::If, &Value::True, &Value::False, false).unwrap());
    }
}
