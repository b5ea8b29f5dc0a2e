//! Property-based tests for the cell graph's structural invariants and the
//! action queue's draining order.

use std::rc::Rc;

use nb_eval::action::ActionQueue;
use nb_eval::{CellId, Graph, Value};
use nb_parse::ast::BinaryOp;
use proptest::prelude::*;

fn term(g: &mut Graph, index: usize, value: f64) -> CellId {
    let c = g.alloc_constant(Value::real(value));
    let t = g.alloc_term(Rc::from(format!("t{index}").as_str()));
    g.redefine_term(t, c);
    t
}

proptest! {
    /// Every cell sits strictly above each of its children in topological
    /// level, for a left-folded chain of additions of arbitrary length.
    #[test]
    fn parent_level_exceeds_every_child_level(values in prop::collection::vec(-1000.0f64..1000.0, 2..8)) {
        let mut g = Graph::new();
        let mut acc = term(&mut g, 0, values[0]);
        let mut edges = Vec::new();
        for (i, v) in values.iter().enumerate().skip(1) {
            let next = term(&mut g, i, *v);
            let parent = g.alloc_binary(BinaryOp::Add, acc, next);
            edges.push((parent, acc, next));
            acc = parent;
        }
        g.hold(acc);
        g.enable(acc);
        for (parent, l, r) in edges {
            prop_assert!(g.level(parent) > g.level(l));
            prop_assert!(g.level(parent) > g.level(r));
        }
    }

    /// Disabling then re-enabling a cell restores its prior value (the
    /// underlying constants haven't changed in between).
    #[test]
    fn disable_then_enable_round_trips_the_value(values in prop::collection::vec(-1000.0f64..1000.0, 2..8)) {
        let mut g = Graph::new();
        let mut acc = term(&mut g, 0, values[0]);
        for (i, v) in values.iter().enumerate().skip(1) {
            let next = term(&mut g, i, *v);
            acc = g.alloc_binary(BinaryOp::Add, acc, next);
        }
        g.hold(acc);
        g.enable(acc);
        let before = g.value(acc).clone();
        g.disable(acc);
        g.enable(acc);
        let after = g.value(acc).clone();
        prop_assert_eq!(before, after);
    }

    /// The action queue always pops highest priority first, and among
    /// equal priorities, earliest-scheduled first.
    #[test]
    fn action_queue_drains_by_priority_then_insertion_order(
        priorities in prop::collection::vec(-128i8..127, 1..20)
    ) {
        let mut q = ActionQueue::new();
        for (i, p) in priorities.iter().enumerate() {
            q.schedule(CellId(i as u32), *p, Vec::new(), None);
        }
        let mut popped = Vec::new();
        while let Some((_, action)) = q.pop_next() {
            popped.push(action);
        }
        for w in popped.windows(2) {
            let ok = w[0].priority > w[1].priority
                || (w[0].priority == w[1].priority && w[0].seq < w[1].seq);
            prop_assert!(ok);
        }
    }
}
