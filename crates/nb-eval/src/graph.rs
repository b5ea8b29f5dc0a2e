//! The cell graph arena: hash-consing, enable/disable, and the publish/
//! alert reaction primitives. Grounded on the teacher's vertex-store
//! pattern (a single growable arena indexed by a newtype id, with edges
//! stored inline) but laid out as an array-of-structs rather than
//! struct-of-arrays: this graph's per-cell payload (a `Value`, possibly a
//! boxed `TimeExpr`) is far less uniform than a spreadsheet cell's, so the
//! columnar layout that pays off for bulk numeric recalculation doesn't
//! apply here. Ownership is child→parent only; subscriber lists are plain
//! `CellId` back-references, never reference-counted, per the design
//! note's resolution of the cyclic-reference risk.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::rc::Rc;

use nb_common::Value;
use nb_parse::ast::{BinaryOp, UnaryOp};
use nb_parse::time_ast::TimeExpr;
use nb_parse::RuleKind;

use crate::arithmetic;
use crate::cell::{CellId, CellKind, CellRecord, DelayKind};
use crate::condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConsKey {
    Unary(UnaryOpKey, CellId),
    Binary(BinaryOpKey, CellId, CellId),
    Change(CellId),
    Delay(DelayKeyTag, CellId, CellId),
}

// `UnaryOp`/`BinaryOp` aren't `Hash` (the parser AST favors `PartialEq`
// over a full derive set it doesn't otherwise need); thin copies here
// carry the derive this one hash-consing table needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct UnaryOpKey(u8);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BinaryOpKey(u8);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DelayKeyTag(u8);

fn unary_key(op: UnaryOp) -> UnaryOpKey {
    UnaryOpKey(op as u8)
}
fn binary_key(op: BinaryOp) -> BinaryOpKey {
    BinaryOpKey(op as u8)
}
fn delay_key(k: DelayKind) -> DelayKeyTag {
    DelayKeyTag(match k {
        DelayKind::True => 0,
        DelayKind::False => 1,
        DelayKind::Unknown => 2,
    })
}

pub struct Graph {
    cells: Vec<CellRecord>,
    cons: FxHashMap<ConsKey, CellId>,
    alert_queues: Vec<Vec<CellId>>,
    /// Cells pulsed True by a `~=` change detector this cycle; reverted to
    /// False once the alert queues drain, modeling "returns to False at
    /// end of cycle".
    pub(crate) pending_reverts: Vec<CellId>,
    /// `Time`/`Delay` cells that just transitioned from disabled to
    /// enabled; the graph alone has no `now()` to seed their initial
    /// membership value or arm a timer, so the engine drains this list
    /// after every `enable` to finish their setup.
    pending_time_enables: Vec<CellId>,
    pub true_const: CellId,
    pub false_const: CellId,
    pub unknown_const: CellId,
    pub placeholder_const: CellId,
}

impl Graph {
    pub fn new() -> Self {
        let mut cells = Vec::new();
        let mut mk = |v: Value| {
            let mut rec = CellRecord::new(CellKind::Constant, SmallVec::new());
            rec.value = v;
            rec.enabled = true;
            rec.holds = 1;
            cells.push(rec);
            CellId((cells.len() - 1) as u32)
        };
        let true_const = mk(Value::True);
        let false_const = mk(Value::False);
        let unknown_const = mk(Value::Unknown);
        let placeholder_const = mk(Value::Placeholder);
        Self {
            cells,
            cons: FxHashMap::default(),
            alert_queues: Vec::new(),
            pending_reverts: Vec::new(),
            pending_time_enables: Vec::new(),
            true_const,
            false_const,
            unknown_const,
            placeholder_const,
        }
    }

    fn push(&mut self, rec: CellRecord) -> CellId {
        self.cells.push(rec);
        CellId((self.cells.len() - 1) as u32)
    }

    pub fn value(&self, id: CellId) -> &Value {
        &self.cells[id.idx()].value
    }

    pub fn level(&self, id: CellId) -> u32 {
        self.cells[id.idx()].level
    }

    pub fn kind(&self, id: CellId) -> &CellKind {
        &self.cells[id.idx()].kind
    }

    pub fn is_enabled(&self, id: CellId) -> bool {
        self.cells[id.idx()].enabled
    }

    pub fn children(&self, id: CellId) -> &[CellId] {
        &self.cells[id.idx()].children
    }

    pub fn subscriber_count(&self, id: CellId) -> usize {
        self.cells[id.idx()].subscribers.len()
    }

    pub fn name(&self, id: CellId) -> Option<Rc<str>> {
        self.cells[id.idx()].name.clone()
    }

    /// The cell a `Term` currently points at, if any and if `id` is a
    /// term at all. Returns a bare `CellId` rather than the `CellKind`
    /// itself so callers can drop the borrow before mutating the graph.
    pub fn term_target(&self, id: CellId) -> Option<CellId> {
        match self.cells[id.idx()].kind {
            CellKind::Term { target } => target,
            _ => None,
        }
    }

    pub fn is_constant(&self, id: CellId) -> bool {
        matches!(self.cells[id.idx()].kind, CellKind::Constant)
    }

    /// Drains the cells whose `Time` kind just became enabled this call,
    /// for the engine to seed with a schedule cache and initial value.
    pub fn drain_pending_time_enables(&mut self) -> Vec<CellId> {
        std::mem::take(&mut self.pending_time_enables)
    }

    /// Directly mutates any cell's value (not just a `Constant`'s), for
    /// state that's driven by an external timer firing rather than by its
    /// children recomputing: a `Time` cell's membership flipping at a cast
    /// edge, or a `Delay` cell's duration expiring. Enqueues subscribers if
    /// the value changed.
    pub fn external_change(&mut self, id: CellId, value: Value) -> Value {
        let old = self.cells[id.idx()].value.clone();
        self.cells[id.idx()].value = value.clone();
        if value != old {
            self.enqueue_subscribers(id);
        }
        old
    }

    pub fn hold(&mut self, id: CellId) {
        self.cells[id.idx()].holds += 1;
    }

    pub fn unhold(&mut self, id: CellId) {
        let rec = &mut self.cells[id.idx()];
        rec.holds = rec.holds.saturating_sub(1);
        if rec.holds == 0 && rec.subscribers.is_empty() {
            self.disable(id);
        }
    }

    // -- allocation / hash-consing --------------------------------------

    pub fn alloc_constant(&mut self, value: Value) -> CellId {
        match value {
            Value::True => self.true_const,
            Value::False => self.false_const,
            Value::Unknown => self.unknown_const,
            Value::Placeholder => self.placeholder_const,
            other => {
                let mut rec = CellRecord::new(CellKind::Constant, SmallVec::new());
                rec.value = other;
                rec.enabled = true;
                self.push(rec)
            }
        }
    }

    pub fn alloc_term(&mut self, name: Rc<str>) -> CellId {
        let mut rec = CellRecord::new(CellKind::Term { target: None }, SmallVec::new());
        rec.value = Value::Placeholder;
        rec.name = Some(name);
        self.push(rec)
    }

    /// Repoints a term at a new defining cell, holding the new target and
    /// releasing the old one. Existing subscribers of the term are
    /// unaffected: they hold the term's `CellId`, not the target's.
    pub fn redefine_term(&mut self, term: CellId, new_target: CellId) {
        let was_enabled = self.cells[term.idx()].enabled;
        if let CellKind::Term {
            target: Some(old), ..
        } = self.cells[term.idx()].kind.clone()
        {
            if was_enabled {
                self.unsubscribe(old, term);
            }
            self.unhold(old);
        }
        self.hold(new_target);
        self.cells[term.idx()].kind = CellKind::Term {
            target: Some(new_target),
        };
        if was_enabled {
            self.enable(new_target);
            self.subscribe_raw(new_target, term);
            self.cells[term.idx()].level = self.level(new_target) + 1;
            let v = self.compute(term);
            self.set_value(term, v);
        }
    }

    pub fn alloc_unary(&mut self, op: UnaryOp, child: CellId) -> CellId {
        if let CellKind::Constant = &self.cells[child.idx()].kind {
            let v = condition::eval_unary(op, &self.cells[child.idx()].value.clone());
            return self.alloc_constant(v);
        }
        let key = ConsKey::Unary(unary_key(op), child);
        if let Some(&id) = self.cons.get(&key) {
            return id;
        }
        let id = self.push(CellRecord::new(CellKind::Unary(op), SmallVec::from_slice(&[child])));
        self.cons.insert(key, id);
        id
    }

    pub fn alloc_binary(&mut self, op: BinaryOp, l: CellId, r: CellId) -> CellId {
        let both_const = matches!(self.cells[l.idx()].kind, CellKind::Constant)
            && matches!(self.cells[r.idx()].kind, CellKind::Constant)
            && !matches!(op, BinaryOp::LazyAnd | BinaryOp::LazyOr);
        if both_const {
            let lv = self.cells[l.idx()].value.clone();
            let rv = self.cells[r.idx()].value.clone();
            let v = eval_binary_pure(op, &lv, &rv, &Value::Unknown);
            return self.alloc_constant(v);
        }
        let key = ConsKey::Binary(binary_key(op), l, r);
        if let Some(&id) = self.cons.get(&key) {
            return id;
        }
        let id = self.push(CellRecord::new(CellKind::Binary(op), SmallVec::from_slice(&[l, r])));
        self.cons.insert(key, id);
        id
    }

    pub fn alloc_change(&mut self, child: CellId) -> CellId {
        let key = ConsKey::Change(child);
        if let Some(&id) = self.cons.get(&key) {
            return id;
        }
        let id = self.push(CellRecord::new(CellKind::Change, SmallVec::from_slice(&[child])));
        self.cons.insert(key, id);
        id
    }

    pub fn alloc_delay(&mut self, kind: DelayKind, cond: CellId, schedule: CellId) -> CellId {
        let key = ConsKey::Delay(delay_key(kind), cond, schedule);
        if let Some(&id) = self.cons.get(&key) {
            return id;
        }
        let id = self.push(CellRecord::new(
            CellKind::Delay(kind),
            SmallVec::from_slice(&[cond, schedule]),
        ));
        self.cons.insert(key, id);
        id
    }

    pub fn alloc_time(&mut self, expr: Rc<TimeExpr>) -> CellId {
        self.push(CellRecord::new(CellKind::Time(expr), SmallVec::new()))
    }

    pub fn alloc_rule(&mut self, kind: RuleKind, condition: CellId) -> CellId {
        self.push(CellRecord::new(CellKind::Rule(kind), SmallVec::from_slice(&[condition])))
    }

    // -- enable / disable -------------------------------------------------

    pub fn enable(&mut self, id: CellId) {
        if self.cells[id.idx()].enabled {
            return;
        }
        let kind = self.cells[id.idx()].kind.clone();
        match &kind {
            CellKind::Constant => {
                self.cells[id.idx()].enabled = true;
            }
            CellKind::Term { target } => {
                if let Some(t) = *target {
                    self.enable(t);
                    self.subscribe_raw(t, id);
                    self.cells[id.idx()].level = self.level(t) + 1;
                }
                self.cells[id.idx()].enabled = true;
                let v = self.compute(id);
                self.set_value(id, v);
            }
            CellKind::Binary(op) if is_lazy(*op) => {
                let children = self.cells[id.idx()].children.clone();
                let (l, r) = (children[0], children[1]);
                self.enable(l);
                self.subscribe_raw(l, id);
                self.cells[id.idx()].level = self.level(l) + 1;
                self.cells[id.idx()].enabled = true;
                let lv = self.value(l).clone();
                if needs_right(*op, &lv) {
                    self.enable(r);
                    self.subscribe_raw(r, id);
                    let lvl = self.cells[id.idx()].level.max(self.level(r) + 1);
                    self.cells[id.idx()].level = lvl;
                }
                let v = self.compute(id);
                self.set_value(id, v);
            }
            CellKind::Time(_) => {
                self.cells[id.idx()].enabled = true;
                self.cells[id.idx()].level = 0;
                // Initial membership value is set by the time engine
                // (`Engine::finalize_time_enables`), which needs `now()`
                // from the host; the graph alone only flips the enabled
                // bit and records that this cell is waiting for it.
                self.pending_time_enables.push(id);
            }
            CellKind::Delay(_) => {
                let children = self.cells[id.idx()].children.clone();
                let mut level = 0u32;
                for c in &children {
                    self.enable(*c);
                    self.subscribe_raw(*c, id);
                    level = level.max(self.level(*c) + 1);
                }
                self.cells[id.idx()].level = level;
                self.cells[id.idx()].enabled = true;
                self.cells[id.idx()].value = Value::Unknown;
                self.pending_time_enables.push(id);
            }
            CellKind::Change => {
                let children = self.cells[id.idx()].children.clone();
                let mut level = 0u32;
                for c in &children {
                    self.enable(*c);
                    self.subscribe_raw(*c, id);
                    level = level.max(self.level(*c) + 1);
                }
                self.cells[id.idx()].level = level;
                self.cells[id.idx()].enabled = true;
                self.cells[id.idx()].value = Value::False;
            }
            _ => {
                let children = self.cells[id.idx()].children.clone();
                let mut level = 0u32;
                for c in &children {
                    self.enable(*c);
                    self.subscribe_raw(*c, id);
                    level = level.max(self.level(*c) + 1);
                }
                self.cells[id.idx()].level = level;
                self.cells[id.idx()].enabled = true;
                let v = self.compute(id);
                self.set_value(id, v);
            }
        }
    }

    pub fn disable(&mut self, id: CellId) {
        if !self.cells[id.idx()].enabled {
            return;
        }
        let children = self.cells[id.idx()].children.clone();
        for c in &children {
            self.unsubscribe(*c, id);
        }
        self.cells[id.idx()].enabled = false;
        self.cells[id.idx()].value = Value::Disabled;
    }

    fn subscribe_raw(&mut self, child: CellId, parent: CellId) {
        let subs = &mut self.cells[child.idx()].subscribers;
        if !subs.contains(&parent) {
            subs.push(parent);
        }
    }

    fn unsubscribe(&mut self, child: CellId, parent: CellId) {
        self.cells[child.idx()].subscribers.retain(|&s| s != parent);
        let rec = &self.cells[child.idx()];
        if rec.subscribers.is_empty() && rec.holds == 0 {
            self.disable(child);
        }
    }

    // -- compute / reaction loop ------------------------------------------

    pub fn compute(&mut self, id: CellId) -> Value {
        let kind = self.cells[id.idx()].kind.clone();
        match &kind {
            CellKind::Constant => self.cells[id.idx()].value.clone(),
            CellKind::Term { target } => match target {
                Some(t) => self.value(*t).clone(),
                None => Value::Placeholder,
            },
            CellKind::Unary(op) => {
                let c = self.cells[id.idx()].children[0];
                if matches!(op, UnaryOp::Negate) {
                    arithmetic::eval_negate(self.value(c))
                } else {
                    condition::eval_unary(*op, self.value(c))
                }
            }
            CellKind::Binary(op) => {
                let children = self.cells[id.idx()].children.clone();
                let l = self.value(children[0]).clone();
                let r = if children.len() > 1 && self.cells[children[1].idx()].enabled {
                    self.value(children[1]).clone()
                } else {
                    Value::Unknown
                };
                let prev = self.cells[id.idx()].prev_state.clone();
                let out = eval_binary_pure(*op, &l, &r, &prev);
                if matches!(op, BinaryOp::FlipFlop | BinaryOp::Capture) {
                    self.cells[id.idx()].prev_state = out.clone();
                }
                out
            }
            CellKind::Change => self.cells[id.idx()].value.clone(),
            CellKind::Delay(_) => self.cells[id.idx()].value.clone(),
            CellKind::Time(_) => self.cells[id.idx()].value.clone(),
            CellKind::Rule(_) => {
                let c = self.cells[id.idx()].children[0];
                self.value(c).clone()
            }
        }
    }

    pub fn set_value(&mut self, id: CellId, value: Value) {
        self.cells[id.idx()].value = value;
    }

    /// Enqueues `id`'s subscribers onto the per-level alert lists, per the
    /// spec's "publish" primitive: a change *announces itself to listeners*
    /// rather than re-queuing itself.
    pub fn enqueue_subscribers(&mut self, id: CellId) {
        let subs = self.cells[id.idx()].subscribers.clone();
        for s in subs {
            let lvl = self.cells[s.idx()].level as usize;
            while self.alert_queues.len() <= lvl {
                self.alert_queues.push(Vec::new());
            }
            if !self.alert_queues[lvl].contains(&s) {
                self.alert_queues[lvl].push(s);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.alert_queues.iter().any(|q| !q.is_empty())
    }

    pub fn pop_pending(&mut self) -> Option<CellId> {
        for q in self.alert_queues.iter_mut() {
            if !q.is_empty() {
                return Some(q.remove(0));
            }
        }
        None
    }

    /// Recomputes `id` and, if the value changed, enqueues its
    /// subscribers. Returns `(old, new)` so callers (the rule layer, the
    /// change-detector pulse logic) can inspect the transition.
    pub fn step(&mut self, id: CellId) -> (Value, Value) {
        let old = self.cells[id.idx()].value.clone();
        if !self.cells[id.idx()].enabled {
            return (old.clone(), old);
        }
        self.maybe_resubscribe_lazy(id);
        let new = self.compute(id);
        self.cells[id.idx()].value = new.clone();
        if new != old {
            self.enqueue_subscribers(id);
        }
        (old, new)
    }

    /// Lazy `&&`/`||` cells must (un)subscribe their right operand as the
    /// left operand's value settles, since the right subscription is not
    /// part of the normal enable-time wiring.
    fn maybe_resubscribe_lazy(&mut self, id: CellId) {
        let kind = self.cells[id.idx()].kind.clone();
        let CellKind::Binary(op) = kind else { return };
        if !is_lazy(op) {
            return;
        }
        let children = self.cells[id.idx()].children.clone();
        let (l, r) = (children[0], children[1]);
        let lv = self.value(l).clone();
        let want_right = needs_right(op, &lv);
        let have_right = self.cells[r.idx()].subscribers.contains(&id);
        if want_right && !have_right {
            self.enable(r);
            self.subscribe_raw(r, id);
            let lvl = self.cells[id.idx()].level.max(self.level(r) + 1);
            self.cells[id.idx()].level = lvl;
        } else if !want_right && have_right {
            self.unsubscribe(r, id);
        }
    }

    /// Directly mutates a constant cell's value (the `assert` entry
    /// point) and enqueues subscribers if it changed. Returns the old
    /// value.
    pub fn assert_constant(&mut self, id: CellId, value: Value) -> Value {
        let old = self.cells[id.idx()].value.clone();
        self.cells[id.idx()].value = value.clone();
        if value != old {
            self.enqueue_subscribers(id);
        }
        old
    }

    /// Drains the pending-revert list (`~=` pulses), setting each back to
    /// False and publishing. Called once the alert queues have emptied.
    pub fn drain_reverts(&mut self) -> bool {
        if self.pending_reverts.is_empty() {
            return false;
        }
        let reverts = std::mem::take(&mut self.pending_reverts);
        for id in reverts {
            self.cells[id.idx()].value = Value::False;
            self.enqueue_subscribers(id);
        }
        true
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

fn is_lazy(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::LazyAnd | BinaryOp::LazyOr)
}

fn needs_right(op: BinaryOp, left: &Value) -> bool {
    match op {
        BinaryOp::LazyAnd => !left.is_false(),
        BinaryOp::LazyOr => !matches!(left, Value::True),
        _ => true,
    }
}

fn eval_binary_pure(op: BinaryOp, a: &Value, b: &Value, prev: &Value) -> Value {
    use BinaryOp::*;
    match op {
        Or | LazyOr | Nor | Xor | And | LazyAnd | Nand | Default | FlipFlop | Then | Capture => {
            condition::eval_binary_bool(op, a, b, prev)
        }
        Eq | Ne | Lt | Le | Gt | Ge | Match => condition::eval_relational(op, a, b),
        Add | Sub | Mul | Div => arithmetic::eval_binary_arith(op, a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing_dedupes_identical_binary_cells() {
        let mut g = Graph::new();
        let a = g.alloc_term(Rc::from("a"));
        let b = g.alloc_term(Rc::from("b"));
        let s1 = g.alloc_binary(BinaryOp::Add, a, b);
        let s2 = g.alloc_binary(BinaryOp::Add, a, b);
        assert_eq!(s1, s2);
    }

    #[test]
    fn constant_folding_skips_cell_construction() {
        let mut g = Graph::new();
        let one = g.alloc_constant(Value::real(1.0));
        let two = g.alloc_constant(Value::real(2.0));
        let sum = g.alloc_binary(BinaryOp::Add, one, two);
        assert!(matches!(g.kind(sum), CellKind::Constant));
        assert_eq!(*g.value(sum), Value::real(3.0));
    }

    #[test]
    fn level_is_greater_than_every_child() {
        let mut g = Graph::new();
        let a = g.alloc_term(Rc::from("a"));
        let a_val = g.alloc_constant(Value::real(1.0));
        g.redefine_term(a, a_val);
        g.enable(a);
        let b = g.alloc_term(Rc::from("b"));
        let b_val = g.alloc_constant(Value::real(2.0));
        g.redefine_term(b, b_val);
        g.enable(b);
        let sum = g.alloc_binary(BinaryOp::Add, a, b);
        g.enable(sum);
        assert!(g.level(sum) > g.level(a));
        assert!(g.level(sum) > g.level(b));
    }

    #[test]
    fn disable_then_enable_restores_value() {
        let mut g = Graph::new();
        let c = g.alloc_constant(Value::real(5.0));
        g.hold(c);
        g.enable(c);
        let before = g.value(c).clone();
        g.disable(c);
        g.enable(c);
        assert_eq!(*g.value(c), before);
    }

    #[test]
    fn lazy_and_does_not_subscribe_right_when_left_false() {
        let mut g = Graph::new();
        let left = g.alloc_term(Rc::from("left"));
        let left_val = g.alloc_constant(Value::False);
        g.redefine_term(left, left_val);
        let right = g.alloc_term(Rc::from("right"));
        let right_val = g.alloc_constant(Value::True);
        g.redefine_term(right, right_val);
        let gate = g.alloc_binary(BinaryOp::LazyAnd, left, right);
        g.hold(gate);
        g.enable(gate);
        assert_eq!(g.subscriber_count(right), 0);
    }
}
