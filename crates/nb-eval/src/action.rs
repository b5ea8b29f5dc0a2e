//! The imperative tail of a rule: an assertion list plus an optional
//! command string, plus the status state machine and priority queue that
//! drive when it actually runs.

use crate::cell::CellId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Ready,
    Scheduled,
    Processing,
    /// Fired and reclaimable; the spec's "ash list" state.
    Ash,
    /// Construction-time or firing-time error (e.g. re-fired while still
    /// `Scheduled`); the action is retained for inspection, not retried.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(pub u32);

/// One `term = value` assertion inside a rule's action tail. `value_cell`
/// is the already-built cell graph node for the right-hand side; firing
/// reads its current value and applies it to `term`.
#[derive(Debug, Clone)]
pub struct AssertionSpec {
    pub term: CellId,
    pub value_cell: CellId,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub rule: CellId,
    pub priority: i8,
    pub assertions: Vec<AssertionSpec>,
    pub command: Option<String>,
    pub status: ActionStatus,
    /// Insertion sequence, used only to break priority ties FIFO.
    pub seq: u64,
}

/// A single global list sorted by priority (highest first, ties FIFO).
/// Implemented as a plain `Vec` with insertion-sort placement rather than
/// a `BinaryHeap`: the queue is drained to empty every reaction cycle and
/// stays small (bounded by how many rules fire per stimulus), so the
/// simpler structure that preserves insertion order for free reads better
/// than reimplementing stable-heap tie-breaking.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Vec<(ActionId, Action)>,
    next_id: u32,
    next_seq: u64,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        rule: CellId,
        priority: i8,
        assertions: Vec<AssertionSpec>,
        command: Option<String>,
    ) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        let action = Action {
            rule,
            priority,
            assertions,
            command,
            status: ActionStatus::Scheduled,
            seq,
        };
        let pos = self
            .actions
            .iter()
            .position(|(_, a)| a.priority < priority)
            .unwrap_or(self.actions.len());
        self.actions.insert(pos, (id, action));
        id
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Pops the highest-priority, earliest-inserted action.
    pub fn pop_next(&mut self) -> Option<(ActionId, Action)> {
        if self.actions.is_empty() {
            return None;
        }
        Some(self.actions.remove(0))
    }

    pub fn is_scheduled(&self, rule: CellId) -> bool {
        self.actions.iter().any(|(_, a)| a.rule == rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_fires_first() {
        let mut q = ActionQueue::new();
        q.schedule(CellId(1), 5, Vec::new(), None);
        q.schedule(CellId(2), 9, Vec::new(), None);
        let (_, first) = q.pop_next().unwrap();
        assert_eq!(first.priority, 9);
    }

    #[test]
    fn ties_are_fifo() {
        let mut q = ActionQueue::new();
        q.schedule(CellId(1), 5, Vec::new(), None);
        q.schedule(CellId(2), 5, Vec::new(), None);
        let (_, first) = q.pop_next().unwrap();
        assert_eq!(first.rule, CellId(1));
    }
}
