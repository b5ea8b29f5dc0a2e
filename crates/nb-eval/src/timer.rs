//! The timer dispatcher: a priority queue of `(due_seconds, cell)` entries.
//! Internal to the engine core — it decides *which* cell's alarm fires
//! next — but the actual wall-clock wait is external: whenever the
//! earliest pending entry changes, the engine notifies the host's
//! `arm_timer`/`cancel_timer` callbacks so an outer event loop knows when
//! to next call [`crate::engine::Engine::tick`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::cell::CellId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: i64,
    seq: u64,
    cell: CellId,
}

/// A monotonically increasing generation tag, bumped every time a cell's
/// timer is re-armed; fired entries whose `seq` no longer matches the
/// cell's current generation are stale (the cell cancelled and re-armed
/// since this entry was queued) and are skipped rather than fired.
#[derive(Debug, Default)]
pub struct TimerDispatcher {
    heap: BinaryHeap<Reverse<Entry>>,
    generation: rustc_hash::FxHashMap<CellId, u64>,
    next_seq: u64,
}

impl TimerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) a one-shot timer for `cell` at `due` seconds.
    /// Returns `true` if this is now the earliest pending timer, so the
    /// caller should notify the host of a new wakeup deadline.
    pub fn arm(&mut self, cell: CellId, due: i64) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.generation.insert(cell, seq);
        self.heap.push(Reverse(Entry { due, seq, cell }));
        self.earliest_due() == Some(due)
    }

    /// Cancels `cell`'s pending timer, if any, by bumping its generation
    /// so the stale heap entry is skipped when popped.
    pub fn cancel(&mut self, cell: CellId) {
        self.generation.remove(&cell);
    }

    pub fn earliest_due(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(e)| e.due)
    }

    /// Pops and returns every cell whose timer is due at or before `now`,
    /// skipping stale (cancelled/superseded) entries.
    pub fn fire_due(&mut self, now: i64) -> Vec<CellId> {
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek().copied() {
            if entry.due > now {
                break;
            }
            self.heap.pop();
            if self.generation.get(&entry.cell) == Some(&entry.seq) {
                self.generation.remove(&entry.cell);
                fired.push(entry.cell);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_due_entries_in_order() {
        let mut d = TimerDispatcher::new();
        d.arm(CellId(1), 100);
        d.arm(CellId(2), 50);
        assert_eq!(d.fire_due(60), vec![CellId(2)]);
        assert_eq!(d.fire_due(200), vec![CellId(1)]);
    }

    #[test]
    fn rearm_supersedes_prior_entry() {
        let mut d = TimerDispatcher::new();
        d.arm(CellId(1), 100);
        d.arm(CellId(1), 200);
        assert_eq!(d.fire_due(150), Vec::<CellId>::new());
        assert_eq!(d.fire_due(200), vec![CellId(1)]);
    }

    #[test]
    fn cancel_suppresses_fire() {
        let mut d = TimerDispatcher::new();
        d.arm(CellId(1), 100);
        d.cancel(CellId(1));
        assert_eq!(d.fire_due(200), Vec::<CellId>::new());
    }
}
