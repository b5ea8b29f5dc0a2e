//! The rule-plan VM: a byte-stream of fixed-size instructions compiles a
//! procedural rule body (`{ ... }`) the way `define` compiles a condition
//! expression. The interpreter runs until an instruction yields (returns
//! no next instruction pointer); a timer alarm or a subscribed condition's
//! change resumes it from where it left off.
//!
//! The surface grammar in `nb-parse` covers the expression subset of §6;
//! procedural rule bodies are built directly as `Vec<Instr>` programs
//! through this module's API rather than parsed from source text.

use std::rc::Rc;

use nb_common::Value;
use nb_parse::time_ast::{CalendarUnit, TimeExpr};

use crate::action::AssertionSpec;
use crate::cell::CellId;

#[derive(Debug, Clone)]
pub enum Instr {
    LoopBegin { counter: usize, n: i64 },
    LoopEnd { counter: usize, jump: usize },
    Branch(usize),
    /// Jump to `jump` unless `cond` is currently True.
    If { cond: CellId, jump: usize },
    OnEnable { cond: CellId },
    WhenTest { cond: CellId },
    Step { unit: CalendarUnit, n: i64 },
    Align { tree: Rc<TimeExpr>, n: i64 },
    Wait { offset_seconds: i64 },
    Define { cell: CellId },
    Value(Value),
    Assert(Vec<AssertionSpec>),
    Command(String),
    Exit,
}

/// What a single `run` call to the interpreter produced.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Suspended; resumes when `cond` changes (`OnEnable`/`WhenTest`) or at
    /// the given wall-clock time (`Wait`).
    YieldOnCondition(CellId),
    YieldUntil(i64),
    /// The rule published its `value` and is ready for the next cycle
    /// (`Define`/`Value`).
    Published(Value),
    /// The rule's assertion list/command should be scheduled onto the
    /// ready list.
    Ready {
        assertions: Vec<AssertionSpec>,
        command: Option<String>,
    },
    Exited,
}

/// Per-program-instance mutable state: instruction pointer, loop
/// counters, and the rule's own notion of "time" that `Step`/`Align`
/// advance and `Wait` compares against `now`.
#[derive(Debug, Clone)]
pub struct VmState {
    pub ip: usize,
    pub counters: Vec<i64>,
    pub time: i64,
}

impl VmState {
    pub fn new() -> Self {
        Self {
            ip: 0,
            counters: Vec::new(),
            time: 0,
        }
    }
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}

/// Callbacks the VM needs from the engine while it runs: reading a cell's
/// current value, and casting a time-condition tree to find the n-th
/// interval boundary for `Align`. Kept minimal and trait-based so the
/// interpreter itself has no dependency on `Graph`/`Engine`.
pub trait VmHost {
    fn cell_value(&self, cell: CellId) -> Value;
    fn align(&self, tree: &TimeExpr, after: i64, n: i64) -> Option<i64>;
}

/// Runs `program` from `state.ip` until it yields or exits, advancing
/// `state` in place. `now` is the wall-clock the VM compares `Wait`
/// deadlines against.
pub fn run(program: &[Instr], state: &mut VmState, now: i64, host: &dyn VmHost) -> StepOutcome {
    loop {
        let Some(instr) = program.get(state.ip) else {
            return StepOutcome::Exited;
        };
        match instr {
            Instr::LoopBegin { counter, n } => {
                while state.counters.len() <= *counter {
                    state.counters.push(0);
                }
                state.counters[*counter] = *n;
                state.ip += 1;
            }
            Instr::LoopEnd { counter, jump } => {
                state.counters[*counter] -= 1;
                if state.counters[*counter] > 0 {
                    state.ip = *jump;
                } else {
                    state.ip += 1;
                }
            }
            Instr::Branch(target) => {
                state.ip = *target;
            }
            Instr::If { cond, jump } => {
                if host.cell_value(*cond).is_true() {
                    state.ip += 1;
                } else {
                    state.ip = *jump;
                }
            }
            Instr::OnEnable { cond } => {
                state.ip += 1;
                return StepOutcome::YieldOnCondition(*cond);
            }
            Instr::WhenTest { cond } => {
                if host.cell_value(*cond).is_true() {
                    state.ip += 1;
                } else {
                    return StepOutcome::YieldOnCondition(*cond);
                }
            }
            Instr::Step { unit, n } => {
                state.time = crate::calendar::step(*unit, state.time, *n);
                state.ip += 1;
            }
            Instr::Align { tree, n } => {
                if let Some(t) = host.align(tree, state.time.max(now), *n) {
                    state.time = t;
                }
                state.ip += 1;
            }
            Instr::Wait { offset_seconds } => {
                let deadline = state.time + offset_seconds;
                if deadline > now {
                    state.ip += 1;
                    return StepOutcome::YieldUntil(deadline);
                }
                state.ip += 1;
            }
            Instr::Define { cell } => {
                let v = host.cell_value(*cell);
                state.ip += 1;
                return StepOutcome::Published(v);
            }
            Instr::Value(v) => {
                let v = v.clone();
                state.ip += 1;
                return StepOutcome::Published(v);
            }
            Instr::Assert(assertions) => {
                let assertions = assertions.clone();
                state.ip += 1;
                return StepOutcome::Ready {
                    assertions,
                    command: None,
                };
            }
            Instr::Command(cmd) => {
                let cmd = cmd.clone();
                state.ip += 1;
                return StepOutcome::Ready {
                    assertions: Vec::new(),
                    command: Some(cmd),
                };
            }
            Instr::Exit => return StepOutcome::Exited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHost;
    impl VmHost for FakeHost {
        fn cell_value(&self, _cell: CellId) -> Value {
            Value::True
        }
        fn align(&self, _tree: &TimeExpr, after: i64, _n: i64) -> Option<i64> {
            Some(after)
        }
    }

    #[test]
    fn loop_runs_n_times_then_falls_through() {
        let program = vec![
            Instr::LoopBegin { counter: 0, n: 3 },
            Instr::LoopEnd {
                counter: 0,
                jump: 0,
            },
            Instr::Exit,
        ];
        let mut state = VmState::new();
        let host = FakeHost;
        let outcome = run(&program, &mut state, 0, &host);
        assert!(matches!(outcome, StepOutcome::Exited));
    }

    #[test]
    fn wait_yields_until_deadline() {
        let program = vec![Instr::Wait {
            offset_seconds: 100,
        }];
        let mut state = VmState::new();
        let host = FakeHost;
        match run(&program, &mut state, 0, &host) {
            StepOutcome::YieldUntil(t) => assert_eq!(t, 100),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
