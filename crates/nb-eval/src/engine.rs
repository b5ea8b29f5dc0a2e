//! The top-level facade: owns the cell graph, the name table, rule
//! bookkeeping, the action queue, and the timer dispatcher, and drives the
//! reaction loop described in the concurrency model ("each react() call
//! runs eval/publish/alert to completion, draining the graph's alert
//! queues lowest-level-first, then the action queue, until both are
//! empty"). Everything that touches the outside world — the wall clock,
//! arming a wakeup, running a command, logging — goes through the
//! `EngineHost` a caller supplies at construction.

use std::collections::HashMap;
use std::rc::Rc;

use nb_common::{NbError, NbErrorKind, Value};
use nb_parse::ast::{Assertion, CellExpr, DefineBody, PlanStmt, Statement};
use nb_parse::time_ast::TimeExpr;
use nb_parse::RuleKind;

use crate::action::{Action, ActionQueue, AssertionSpec};
use crate::cell::{CellId, CellKind};
use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::rule::{self, RuleRecord};
use crate::time_engine::{nth_interval_start_after, ScheduleCache};
use crate::timer::TimerDispatcher;
use crate::traits::{EngineHost, LogLevel};
use crate::vm::{self, Instr, StepOutcome, VmState};

/// A compiled procedural rule body together with its resumable run state,
/// kept alive for as long as the rule's action is mid-flight (between a
/// `Wait`/`OnEnable` yield and the next time it's driven forward).
#[derive(Debug, Clone)]
struct VmRuleState {
    program: Rc<Vec<Instr>>,
    state: VmState,
}

/// Turns a cell's value into a process exit code: `True`/`False` map to the
/// conventional success/failure codes, a real number rounds to the nearest
/// integer (warning if it wasn't already one), and anything without a
/// sensible numeric reading (a string, or a three-valued sentinel) falls
/// back to 1 with a warning. Grounded on `nbcmd.c`'s `exit` command.
fn exit_code_for_value(value: &Value) -> (i32, Option<String>) {
    match value {
        Value::True => (0, None),
        Value::False => (1, None),
        Value::Real(n) => {
            let rounded = n.round();
            if (rounded - n).abs() > f64::EPSILON {
                (
                    rounded as i32,
                    Some(format!("rounded non-integer exit value {n} to {rounded}")),
                )
            } else {
                (rounded as i32, None)
            }
        }
        Value::Str(s) => (
            1,
            Some(format!("non-numeric exit value \"{s}\" treated as 1")),
        ),
        Value::Unknown | Value::Disabled | Value::Placeholder => (
            1,
            Some(format!("{value:?} has no numeric exit value, treated as 1")),
        ),
    }
}

/// Resolves term names to the `CellId` of the term cell the engine
/// allocated for them. Separate from `Graph` so the graph itself stays
/// name-agnostic (besides the debug-only `name` field on a cell record).
#[derive(Debug, Default)]
struct Context {
    terms: HashMap<Rc<str>, CellId>,
}

/// The declarative core of NodeBrain: parses statements, builds/maintains
/// the cell graph, and runs rules to completion on every stimulus.
pub struct Engine {
    graph: Graph,
    context: Context,
    rules: HashMap<CellId, RuleRecord>,
    actions: ActionQueue,
    timers: TimerDispatcher,
    schedules: HashMap<CellId, ScheduleCache>,
    config: EngineConfig,
    host: Box<dyn EngineHost>,
    sink: Option<Box<dyn FnMut(&str, &Value)>>,
    /// A rule's assertion list and command text, keyed by its cell id.
    /// Kept out of `RuleRecord` so the small, `Clone`-friendly record used
    /// by `should_fire`'s borrow-then-call pattern doesn't drag the
    /// (potentially large) action tail along with it.
    rule_assertions: HashMap<CellId, (Vec<AssertionSpec>, Option<String>)>,
    /// `if`-kind rule cells currently defined: re-evaluated once per
    /// `react()` cycle regardless of whether the condition's own value
    /// changed this cycle, since `on_cell_changed` only ever runs on a
    /// transition.
    if_rules: Vec<CellId>,
    /// Procedural (`{...}`) rule bodies, keyed by their rule cell, and
    /// still running or suspended mid-plan.
    vm_programs: HashMap<CellId, VmRuleState>,
    /// Cells an `on`/`onif`/`if` plan statement is currently waiting on:
    /// when the key changes, every rule in the value drives forward again.
    vm_waiters: HashMap<CellId, Vec<CellId>>,
}

impl Engine {
    pub fn new(host: Box<dyn EngineHost>, config: EngineConfig) -> Self {
        Self {
            graph: Graph::new(),
            context: Context::default(),
            rules: HashMap::new(),
            actions: ActionQueue::new(),
            timers: TimerDispatcher::new(),
            schedules: HashMap::new(),
            config,
            host,
            sink: None,
            rule_assertions: HashMap::new(),
            if_rules: Vec::new(),
            vm_programs: HashMap::new(),
            vm_waiters: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Registers the single callback that receives every named cell's
    /// published value (the "subscribe" surface from the public API).
    pub fn subscribe(&mut self, sink: impl FnMut(&str, &Value) + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Looks a term up by its already-resolved `CellId`.
    pub fn evaluate(&self, cell: CellId) -> Value {
        self.graph.value(cell).clone()
    }

    /// Looks a term up by name, creating an unbound placeholder if it has
    /// never been referenced before.
    pub fn term(&mut self, name: &str) -> CellId {
        self.get_or_create_term(name)
    }

    // -- parsing / statement execution ------------------------------------

    pub fn parse(&mut self, source: &str) -> Result<(), NbError> {
        let stmt = nb_parse::parse_statement(source)?;
        self.apply_statement(&stmt)
    }

    fn apply_statement(&mut self, stmt: &Statement) -> Result<(), NbError> {
        match stmt {
            Statement::Define { name, body } => self.handle_define(name, body),
            Statement::Assert(list) => self.handle_assert_statement(list),
            Statement::Alert(list) => self.handle_assert_statement(list),
            Statement::Show(name) => {
                self.handle_show(name);
                Ok(())
            }
            Statement::Undefine(name) => {
                self.handle_undefine(name);
                Ok(())
            }
        }
    }

    fn handle_define(&mut self, name: &str, body: &DefineBody) -> Result<(), NbError> {
        match body {
            DefineBody::Cell(expr) => {
                let cell = self.build_cell(expr)?;
                let term = self.get_or_create_term(name);
                self.graph.redefine_term(term, cell);
                self.graph.hold(term);
                self.graph.enable(term);
                self.finalize_time_enables()?;
                Ok(())
            }
            DefineBody::Rule {
                kind,
                condition,
                priority,
                assertions,
                command,
                plan,
            } => {
                let cond_cell = self.build_cell(condition)?;
                let rule_cell = self.graph.alloc_rule(*kind, cond_cell);
                let term = self.get_or_create_term(name);
                self.graph.redefine_term(term, rule_cell);
                self.graph.hold(term);
                self.rules.insert(
                    rule_cell,
                    RuleRecord {
                        kind: *kind,
                        condition: cond_cell,
                        priority: *priority,
                        defining_term: term,
                        scheduled: false,
                    },
                );
                if let Some(stmts) = plan {
                    let program = self.compile_plan(stmts)?;
                    self.vm_programs.insert(
                        rule_cell,
                        VmRuleState {
                            program: Rc::new(program),
                            state: VmState::new(),
                        },
                    );
                } else {
                    let mut specs = Vec::with_capacity(assertions.len());
                    for a in assertions {
                        let a_term = self.get_or_create_term(&a.term);
                        let value_cell = self.build_cell(&a.value)?;
                        specs.push(AssertionSpec {
                            term: a_term,
                            value_cell,
                        });
                    }
                    self.rule_assertions.insert(rule_cell, (specs, command.clone()));
                }
                if *kind == RuleKind::If {
                    self.if_rules.push(rule_cell);
                }
                self.graph.enable(term);
                self.finalize_time_enables()?;
                Ok(())
            }
        }
    }

    fn handle_assert_statement(&mut self, list: &[Assertion]) -> Result<(), NbError> {
        let mut resolved = Vec::with_capacity(list.len());
        for a in list {
            let value_cell = self.build_cell(&a.value)?;
            self.graph.hold(value_cell);
            self.graph.enable(value_cell);
            self.finalize_time_enables()?;
            let v = self.graph.value(value_cell).clone();
            self.graph.unhold(value_cell);
            resolved.push((a.term.clone(), v));
        }
        for (name, value) in resolved {
            self.assert(&name, value);
        }
        self.react()
    }

    fn handle_show(&mut self, name: &str) {
        match self.context.terms.get(name).copied() {
            Some(term) => {
                let v = self.graph.value(term).clone();
                self.host.log(LogLevel::Info, &format!("{name} = {v}"));
            }
            None => self.host.log(LogLevel::Error, &format!("show of undefined term '{name}'")),
        }
    }

    fn handle_undefine(&mut self, name: &str) {
        if let Some(term) = self.context.terms.remove(name) {
            self.undefine_term(term);
        }
    }

    fn undefine_term(&mut self, term: CellId) {
        if let Some(name) = self.graph.name(term) {
            self.context.terms.remove(&name);
        }
        if let Some(t) = self.graph.term_target(term) {
            self.rules.remove(&t);
            self.rule_assertions.remove(&t);
            self.if_rules.retain(|&id| id != t);
            self.vm_programs.remove(&t);
            self.timers.cancel(t);
            for waiters in self.vm_waiters.values_mut() {
                waiters.retain(|&id| id != t);
            }
        }
        self.graph.unhold(term);
    }

    // -- assertion / alert entry points ------------------------------------

    /// Sets a free (non-welded) term's value directly, then reacts.
    /// Assigning to a computed term is a type error and the assertion is
    /// dropped, per the object/type system's weld rule.
    pub fn assert(&mut self, name: &str, value: Value) {
        let term = self.get_or_create_term(name);
        match self.graph.term_target(term) {
            Some(t) if self.graph.is_constant(t) => {
                self.graph.assert_constant(t, value);
            }
            Some(_) => {
                self.host
                    .log(LogLevel::Error, &format!("assignment to welded term '{name}'"));
            }
            None => {
                self.host
                    .log(LogLevel::Error, &format!("assert on undefined term '{name}'"));
            }
        }
    }

    pub fn assert_and_react(&mut self, name: &str, value: Value) -> Result<(), NbError> {
        self.assert(name, value);
        self.react()
    }

    // -- cell construction --------------------------------------------------

    fn build_cell(&mut self, expr: &CellExpr) -> Result<CellId, NbError> {
        Ok(match expr {
            CellExpr::Literal(lit) => self.graph.alloc_constant(Value::from(lit)),
            CellExpr::Term(name) => self.get_or_create_term(name),
            CellExpr::Unary(op, inner) => {
                let c = self.build_cell(inner)?;
                self.graph.alloc_unary(*op, c)
            }
            CellExpr::Binary(op, l, r) => {
                let lc = self.build_cell(l)?;
                let rc = self.build_cell(r)?;
                self.graph.alloc_binary(*op, lc, rc)
            }
            CellExpr::Time(t) => self.graph.alloc_time(Rc::new(t.clone())),
            CellExpr::Delay(kind, cond, schedule) => {
                let c = self.build_cell(cond)?;
                let s = self.build_cell(schedule)?;
                self.graph.alloc_delay((*kind).into(), c, s)
            }
            CellExpr::Eval(inner) => self.build_cell(inner)?,
        })
    }

    fn get_or_create_term(&mut self, name: &str) -> CellId {
        if let Some(&id) = self.context.terms.get(name) {
            return id;
        }
        let rc: Rc<str> = Rc::from(name);
        let id = self.graph.alloc_term(rc.clone());
        self.context.terms.insert(rc, id);
        id
    }

    /// Seeds the schedule cache (and arms the first timer) for every
    /// `Time`/`Delay` cell that became enabled during the last graph
    /// mutation. The graph itself can't do this: it has no `now()`.
    fn finalize_time_enables(&mut self) -> Result<(), NbError> {
        let pending = self.graph.drain_pending_time_enables();
        for id in pending {
            match self.graph.kind(id).clone() {
                CellKind::Time(expr) => {
                    let now = self.host.now() as i64;
                    let cache = ScheduleCache::new(&expr, now, &self.config)?;
                    let value = if cache.contains(now) { Value::True } else { Value::False };
                    self.graph.set_value(id, value);
                    if let Some(edge) = cache.set.next_edge_after(now) {
                        self.timers.arm(id, edge);
                    }
                    self.schedules.insert(id, cache);
                }
                CellKind::Delay(_) => {
                    // Starts idle (Unknown) until the condition makes a
                    // qualifying transition; `on_cell_changed` arms the
                    // duration timer at that point.
                }
                _ => {}
            }
        }
        self.rearm_host_wakeup();
        Ok(())
    }

    // -- reaction loop --------------------------------------------------

    /// Drains the graph's per-level alert queues and the action queue to
    /// quiescence, per the concurrency model: a stimulus runs to
    /// completion before the host regains control.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn react(&mut self) -> Result<(), NbError> {
        let mut cycles = 0u32;
        self.fire_active_if_rules()?;
        loop {
            self.drain_cell_alerts()?;
            if self.actions.is_empty() {
                break;
            }
            self.fire_next_action()?;
            cycles += 1;
            if cycles > self.config.max_stimulus_cycles {
                tracing::warn!(cycles, "stimulus cycle guard exceeded");
                return Err(NbError::new(
                    NbErrorKind::Resource,
                    "stimulus cycle guard exceeded: rule actions kept re-triggering each other",
                ));
            }
        }
        Ok(())
    }

    fn drain_cell_alerts(&mut self) -> Result<(), NbError> {
        loop {
            while let Some(id) = self.graph.pop_pending() {
                if matches!(self.graph.kind(id), CellKind::Change) {
                    self.graph.external_change(id, Value::True);
                    self.graph.pending_reverts.push(id);
                    self.on_cell_changed(id, &Value::False, &Value::True)?;
                    continue;
                }
                let (old, new) = self.graph.step(id);
                if old != new {
                    self.on_cell_changed(id, &old, &new)?;
                }
            }
            if !self.graph.drain_reverts() {
                break;
            }
        }
        Ok(())
    }

    fn on_cell_changed(&mut self, id: CellId, old: &Value, new: &Value) -> Result<(), NbError> {
        if let Some(name) = self.graph.name(id) {
            if let Some(sink) = &mut self.sink {
                sink(&name, new);
            }
        }
        if let Some(rec) = self.rules.get(&id).cloned() {
            match rule::should_fire(rec.kind, old, new, rec.scheduled) {
                Ok(true) => {
                    let (assertions, command) =
                        self.rule_assertions.get(&id).cloned().unwrap_or_default();
                    self.actions.schedule(id, rec.priority, assertions, command);
                    if let Some(r) = self.rules.get_mut(&id) {
                        r.scheduled = true;
                    }
                }
                Ok(false) => {}
                Err(e) => self.host.log(LogLevel::Error, &e.to_string()),
            }
        }
        if let Some(waiters) = self.vm_waiters.remove(&id) {
            let now = self.host.now() as i64;
            for rule_cell in waiters {
                self.drive_vm_program(rule_cell, now)?;
            }
        }
        Ok(())
    }

    /// Re-schedules every still-true `if` rule once per `react()` cycle,
    /// independent of `drain_cell_alerts`'s `old != new` gate: an `if` rule
    /// fires on every alert while its condition holds, not just on the
    /// edge into true.
    fn fire_active_if_rules(&mut self) -> Result<(), NbError> {
        let ids = self.if_rules.clone();
        for id in ids {
            let Some(rec) = self.rules.get(&id).cloned() else {
                continue;
            };
            if rec.scheduled {
                continue;
            }
            let cond = self.graph.value(rec.condition).clone();
            match rule::should_fire(rec.kind, &cond, &cond, rec.scheduled) {
                Ok(true) => {
                    let (assertions, command) =
                        self.rule_assertions.get(&id).cloned().unwrap_or_default();
                    self.actions.schedule(id, rec.priority, assertions, command);
                    if let Some(r) = self.rules.get_mut(&id) {
                        r.scheduled = true;
                    }
                }
                Ok(false) => {}
                Err(e) => self.host.log(LogLevel::Error, &e.to_string()),
            }
        }
        Ok(())
    }

    fn fire_next_action(&mut self) -> Result<(), NbError> {
        let Some((_, action)) = self.actions.pop_next() else {
            return Ok(());
        };
        self.apply_action(action)
    }

    fn apply_action(&mut self, action: Action) -> Result<(), NbError> {
        if self.vm_programs.contains_key(&action.rule) {
            // The VM program owns its own `scheduled`-reset timing: it
            // stays true while the plan is mid-flight, so the rule's own
            // on/when/if condition can't re-trigger a second concurrent
            // run, and only clears once the plan actually exits.
            let now = self.host.now() as i64;
            return self.drive_vm_program(action.rule, now);
        }
        if let Some(rec) = self.rules.get_mut(&action.rule) {
            rec.scheduled = false;
        }
        for spec in &action.assertions {
            if let Err(e) = self.apply_assertion(spec) {
                self.host.log(LogLevel::Error, &e.to_string());
            }
        }
        if let Some(cmd) = &action.command {
            self.run_command(action.rule, cmd)?;
        }
        if let Some(rec) = self.rules.get(&action.rule) {
            if rec.kind == RuleKind::When {
                let term = rec.defining_term;
                self.undefine_term(term);
            }
        }
        Ok(())
    }

    /// Runs a rule's command tail: `exit <cell>` is special-cased to the
    /// host's exit path, anything else goes to the command sink. Shared by
    /// the flat assertion/command tail and a plan's `:command;` statement.
    fn run_command(&mut self, rule: CellId, cmd: &str) -> Result<(), NbError> {
        if let Some(name) = cmd.trim().strip_prefix("exit").and_then(|rest| {
            let rest = rest.trim();
            (!rest.is_empty()).then_some(rest)
        }) {
            self.run_exit_command(name)?;
        } else {
            let outcome = self.host.exec_command(&format!("rule {}", rule.0), cmd);
            if outcome.code != 0 {
                tracing::warn!(rule = rule.0, code = outcome.code, "command failed");
                self.host.log(
                    LogLevel::Warn,
                    &format!(
                        "command exited {}: {}",
                        outcome.code,
                        outcome.message.unwrap_or_default()
                    ),
                );
            }
        }
        Ok(())
    }

    fn apply_assertion(&mut self, spec: &AssertionSpec) -> Result<(), NbError> {
        let target = self.graph.term_target(spec.term).ok_or_else(|| {
            NbError::new(
                NbErrorKind::Reference,
                "action assertion target is not a defined term",
            )
        })?;
        if !self.graph.is_constant(target) {
            return Err(NbError::new(
                NbErrorKind::Type,
                "action assigned to a welded (computed) term",
            ));
        }
        let v = self.graph.value(spec.value_cell).clone();
        self.graph.assert_constant(target, v);
        Ok(())
    }

    /// Runs a rule's `exit <cell>` command: looks `cell` up by name, turns
    /// its current value into a process exit code, and hands it to the
    /// host. Any rounding or non-numeric fallback is logged as a warning
    /// rather than failing the action.
    fn run_exit_command(&mut self, name: &str) -> Result<(), NbError> {
        let id = *self.context.terms.get(name).ok_or_else(|| {
            NbError::new(
                NbErrorKind::Reference,
                format!("exit: undefined term '{name}'"),
            )
        })?;
        let value = self.graph.value(id).clone();
        let (code, warning) = exit_code_for_value(&value);
        if let Some(msg) = warning {
            self.host.log(LogLevel::Warn, &format!("exit {name}: {msg}"));
        }
        self.host.request_exit(code);
        Ok(())
    }

    // -- time advance -----------------------------------------------------

    /// Advances the engine's notion of time to `now_seconds`, firing any
    /// due schedule edges or delay expiries and reacting to completion.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn tick(&mut self, now_seconds: f64) -> Result<(), NbError> {
        let now = now_seconds as i64;
        let due = self.timers.fire_due(now);
        tracing::trace!(due = due.len(), "timers due");
        for cell in due {
            if self.vm_programs.contains_key(&cell) {
                self.drive_vm_program(cell, now)?;
            } else {
                self.fire_timer(cell, now)?;
            }
        }
        self.react()?;
        self.rearm_host_wakeup();
        Ok(())
    }

    fn fire_timer(&mut self, id: CellId, now: i64) -> Result<(), NbError> {
        match self.graph.kind(id).clone() {
            CellKind::Time(expr) => {
                let value = {
                    let cache = self.schedules.get(&id).expect("armed time cell has a cache");
                    if cache.contains(now) { Value::True } else { Value::False }
                };
                let (old, new) = (self.graph.value(id).clone(), value.clone());
                self.graph.external_change(id, value);
                if old != new {
                    self.on_cell_changed(id, &old, &new)?;
                }
                let next = {
                    let cache = self.schedules.get_mut(&id).expect("armed time cell has a cache");
                    cache.ensure_next_edge(&expr, now, &self.config)
                };
                match next {
                    Ok(Some(edge)) => {
                        self.timers.arm(id, edge);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(cell = id.0, "forecast horizon exhausted: {e}");
                        self.host.log(LogLevel::Error, &e.to_string());
                    }
                }
            }
            CellKind::Delay(_) => {
                let old = self.graph.value(id).clone();
                self.graph.external_change(id, Value::Unknown);
                if old != Value::Unknown {
                    self.on_cell_changed(id, &old, &Value::Unknown)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn rearm_host_wakeup(&mut self) {
        match self.timers.earliest_due() {
            Some(t) => self.host.arm_timer(t as f64),
            None => self.host.cancel_timer(),
        }
    }

    // -- rule-plan VM -----------------------------------------------------

    /// Compiles a procedural rule body into a `vm::Instr` program, ending
    /// with a `Wait{0}` + `Exit` pair so the last statement's effect is
    /// gated the same way every other effect instruction is.
    fn compile_plan(&mut self, stmts: &[PlanStmt]) -> Result<Vec<Instr>, NbError> {
        let mut out = Vec::new();
        let mut next_counter = 0usize;
        self.compile_stmts(stmts, &mut out, &mut next_counter)?;
        out.push(Instr::Wait { offset_seconds: 0 });
        out.push(Instr::Exit);
        Ok(out)
    }

    fn compile_stmts(
        &mut self,
        stmts: &[PlanStmt],
        out: &mut Vec<Instr>,
        next_counter: &mut usize,
    ) -> Result<(), NbError> {
        for s in stmts {
            self.compile_stmt(s, out, next_counter)?;
        }
        Ok(())
    }

    /// Every instruction that has an externally visible effect (`Assert`,
    /// `Command`, `Value`, `Define`, and the `on`/`if` condition wait) is
    /// preceded by a zero-offset `Wait`: `vm::run`'s `Wait` arm is what
    /// compares the plan's virtual clock against the real one, and the
    /// original plan interpreter gates every effect on that same check.
    fn compile_stmt(
        &mut self,
        stmt: &PlanStmt,
        out: &mut Vec<Instr>,
        next_counter: &mut usize,
    ) -> Result<(), NbError> {
        match stmt {
            PlanStmt::Loop { count, body } => {
                if *count == 1 {
                    self.compile_stmts(body, out, next_counter)?;
                } else if *count == 0 {
                    let start = out.len();
                    self.compile_stmts(body, out, next_counter)?;
                    out.push(Instr::Branch(start));
                } else {
                    let counter = *next_counter;
                    *next_counter += 1;
                    out.push(Instr::LoopBegin { counter, n: *count });
                    let begin = out.len();
                    self.compile_stmts(body, out, next_counter)?;
                    out.push(Instr::LoopEnd { counter, jump: begin });
                }
            }
            PlanStmt::Step { count, unit } => {
                out.push(Instr::Step { unit: *unit, n: *count });
            }
            PlanStmt::Align { count, time } => {
                out.push(Instr::Align {
                    tree: Rc::new(time.clone()),
                    n: *count,
                });
            }
            PlanStmt::On { condition } => {
                let c = self.build_cell(condition)?;
                self.graph.hold(c);
                self.graph.enable(c);
                out.push(Instr::Wait { offset_seconds: 0 });
                out.push(Instr::OnEnable { cond: c });
                out.push(Instr::WhenTest { cond: c });
            }
            PlanStmt::If { condition, then, els } => {
                let c = self.build_cell(condition)?;
                self.graph.hold(c);
                self.graph.enable(c);
                let branch_idx = out.len();
                out.push(Instr::If { cond: c, jump: 0 });
                self.compile_stmt(then, out, next_counter)?;
                if let Some(els) = els {
                    let jump_over_else = out.len();
                    out.push(Instr::Branch(0));
                    let else_start = out.len();
                    out[branch_idx] = Instr::If { cond: c, jump: else_start };
                    self.compile_stmt(els, out, next_counter)?;
                    let after = out.len();
                    out[jump_over_else] = Instr::Branch(after);
                } else {
                    let after = out.len();
                    out[branch_idx] = Instr::If { cond: c, jump: after };
                }
            }
            PlanStmt::Assert(assertions) => {
                let mut specs = Vec::with_capacity(assertions.len());
                for a in assertions {
                    let term = self.get_or_create_term(&a.term);
                    let value_cell = self.build_cell(&a.value)?;
                    self.graph.hold(value_cell);
                    self.graph.enable(value_cell);
                    specs.push(AssertionSpec { term, value_cell });
                }
                out.push(Instr::Wait { offset_seconds: 0 });
                out.push(Instr::Assert(specs));
            }
            PlanStmt::Command(cmd) => {
                out.push(Instr::Wait { offset_seconds: 0 });
                out.push(Instr::Command(cmd.clone()));
            }
            PlanStmt::SelfAssert(b) => {
                out.push(Instr::Wait { offset_seconds: 0 });
                out.push(Instr::Value(if *b { Value::True } else { Value::False }));
            }
            PlanStmt::Define { value } => {
                let value_cell = self.build_cell(value)?;
                self.graph.hold(value_cell);
                self.graph.enable(value_cell);
                out.push(Instr::Wait { offset_seconds: 0 });
                out.push(Instr::Define { cell: value_cell });
            }
        }
        Ok(())
    }

    /// Drives a rule's compiled plan forward from wherever it last left
    /// off, re-entering `vm::run` after every `Published`/`Ready` outcome
    /// (which only advance one instruction at a time) until it genuinely
    /// suspends (`YieldOnCondition`/`YieldUntil`) or `Exited`.
    fn drive_vm_program(&mut self, rule_cell: CellId, now: i64) -> Result<(), NbError> {
        loop {
            let Some(prog) = self.vm_programs.get(&rule_cell) else {
                return Ok(());
            };
            let program = prog.program.clone();
            let mut state = prog.state.clone();
            let outcome = vm::run(&program, &mut state, now, self);
            if let Some(rec) = self.vm_programs.get_mut(&rule_cell) {
                rec.state = state;
            }
            match outcome {
                StepOutcome::Published(v) => {
                    self.graph.external_change(rule_cell, v);
                }
                StepOutcome::Ready { assertions, command } => {
                    for spec in &assertions {
                        if let Err(e) = self.apply_assertion(spec) {
                            self.host.log(LogLevel::Error, &e.to_string());
                        }
                    }
                    if let Some(cmd) = &command {
                        self.run_command(rule_cell, cmd)?;
                    }
                }
                StepOutcome::YieldOnCondition(cond) => {
                    self.vm_waiters.entry(cond).or_default().push(rule_cell);
                    return Ok(());
                }
                StepOutcome::YieldUntil(t) => {
                    self.timers.arm(rule_cell, t);
                    self.rearm_host_wakeup();
                    return Ok(());
                }
                StepOutcome::Exited => {
                    self.vm_programs.remove(&rule_cell);
                    if let Some(rec) = self.rules.get_mut(&rule_cell) {
                        rec.scheduled = false;
                    }
                    if let Some(rec) = self.rules.get(&rule_cell) {
                        if rec.kind == RuleKind::When {
                            let term = rec.defining_term;
                            self.undefine_term(term);
                        }
                    }
                    return Ok(());
                }
            }
        }
    }
}

impl vm::VmHost for Engine {
    fn cell_value(&self, cell: CellId) -> Value {
        self.graph.value(cell).clone()
    }

    fn align(&self, tree: &TimeExpr, after: i64, n: i64) -> Option<i64> {
        nth_interval_start_after(tree, after, n, &self.config).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CommandSink;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeHost {
        now: f64,
        logs: Rc<RefCell<Vec<String>>>,
        commands: RefCell<Vec<String>>,
        exit_codes: Rc<RefCell<Vec<i32>>>,
    }

    impl CommandSink for FakeHost {
        fn exec_command(&mut self, _context: &str, command: &str) -> crate::traits::CommandOutcome {
            self.commands.borrow_mut().push(command.to_string());
            crate::traits::CommandOutcome {
                code: 0,
                message: None,
            }
        }
    }

    impl EngineHost for FakeHost {
        fn now(&self) -> f64 {
            self.now
        }
        fn arm_timer(&mut self, _at_seconds: f64) {}
        fn cancel_timer(&mut self) {}
        fn log(&mut self, _level: LogLevel, message: &str) {
            self.logs.borrow_mut().push(message.to_string());
        }
        fn request_exit(&mut self, code: i32) {
            self.exit_codes.borrow_mut().push(code);
        }
    }

    fn engine() -> Engine {
        Engine::new(Box::new(FakeHost::default()), EngineConfig::default())
    }

    #[test]
    fn basic_propagation_through_a_sum() {
        let mut e = engine();
        e.parse("define a cell 1;").unwrap();
        e.parse("define b cell 2;").unwrap();
        e.parse("define s cell a + b;").unwrap();
        let s = e.term("s");
        assert_eq!(e.evaluate(s), Value::real(3.0));
        e.assert_and_react("a", Value::real(10.0)).unwrap();
        assert_eq!(e.evaluate(s), Value::real(12.0));
    }

    #[test]
    fn three_valued_and_is_unknown_on_cross_type_comparison() {
        let mut e = engine();
        e.parse("define a cell 1;").unwrap();
        e.parse("define b cell \"x\";").unwrap();
        e.parse("define c cell a = b;").unwrap();
        let c = e.term("c");
        assert_eq!(e.evaluate(c), Value::Unknown);
    }

    #[test]
    fn on_rule_fires_once_on_the_rising_edge() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define r on(trigger) trigger=false;").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        let trigger = e.term("trigger");
        assert_eq!(e.evaluate(trigger), Value::False);
    }

    #[test]
    fn when_rule_self_undefines_after_firing() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define r when(trigger) trigger=false;").unwrap();
        assert!(e.context.terms.contains_key("r"));
        e.assert_and_react("trigger", Value::True).unwrap();
        assert!(!e.context.terms.contains_key("r"));
    }

    #[test]
    fn if_rule_refires_each_cycle_while_condition_stays_true() {
        let mut e = engine();
        e.parse("define trigger cell true;").unwrap();
        e.parse("define counter cell 0;").unwrap();
        e.parse("define other cell false;").unwrap();
        e.parse("define r if(trigger) counter=counter+1;").unwrap();
        let counter = e.term("counter");
        // `trigger` was already True when `r` was defined, so it never took
        // a False/Unknown->True edge through `on_cell_changed`; only the
        // active if-list re-evaluation fires it here.
        e.assert_and_react("other", Value::True).unwrap();
        assert_eq!(e.evaluate(counter), Value::real(1.0));
        e.assert_and_react("other", Value::False).unwrap();
        assert_eq!(e.evaluate(counter), Value::real(2.0));
    }

    #[test]
    fn action_priority_runs_higher_priority_rule_first() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define order cell 0;").unwrap();
        e.parse("define low on(trigger) [-5] order=1;").unwrap();
        e.parse("define high on(trigger) [5] order=2;").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        let order = e.term("order");
        // Both rules fire on the same stimulus; the action queue drains
        // highest priority first, so `low`'s assertion (fired last)
        // leaves the final value.
        assert_eq!(e.evaluate(order), Value::real(1.0));
    }

    #[test]
    fn exit_command_rounds_and_reports_the_code() {
        let logs = Rc::new(RefCell::new(Vec::new()));
        let exit_codes = Rc::new(RefCell::new(Vec::new()));
        let host = FakeHost {
            logs: logs.clone(),
            exit_codes: exit_codes.clone(),
            ..Default::default()
        };
        let mut e = Engine::new(Box::new(host), EngineConfig::default());
        e.parse("define trigger cell false;").unwrap();
        e.parse("define code cell 2.7;").unwrap();
        e.parse("define r on(trigger) order=1 : exit code;").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        assert_eq!(exit_codes.borrow().as_slice(), &[3]);
        assert!(logs.borrow().iter().any(|m| m.contains("rounded")));
    }

    #[test]
    fn assigning_to_a_welded_term_is_rejected() {
        let mut e = engine();
        e.parse("define a cell 1;").unwrap();
        e.parse("define b cell 2;").unwrap();
        e.parse("define s cell a + b;").unwrap();
        e.assert("s", Value::real(99.0));
        let s = e.term("s");
        assert_eq!(e.evaluate(s), Value::real(3.0));
    }

    #[test]
    fn procedural_plan_applies_assertions_immediately() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define a cell 0;").unwrap();
        e.parse("define r on(trigger) { `a=5; };").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        let a = e.term("a");
        assert_eq!(e.evaluate(a), Value::real(5.0));
    }

    #[test]
    fn procedural_plan_suspends_on_condition_then_resumes() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define ready cell false;").unwrap();
        e.parse("define a cell 0;").unwrap();
        e.parse("define r on(trigger) { on(ready), `a=1; };").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        let a = e.term("a");
        // Still waiting on `ready`: the plan hasn't reached its assertion.
        assert_eq!(e.evaluate(a), Value::real(0.0));
        e.assert_and_react("ready", Value::True).unwrap();
        assert_eq!(e.evaluate(a), Value::real(1.0));
    }

    #[test]
    fn procedural_plan_resumes_from_a_real_clock_wait() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define a cell 0;").unwrap();
        e.parse("define r on(trigger) { 1h, `a=1; };").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        let a = e.term("a");
        assert_eq!(e.evaluate(a), Value::real(0.0));
        e.tick(3600.0).unwrap();
        assert_eq!(e.evaluate(a), Value::real(1.0));
    }

    #[test]
    fn procedural_plan_loop_runs_body_fixed_times() {
        let mut e = engine();
        e.parse("define trigger cell false;").unwrap();
        e.parse("define n cell 0;").unwrap();
        e.parse("define r on(trigger) { 3{ `n=n+1; } };").unwrap();
        e.assert_and_react("trigger", Value::True).unwrap();
        let n = e.term("n");
        assert_eq!(e.evaluate(n), Value::real(3.0));
    }
}
