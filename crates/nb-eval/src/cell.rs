//! The tagged cell kinds that populate [`crate::graph::Graph`], and the
//! type-attribute bitset the object/type system ascribes to each one.
//!
//! A closed set of operators lets this be a plain enum with a match in
//! `eval` rather than virtual dispatch through a method table; the one open
//! extension point (rule cells, whose action tail is arbitrary) is carried
//! as data alongside the tag rather than a boxed trait object, since the
//! action itself has no polymorphic behavior of its own.

use bitflags::bitflags;
use nb_parse::ast::{BinaryOp, UnaryOp};
use nb_parse::{RuleKind, TimeExpr};
use smallvec::SmallVec;
use std::rc::Rc;

use nb_common::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl CellId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

pub use nb_parse::ast::{BinaryOp, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    True,
    False,
    Unknown,
}

impl From<nb_parse::ast::DelayKind> for DelayKind {
    fn from(d: nb_parse::ast::DelayKind) -> Self {
        match d {
            nb_parse::ast::DelayKind::True => DelayKind::True,
            nb_parse::ast::DelayKind::False => DelayKind::False,
            nb_parse::ast::DelayKind::Unknown => DelayKind::Unknown,
        }
    }
}

/// The tag identifying what kind of node a cell is and how to `eval` it.
/// Operands live in [`super::graph::CellRecord::children`]; this enum only
/// carries the data that isn't itself a cell reference.
#[derive(Debug, Clone)]
pub enum CellKind {
    /// A fixed value; `eval` always returns the value it was constructed
    /// with. `assert` on a free (non-welded) term mutates this in place.
    Constant,
    /// A named term bound to a defining cell (or unbound, i.e.
    /// [`Value::Placeholder`]). Redefinition repoints `target` without
    /// disturbing subscribers, since subscribers hold the term's `CellId`,
    /// not the definition's.
    Term { target: Option<CellId> },
    Unary(UnaryOp),
    /// Boolean/relational/arithmetic binary operator. `LazyAnd`/`LazyOr`
    /// are handled specially by `enable`/`disable`, which subscribe to the
    /// right child only when its value can still affect the result.
    Binary(BinaryOp),
    /// `~=` change detector: pulses True for one reaction cycle on any
    /// change of its child, then reverts to False.
    Change,
    /// `~^(cond)` / `~^!(cond)` / `~^?(cond)`: true/false/unknown for the
    /// duration of the schedule on the right, starting at a qualifying
    /// transition of the left operand.
    Delay(DelayKind),
    /// `~( time-expression )` schedule cell.
    Time(Rc<TimeExpr>),
    /// A rule cell: mirrors its condition's value; firing is driven by
    /// [`crate::rule`] watching this cell's transitions, not by `eval`.
    Rule(RuleKind),
}

bitflags! {
    /// The type-attribute bitset from the object/type system section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u16 {
        const IS_RULE    = 1 << 0;
        const IS_BOOL    = 1 << 1;
        const IS_REL     = 1 << 2;
        const IS_TIME    = 1 << 3;
        const IS_DELAY   = 1 << 4;
        const IS_ASSERT  = 1 << 5;
        const ENABLES    = 1 << 6;
        const WELDED     = 1 << 7;
        const NOT_TRUE   = 1 << 8;
        const TRUE       = 1 << 9;
        const FALSE      = 1 << 10;
        const UNKNOWN    = 1 << 11;
        const CONSTANT   = 1 << 12;
    }
}

impl CellKind {
    pub fn flags(&self) -> TypeFlags {
        use BinaryOp::*;
        match self {
            CellKind::Constant => TypeFlags::CONSTANT,
            CellKind::Term { .. } => TypeFlags::empty(),
            CellKind::Unary(_) => TypeFlags::IS_BOOL,
            CellKind::Binary(op) => match op {
                Or | LazyOr | Nor | Xor | And | LazyAnd | Nand | Default | FlipFlop | Then
                | Capture => TypeFlags::IS_BOOL,
                Eq | Ne | Lt | Le | Gt | Ge | Match => TypeFlags::IS_REL,
                Add | Sub | Mul | Div => TypeFlags::empty(),
            },
            CellKind::Change => TypeFlags::IS_BOOL,
            CellKind::Delay(_) => TypeFlags::IS_DELAY | TypeFlags::IS_BOOL,
            CellKind::Time(_) => TypeFlags::IS_TIME | TypeFlags::IS_BOOL | TypeFlags::ENABLES,
            CellKind::Rule(_) => TypeFlags::IS_RULE,
        }
    }

    pub fn is_lazy_binary(&self) -> bool {
        matches!(
            self,
            CellKind::Binary(BinaryOp::LazyAnd) | CellKind::Binary(BinaryOp::LazyOr)
        )
    }
}

/// One node in the arena. `subscribers` are the weak back-references the
/// design notes call for: indices into the same arena, never an owning
/// pointer, so the graph is a DAG of owning child-edges with a parallel
/// non-owning subscriber index for push propagation.
#[derive(Debug, Clone)]
pub struct CellRecord {
    pub kind: CellKind,
    pub children: SmallVec<[CellId; 2]>,
    pub subscribers: Vec<CellId>,
    pub value: Value,
    /// Stateful cells (`FlipFlop`, `Capture`) fold their previous output
    /// back in as an implicit third operand; everyone else ignores this.
    pub prev_state: Value,
    pub level: u32,
    pub enabled: bool,
    /// External keep-alive count: term definitions and rule roots hold
    /// their target cell alive independent of subscriber count, so a
    /// `define`d cell with zero listeners is still enabled.
    pub holds: u32,
    pub name: Option<Rc<str>>,
}

impl CellRecord {
    pub fn new(kind: CellKind, children: SmallVec<[CellId; 2]>) -> Self {
        Self {
            kind,
            children,
            subscribers: Vec::new(),
            value: Value::Disabled,
            prev_state: Value::Unknown,
            level: 0,
            enabled: false,
            holds: 0,
            name: None,
        }
    }
}
