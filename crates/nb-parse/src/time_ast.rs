//! The time-condition tree produced by the time-expression parser inside
//! `~( … )`. `nb-eval`'s BFI casting engine walks this tree; it never
//! re-parses text.

/// One field of a complex function's parameter pattern, e.g. the `8_17` in
/// `h(8_17)` or the `2014/06/03` in `day(2014/06/03)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeParam {
    /// A single field value, e.g. the `8` in `h(8)`.
    Value(i64),
    /// An inclusive range, e.g. `8_17`.
    Range(i64, i64),
    /// `*`, matching any value in the field.
    Wild,
}

/// The calendar unit a simple or complex function operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Millennium,
    Century,
    Decade,
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    /// `we` — weekend
    Weekend,
    /// `wd` — weekday
    Weekday,
    /// One of the twelve named months (`jan` .. `dec`), 0-based.
    NamedMonth(u8),
    /// One of the seven named weekdays (`sun` .. `sat`), 0-based, Sunday=0.
    NamedWeekday(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeExpr {
    /// A bare calendar unit with no parameter pattern, e.g. `day`.
    Simple(CalendarUnit),
    /// A calendar unit qualified by a parameter pattern, e.g. `h(8_17)`.
    Complex(CalendarUnit, Vec<TimeParam>),
    And(Box<TimeExpr>, Box<TimeExpr>),
    /// `|` — union, coalescing adjacent intervals.
    Or(Box<TimeExpr>, Box<TimeExpr>),
    /// `,` — union preserving interval boundaries.
    UnionPreserve(Box<TimeExpr>, Box<TimeExpr>),
    Not(Box<TimeExpr>),
    /// `#` / `_` — until: stretch `a`'s intervals to the next start of `b`.
    Until(Box<TimeExpr>, Box<TimeExpr>),
    /// `!` infix — reject: `a` minus any `a`-interval intersecting `b`.
    Reject(Box<TimeExpr>, Box<TimeExpr>),
    /// `=` / `.` — select: `a`-intervals entirely within some `b`-interval.
    Select(Box<TimeExpr>, Box<TimeExpr>),
    /// `<` — stretch-start: align `b`'s start down to an `a` boundary.
    StretchStart(Box<TimeExpr>, Box<TimeExpr>),
    /// `>` — stretch-stop: align `a`'s end up to a `b` boundary.
    StretchStop(Box<TimeExpr>, Box<TimeExpr>),
    /// `[k]` — the k-th interval (1-based) within each enclosing domain.
    Index(Box<TimeExpr>, i64),
}
