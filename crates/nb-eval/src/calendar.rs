//! Calendar alignment, stepping, and casting: turns a [`CalendarUnit`] (and
//! its optional parameter pattern) into a [`IntervalSet`] over a requested
//! `[begin, end)` window, in epoch seconds (UTC).
//!
//! Grounded on `nbtime.c`'s `tcFunction` table: each unit has an alignment
//! rule (round down to the most recent boundary) and a step rule (advance
//! by N units), and named months/weekdays are specializations of `month`/
//! `day` that additionally filter on the field's numeric value.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::bfi::IntervalSet;
use nb_common::{NbError, NbErrorKind};
use nb_parse::time_ast::{CalendarUnit, TimeParam};

fn at(t: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(t, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

fn epoch(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Rounds `t` down to the most recent boundary of `unit`.
pub fn align_down(unit: CalendarUnit, t: i64) -> i64 {
    let dt = at(t);
    match unit {
        CalendarUnit::Millennium => year_start(dt, dt.year() / 1000 * 1000),
        CalendarUnit::Century => year_start(dt, dt.year() / 100 * 100),
        CalendarUnit::Decade => year_start(dt, dt.year() / 10 * 10),
        CalendarUnit::Year => year_start(dt, dt.year()),
        CalendarUnit::Quarter => {
            let q_month = (dt.month0() / 3) * 3 + 1;
            epoch(Utc.with_ymd_and_hms(dt.year(), q_month, 1, 0, 0, 0).unwrap())
        }
        CalendarUnit::Month | CalendarUnit::NamedMonth(_) => {
            epoch(Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0).unwrap())
        }
        CalendarUnit::Week => {
            let back = dt.weekday().num_days_from_sunday() as i64;
            epoch(dt.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()) - back * 86400
        }
        CalendarUnit::Day | CalendarUnit::Weekday | CalendarUnit::Weekend | CalendarUnit::NamedWeekday(_) => {
            epoch(dt.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc())
        }
        CalendarUnit::Hour => t - t.rem_euclid(3600),
        CalendarUnit::Minute => t - t.rem_euclid(60),
        CalendarUnit::Second => t,
    }
}

fn year_start(dt: DateTime<Utc>, year: i32) -> i64 {
    let _ = dt;
    epoch(Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap())
}

/// Advances `t` by `n` units of `unit`, without realigning first (callers
/// align, then step, matching `tcStepX` being applied to an already-
/// aligned boundary in the original).
pub fn step(unit: CalendarUnit, t: i64, n: i64) -> i64 {
    let dt = at(t);
    match unit {
        CalendarUnit::Millennium => add_years(dt, 1000 * n),
        CalendarUnit::Century => add_years(dt, 100 * n),
        CalendarUnit::Decade => add_years(dt, 10 * n),
        CalendarUnit::Year => add_years(dt, n),
        CalendarUnit::Quarter => add_months(dt, 3 * n),
        CalendarUnit::Month | CalendarUnit::NamedMonth(_) => add_months(dt, n),
        CalendarUnit::Week => t + n * 7 * 86400,
        CalendarUnit::Day | CalendarUnit::Weekday | CalendarUnit::Weekend | CalendarUnit::NamedWeekday(_) => {
            t + n * 86400
        }
        CalendarUnit::Hour => t + n * 3600,
        CalendarUnit::Minute => t + n * 60,
        CalendarUnit::Second => t + n,
    }
}

fn add_years(dt: DateTime<Utc>, n: i64) -> i64 {
    let year = dt.year() + n as i32;
    epoch(
        Utc.with_ymd_and_hms(year, dt.month(), 1.min(dt.day()), 0, 0, 0)
            .unwrap(),
    )
}

fn add_months(dt: DateTime<Utc>, n: i64) -> i64 {
    let total = dt.year() as i64 * 12 + (dt.month() as i64 - 1) + n;
    let year = (total.div_euclid(12)) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    epoch(Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap())
}

/// Casts a bare calendar unit (no parameter pattern) over `[begin, end)`:
/// every unit-aligned interval touching the window.
pub fn cast_simple(unit: CalendarUnit, begin: i64, end: i64) -> IntervalSet {
    let mut out = Vec::new();
    let mut cursor = align_down(unit, begin);
    let mut guard = 0;
    while cursor < end && guard < 1_000_000 {
        let next = step(unit, cursor, 1);
        let (s, e) = (cursor.max(begin), next.min(end));
        if matches_named(unit, cursor) && s < e {
            out.push((s, e));
        }
        cursor = next;
        guard += 1;
    }
    IntervalSet::from_sorted(out)
}

fn matches_named(unit: CalendarUnit, interval_start: i64) -> bool {
    match unit {
        CalendarUnit::NamedMonth(m) => at(interval_start).month0() == m as u32,
        CalendarUnit::NamedWeekday(w) => at(interval_start).weekday().num_days_from_sunday() == w as u32,
        CalendarUnit::Weekend => {
            let wd = at(interval_start).weekday().num_days_from_sunday();
            wd == 0 || wd == 6
        }
        CalendarUnit::Weekday => {
            let wd = at(interval_start).weekday().num_days_from_sunday();
            (1..=5).contains(&wd)
        }
        _ => true,
    }
}

/// Casts a complex function (unit qualified by a parameter pattern, e.g.
/// `h(8_17)` or `day(2014/06/03)`) over `[begin, end)`. The pattern filters
/// the field value of the unit *one level finer* than `unit` itself (hours
/// within a day for `h`, days-of-month within a month for `day`, etc.),
/// matching the original's nested-field convention.
pub fn cast_complex(
    unit: CalendarUnit,
    params: &[TimeParam],
    begin: i64,
    end: i64,
) -> Result<IntervalSet, NbError> {
    if matches!(unit, CalendarUnit::NamedMonth(_) | CalendarUnit::NamedWeekday(_)) {
        return Err(NbError::new(
            NbErrorKind::Syntax,
            format!("{unit:?} does not accept a parameter pattern"),
        ));
    }
    let base = cast_simple(unit, begin, end);
    let mut out = Vec::new();
    for &(s, e) in base.as_slice() {
        let dt = at(s);
        let field = field_value(unit, dt);
        let date = date_value(dt);
        if params
            .iter()
            .any(|p| param_matches(p, field) || param_matches(p, date))
        {
            out.push((s, e));
        }
    }
    Ok(IntervalSet::from_sorted(out))
}

/// The unit's own natural field value: hour-of-day for `Hour`, day-of-
/// month for `Day`, month-of-year for `Month`, bare year for `Year`.
fn field_value(unit: CalendarUnit, dt: DateTime<Utc>) -> i64 {
    match unit {
        CalendarUnit::Year => dt.year() as i64,
        CalendarUnit::Month | CalendarUnit::Quarter => dt.month() as i64,
        CalendarUnit::Week | CalendarUnit::Day => dt.day() as i64,
        CalendarUnit::Hour => dt.hour() as i64,
        CalendarUnit::Minute => dt.minute() as i64,
        CalendarUnit::Second => dt.second() as i64,
        _ => 0,
    }
}

/// The `YYYY/MM/DD`-pattern encoding (`y*10000 + m*100 + d`) so a param
/// like `day(2014/06/03)` matches a specific calendar date regardless of
/// which unit it's attached to.
fn date_value(dt: DateTime<Utc>) -> i64 {
    dt.year() as i64 * 10000 + dt.month() as i64 * 100 + dt.day() as i64
}

fn param_matches(p: &TimeParam, field: i64) -> bool {
    match *p {
        TimeParam::Value(v) => v == field,
        // `lo_hi` closes at the start of the `hi` bucket, not its end: `h(8_17)`
        // covers hours 8 through 16, so the condition goes false at 17:00:00.
        TimeParam::Range(lo, hi) => (lo..hi).contains(&field),
        TimeParam::Wild => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_cast_splits_at_midnight() {
        let begin = 0; // 1970-01-01T00:00:00Z
        let end = 3 * 86400;
        let set = cast_simple(CalendarUnit::Day, begin, end);
        assert_eq!(set.as_slice(), &[(0, 86400), (86400, 172800), (172800, 259200)]);
    }

    #[test]
    fn hour_range_pattern() {
        // `h(8_17)`: true during the hours 08:00-16:59 each day, closing at
        // 17:00:00 sharp.
        let begin = 0;
        let end = 2 * 86400;
        let set = cast_complex(CalendarUnit::Hour, &[TimeParam::Range(8, 17)], begin, end)
            .unwrap();
        assert_eq!(set.as_slice(), &[(28800, 61200), (115200, 147600)]);
        for &(s, e) in set.as_slice() {
            assert!(at(s).hour() >= 8);
            assert!(at(e - 1).hour() <= 16);
        }
    }
}
