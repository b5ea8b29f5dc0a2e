//! Casts a [`TimeExpr`] tree into a [`IntervalSet`] over a window, and
//! manages the per-schedule-cell cache and horizon-doubling policy
//! described in the time-condition engine section: a schedule keeps one
//! cast covering `[now, horizon)`, replacing (not extending) it whenever a
//! query runs off the end, until `EngineConfig::max_horizon_seconds` is
//! hit, at which point casting halts with `ForecastStopped`.

use nb_common::{NbError, NbErrorKind};
use nb_parse::time_ast::TimeExpr;

use crate::bfi::IntervalSet;
use crate::calendar::{cast_complex, cast_simple};
use crate::config::EngineConfig;

pub fn cast(tree: &TimeExpr, begin: i64, end: i64) -> Result<IntervalSet, NbError> {
    Ok(match tree {
        TimeExpr::Simple(unit) => cast_simple(*unit, begin, end),
        TimeExpr::Complex(unit, params) => cast_complex(*unit, params, begin, end)?,
        TimeExpr::And(a, b) => cast(a, begin, end)?.intersect(&cast(b, begin, end)?),
        TimeExpr::Or(a, b) => cast(a, begin, end)?.union(&cast(b, begin, end)?),
        TimeExpr::UnionPreserve(a, b) => {
            cast(a, begin, end)?.union_preserve(&cast(b, begin, end)?)
        }
        TimeExpr::Not(a) => cast(a, begin, end)?.complement((begin, end)),
        TimeExpr::Until(a, b) => cast(a, begin, end)?.until(&cast(b, begin, end)?),
        TimeExpr::Reject(a, b) => cast(a, begin, end)?.reject(&cast(b, begin, end)?),
        TimeExpr::Select(a, b) => cast(a, begin, end)?.select(&cast(b, begin, end)?),
        TimeExpr::StretchStart(a, b) => cast(a, begin, end)?.stretch_start(&cast(b, begin, end)?),
        TimeExpr::StretchStop(a, b) => cast(a, begin, end)?.stretch_stop(&cast(b, begin, end)?),
        TimeExpr::Index(a, k) => cast(a, begin, end)?.index(*k),
    })
}

/// The live cache a `Time` cell keeps: the window it was cast over and the
/// resulting set. Recast (not extended) on each horizon doubling, so it's
/// always the authoritative answer for membership/next-edge queries
/// within `[cast_begin, cast_end)`.
#[derive(Debug, Clone)]
pub struct ScheduleCache {
    pub cast_begin: i64,
    pub cast_end: i64,
    pub set: IntervalSet,
}

impl ScheduleCache {
    pub fn new(tree: &TimeExpr, now: i64, config: &EngineConfig) -> Result<Self, NbError> {
        let end = now + config.initial_horizon_seconds;
        let set = cast(tree, now, end)?;
        Ok(Self {
            cast_begin: now,
            cast_end: end,
            set,
        })
    }

    pub fn contains(&self, t: i64) -> bool {
        self.set.contains(t)
    }

    /// Ensures the cache covers at least up to the next edge after `t`,
    /// doubling the horizon (and recasting from scratch) as needed.
    /// Returns `ForecastStopped` if `max_horizon_seconds` is reached
    /// without finding a further edge.
    pub fn ensure_next_edge(
        &mut self,
        tree: &TimeExpr,
        t: i64,
        config: &EngineConfig,
    ) -> Result<Option<i64>, NbError> {
        if let Some(edge) = self.set.next_edge_after(t) {
            return Ok(Some(edge));
        }
        let mut span = self.cast_end - self.cast_begin;
        for _ in 0..config.max_horizon_doublings {
            span = (span * 2).min(config.max_horizon_seconds);
            let end = self.cast_begin + span;
            self.set = cast(tree, self.cast_begin, end)?;
            self.cast_end = end;
            if let Some(edge) = self.set.next_edge_after(t) {
                return Ok(Some(edge));
            }
            if span >= config.max_horizon_seconds {
                break;
            }
        }
        Err(NbError::new(
            NbErrorKind::Resource,
            "forecast stopped: schedule horizon exhausted without a further transition",
        ))
    }
}

/// Finds the start of the `n`-th interval of `tree` strictly after `after`
/// (`n <= 0` is a no-op, returning `after` itself), doubling the cast
/// horizon until `n` occurrences are found or `max_horizon_seconds` is hit.
/// Grounded on `nbPlanAlign`'s own widen-and-recount loop; unlike
/// [`ScheduleCache`] this is a one-shot query with no cache to keep warm,
/// since a rule plan's `Align` step only runs once per pass through the
/// plan body.
pub fn nth_interval_start_after(
    tree: &TimeExpr,
    after: i64,
    n: i64,
    config: &EngineConfig,
) -> Result<Option<i64>, NbError> {
    if n <= 0 {
        return Ok(Some(after));
    }
    let mut span = config.initial_horizon_seconds;
    loop {
        let end = after + span;
        let set = cast(tree, after, end)?;
        let starts: Vec<i64> = set.as_slice().iter().map(|&(s, _)| s).filter(|&s| s > after).collect();
        if (starts.len() as i64) >= n {
            return Ok(Some(starts[(n - 1) as usize]));
        }
        if span >= config.max_horizon_seconds {
            return Err(NbError::new(
                NbErrorKind::Resource,
                "forecast stopped: schedule horizon exhausted without n occurrences",
            ));
        }
        span = (span * 2).min(config.max_horizon_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_parse::time_ast::CalendarUnit;

    #[test]
    fn cache_finds_edge_within_initial_horizon() {
        let tree = TimeExpr::Simple(CalendarUnit::Day);
        let config = EngineConfig::default();
        let mut cache = ScheduleCache::new(&tree, 0, &config).unwrap();
        let edge = cache.ensure_next_edge(&tree, 0, &config).unwrap();
        assert_eq!(edge, Some(86400));
    }

    #[test]
    fn nth_interval_finds_the_third_day_boundary() {
        let tree = TimeExpr::Simple(CalendarUnit::Day);
        let config = EngineConfig::default();
        let start = nth_interval_start_after(&tree, 0, 3, &config).unwrap();
        assert_eq!(start, Some(3 * 86400));
    }

    #[test]
    fn nth_interval_zero_count_is_a_no_op() {
        let tree = TimeExpr::Simple(CalendarUnit::Day);
        let config = EngineConfig::default();
        let start = nth_interval_start_after(&tree, 500, 0, &config).unwrap();
        assert_eq!(start, Some(500));
    }
}
