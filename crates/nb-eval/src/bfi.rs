//! BFI (Binary Function of Integer) interval sets: the representation a
//! cast schedule uses to describe when a time condition is true over
//! `[begin, end)`, in epoch seconds.
//!
//! Two forms exist, matching the design note on edge-preserving vs.
//! normalized sets: [`IntervalSet::union`] coalesces touching/overlapping
//! intervals (the form every operator except `,` produces and consumes),
//! while [`IntervalSet::union_preserve`] keeps each input's original
//! boundaries even where they abut, for `,` (union-preserve) specifically.

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSet {
    /// Sorted, non-overlapping `[start, end)` pairs (unless this set was
    /// produced by `union_preserve`, in which case adjacent entries may
    /// share a boundary without merging).
    intervals: Vec<(i64, i64)>,
}

impl IntervalSet {
    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    pub fn single(start: i64, end: i64) -> Self {
        if end <= start {
            return Self::empty();
        }
        Self {
            intervals: vec![(start, end)],
        }
    }

    pub fn from_sorted(intervals: Vec<(i64, i64)>) -> Self {
        normalize(Self { intervals })
    }

    pub fn as_slice(&self) -> &[(i64, i64)] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, t: i64) -> bool {
        self.intervals
            .binary_search_by(|&(s, e)| {
                if t < s {
                    std::cmp::Ordering::Greater
                } else if t >= e {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// The earliest interval whose start or end is strictly after `t`,
    /// i.e. the next place the membership boundary changes. Used by the
    /// time engine to arm the next timer.
    pub fn next_edge_after(&self, t: i64) -> Option<i64> {
        for &(s, e) in &self.intervals {
            if s > t {
                return Some(s);
            }
            if e > t {
                return Some(e);
            }
        }
        None
    }

    /// Coalescing union: overlapping or touching intervals merge into one.
    pub fn union(&self, other: &Self) -> Self {
        let mut all: Vec<(i64, i64)> = self
            .intervals
            .iter()
            .chain(other.intervals.iter())
            .copied()
            .collect();
        all.sort_unstable();
        normalize(Self { intervals: all })
    }

    /// Union preserving each side's original boundaries: adjacent
    /// intervals are kept distinct rather than merged.
    pub fn union_preserve(&self, other: &Self) -> Self {
        let mut all: Vec<(i64, i64)> = self
            .intervals
            .iter()
            .chain(other.intervals.iter())
            .copied()
            .collect();
        all.sort_unstable();
        Self { intervals: all }
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let (s1, e1) = self.intervals[i];
            let (s2, e2) = other.intervals[j];
            let s = s1.max(s2);
            let e = e1.min(e2);
            if s < e {
                out.push((s, e));
            }
            if e1 < e2 {
                i += 1;
            } else {
                j += 1;
            }
        }
        normalize(Self { intervals: out })
    }

    pub fn complement(&self, domain: (i64, i64)) -> Self {
        let (dbegin, dend) = domain;
        let mut out = Vec::new();
        let mut cursor = dbegin;
        for &(s, e) in &self.intervals {
            let s = s.max(dbegin);
            let e = e.min(dend);
            if s > cursor {
                out.push((cursor, s));
            }
            cursor = cursor.max(e);
        }
        if cursor < dend {
            out.push((cursor, dend));
        }
        Self { intervals: out }
    }

    /// "Until": each interval of `self` is stretched to the start of the
    /// next interval of `other` that begins at or after its own end; if
    /// none does, the interval is left as-is.
    pub fn until(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.intervals.len());
        for &(s, e) in &self.intervals {
            let stretched_end = other
                .intervals
                .iter()
                .map(|&(bs, _)| bs)
                .find(|&bs| bs >= e)
                .unwrap_or(e);
            out.push((s, stretched_end));
        }
        normalize(Self { intervals: out })
    }

    /// "Reject": drops (wholesale) any `self` interval that intersects any
    /// `other` interval.
    pub fn reject(&self, other: &Self) -> Self {
        let out = self
            .intervals
            .iter()
            .copied()
            .filter(|&(s, e)| !other.intervals.iter().any(|&(bs, be)| s < be && bs < e))
            .collect();
        Self { intervals: out }
    }

    /// "Select": keeps only `self` intervals entirely contained within
    /// some `other` interval.
    pub fn select(&self, other: &Self) -> Self {
        let out = self
            .intervals
            .iter()
            .copied()
            .filter(|&(s, e)| other.intervals.iter().any(|&(bs, be)| bs <= s && e <= be))
            .collect();
        Self { intervals: out }
    }

    /// "Stretch-start": `other`'s intervals, with each start moved down to
    /// the start of the `self` interval that contains (or most recently
    /// precedes) it.
    pub fn stretch_start(&self, other: &Self) -> Self {
        let out = other
            .intervals
            .iter()
            .map(|&(s, e)| {
                let aligned = self
                    .intervals
                    .iter()
                    .rev()
                    .map(|&(as_, _)| as_)
                    .find(|&as_| as_ <= s)
                    .unwrap_or(s);
                (aligned, e)
            })
            .collect();
        normalize(Self { intervals: out })
    }

    /// "Stretch-stop": `self`'s intervals, with each end extended up to
    /// the end of the next `other` boundary at or after it.
    pub fn stretch_stop(&self, other: &Self) -> Self {
        let out = self
            .intervals
            .iter()
            .map(|&(s, e)| {
                let aligned = other
                    .intervals
                    .iter()
                    .map(|&(_, ae)| ae)
                    .find(|&ae| ae >= e)
                    .unwrap_or(e);
                (s, aligned)
            })
            .collect();
        normalize(Self { intervals: out })
    }

    /// The `k`-th interval, 1-based; negative `k` counts from the end.
    pub fn index(&self, k: i64) -> Self {
        if k == 0 || self.intervals.is_empty() {
            return Self::empty();
        }
        let idx = if k > 0 {
            (k - 1) as usize
        } else {
            let from_end = (-k - 1) as usize;
            match self.intervals.len().checked_sub(from_end + 1) {
                Some(i) => i,
                None => return Self::empty(),
            }
        };
        match self.intervals.get(idx) {
            Some(&iv) => Self {
                intervals: vec![iv],
            },
            None => Self::empty(),
        }
    }
}

fn normalize(mut set: IntervalSet) -> IntervalSet {
    set.intervals.sort_unstable();
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(set.intervals.len());
    for (s, e) in set.intervals {
        if let Some(last) = merged.last_mut() {
            if s <= last.1 {
                last.1 = last.1.max(e);
                continue;
            }
        }
        merged.push((s, e));
    }
    IntervalSet { intervals: merged }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_coalesces_touching_intervals() {
        let a = IntervalSet::single(0, 10);
        let b = IntervalSet::single(10, 20);
        assert_eq!(a.union(&b).as_slice(), &[(0, 20)]);
    }

    #[test]
    fn complement_of_full_domain_is_empty() {
        let a = IntervalSet::single(0, 100);
        assert!(a.complement((0, 100)).is_empty());
    }

    #[test]
    fn intersect_distributes_over_union() {
        let a = IntervalSet::single(0, 10);
        let b = IntervalSet::single(20, 30);
        let c = IntervalSet::single(5, 25);
        let lhs = a.union(&b).intersect(&c);
        let rhs = a.intersect(&c).union(&b.intersect(&c));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn complement_is_involutive_within_domain() {
        let a = IntervalSet::single(5, 15).union(&IntervalSet::single(20, 25));
        let domain = (0, 30);
        let double = a.complement(domain).complement(domain);
        assert_eq!(a, double);
    }

    #[test]
    fn select_keeps_only_fully_contained_intervals() {
        let a = IntervalSet::single(0, 5).union(&IntervalSet::single(10, 30));
        let b = IntervalSet::single(8, 20);
        assert_eq!(a.select(&b).as_slice(), &[] as &[(i64, i64)]);
    }

    #[test]
    fn index_supports_negative_from_end() {
        let a = IntervalSet::from_sorted(vec![(0, 1), (2, 3), (4, 5)]);
        assert_eq!(a.index(-1).as_slice(), &[(4, 5)]);
        assert_eq!(a.index(1).as_slice(), &[(0, 1)]);
    }
}
