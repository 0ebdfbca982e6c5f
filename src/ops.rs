use std::{
    fmt::{Debug, Display, Formatter},
    ops::Sub,
};

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

pub type Interval<Tz = Local> = RangeExclusive<DateTime<Tz>>;

#[must_use]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct RangeExclusive<T: Copy> {
    pub start: T,
    pub end: T,
}

impl<T: Copy + Debug> Debug for RangeExclusive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}–{}", self.start.format("%a %H:%M"), self.end.format("%H:%M"))
    }
}

impl<T: Copy> RangeExclusive<T> {
    pub const fn from_std(range: std::ops::Range<T>) -> Self {
        Self { start: range.start, end: range.end }
    }

    pub const fn with_start(mut self, start: T) -> Self {
        self.start = start;
        self
    }

    pub const fn with_end(mut self, end: T) -> Self {
        self.end = end;
        self
    }
}

impl<T: Copy + Sub> RangeExclusive<T> {
    #[must_use]
    pub fn len(self) -> <T as Sub>::Output {
        self.end - self.start
    }
}

impl<T: Copy + PartialOrd> RangeExclusive<T> {
    #[must_use]
    pub fn contains(self, other: T) -> bool {
        (self.start <= other) && (other < self.end)
    }

    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        (self.start < other.end) && (other.start < self.end)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }
}

impl Interval {
    /// Length in minutes, rounded down.
    #[must_use]
    pub fn minutes(self) -> i64 {
        self.len().num_minutes()
    }

    /// Fraction of an hour covered by the interval.
    #[must_use]
    pub fn hours(self) -> f64 {
        self.len().as_seconds_f64() / 3600.0
    }

    /// Iterate over consecutive sub-intervals of the given step, the last one clipped to the end.
    pub fn steps(self, step: TimeDelta) -> impl Iterator<Item = Self> {
        let mut start = self.start;
        std::iter::from_fn(move || {
            if start >= self.end {
                return None;
            }
            let end = (start + step).min(self.end);
            let item = Self { start, end };
            start = end;
            Some(item)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_contains() {
        let interval = RangeExclusive::from_std(1..3);
        assert!(!interval.contains(0));
        assert!(interval.contains(1));
        assert!(interval.contains(2));
        assert!(!interval.contains(3));
    }

    #[test]
    fn test_overlaps() {
        let interval = RangeExclusive::from_std(1..3);
        assert!(interval.overlaps(RangeExclusive::from_std(2..4)));
        assert!(!interval.overlaps(RangeExclusive::from_std(3..4)));
        assert!(!interval.overlaps(RangeExclusive::from_std(-1..1)));
    }

    #[test]
    fn test_steps() {
        let start = Local.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let interval = Interval::from_std(start..start + TimeDelta::minutes(12));
        let steps = interval.steps(TimeDelta::minutes(5)).map(Interval::minutes).collect_vec();
        assert_eq!(steps, [5, 5, 2]);
    }
}
