//! Inclusive time intervals.
use chrono::{DateTime, Duration, Utc};

/// An inclusive interval `[t0, t1]` with `t0 <= t1`.
///
/// A range with `t0 == t1` is empty for coverage purposes but still
/// contains its single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start of the interval.
    pub t0: DateTime<Utc>,
    /// End of the interval.
    pub t1: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range, swapping the bounds if they arrive reversed.
    pub fn new(t0: DateTime<Utc>, t1: DateTime<Utc>) -> TimeRange {
        if t1 < t0 {
            TimeRange { t0: t1, t1: t0 }
        } else {
            TimeRange { t0, t1 }
        }
    }

    /// Whether the range spans no time at all.
    pub fn is_empty(&self) -> bool {
        self.t0 == self.t1
    }

    /// Whether `t` lies within the range, bounds included.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.t0 <= t && t <= self.t1
    }

    /// Whether the two ranges share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.t0 <= other.t1 && other.t0 <= self.t1
    }

    /// Returns the largest range contained in both, or an empty range when
    /// the two are disjoint.
    pub fn intersect(&self, other: &TimeRange) -> TimeRange {
        let t0 = self.t0.max(other.t0);
        let t1 = self.t1.min(other.t1);
        if t1 < t0 {
            TimeRange { t0, t1: t0 }
        } else {
            TimeRange { t0, t1 }
        }
    }

    /// Snaps `t0` up and `t1` down to multiples of `d` since the Unix
    /// epoch. Returns an empty range when no multiple lies within.
    pub fn constrain(&self, d: Duration) -> TimeRange {
        let step = d.num_milliseconds();
        if step <= 0 {
            return *self;
        }
        let t0 = ceil_multiple(self.t0.timestamp_millis(), step);
        let t1 = floor_multiple(self.t1.timestamp_millis(), step);
        if t1 < t0 {
            TimeRange {
                t0: from_millis(t0),
                t1: from_millis(t0),
            }
        } else {
            TimeRange {
                t0: from_millis(t0),
                t1: from_millis(t1),
            }
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::milliseconds(ms)
}

fn ceil_multiple(ms: i64, step: i64) -> i64 {
    let rem = ms.rem_euclid(step);
    if rem == 0 { ms } else { ms - rem + step }
}

fn floor_multiple(ms: i64, step: i64) -> i64 {
    ms - ms.rem_euclid(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn range(t0: i64, t1: i64) -> TimeRange {
        TimeRange::new(at(t0), at(t1))
    }

    #[test]
    fn new_swaps_reversed_bounds() {
        let r = range(100, 10);
        assert_eq!(r.t0, at(10));
        assert_eq!(r.t1, at(100));
    }

    #[test]
    fn intersect_is_idempotent_and_commutative() {
        let r = range(10, 100);
        let s = range(50, 200);
        assert_eq!(r.intersect(&r), r);
        assert_eq!(r.intersect(&s), s.intersect(&r));
        assert_eq!(r.intersect(&s), range(50, 100));
    }

    #[test]
    fn disjoint_ranges_intersect_empty() {
        let r = range(0, 10);
        let s = range(20, 30);
        assert!(!r.overlaps(&s));
        assert!(r.intersect(&s).is_empty());
    }

    #[test]
    fn overlap_matches_nonempty_intersection() {
        let cases = [
            (range(0, 10), range(10, 20)),
            (range(0, 100), range(5, 6)),
            (range(0, 5), range(6, 10)),
            (range(3, 3), range(0, 10)),
        ];
        for (r, s) in cases {
            let meets = r.overlaps(&s);
            assert_eq!(meets, s.overlaps(&r));
            if meets {
                assert!(r.contains(r.intersect(&s).t0));
            } else {
                assert!(r.intersect(&s).is_empty());
            }
        }
    }

    #[test]
    fn constrain_snaps_inward_to_multiples() {
        let hour = Duration::hours(1);
        let r = range(3600 + 120, 4 * 3600 + 1800);
        let c = r.constrain(hour);
        assert_eq!(c.t0, at(2 * 3600));
        assert_eq!(c.t1, at(4 * 3600));
        assert_eq!(c.t0.timestamp_millis() % hour.num_milliseconds(), 0);
        assert_eq!(c.t1.timestamp_millis() % hour.num_milliseconds(), 0);
    }

    #[test]
    fn constrain_keeps_aligned_bounds() {
        let hour = Duration::hours(1);
        let r = range(3600, 7200);
        assert_eq!(r.constrain(hour), r);
    }

    #[test]
    fn constrain_with_no_inner_multiple_is_empty() {
        let r = range(3700, 4000);
        assert!(r.constrain(Duration::hours(1)).is_empty());
    }

    #[test]
    fn constrain_before_epoch_rounds_toward_later_multiples() {
        let r = range(-5400, -1800);
        let c = r.constrain(Duration::hours(1));
        assert_eq!(c.t0, at(-3600));
        assert_eq!(c.t1, at(-3600));
    }
}
