use std::cmp::Ordering;

use anyhow::{anyhow, bail};
use serde::Deserialize;

/// One horizon bucket. Half-open `[min, max)` unless it closes its set.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub key: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub inclusive_max: bool,
}

impl Interval {
    pub fn contains(&self, seconds: f64) -> bool {
        if !seconds.is_finite() {
            return false;
        }
        if self.inclusive_max {
            seconds >= self.min && seconds <= self.max
        } else {
            seconds >= self.min && seconds < self.max
        }
    }
}

// Bounds are finite by construction, so total ordering is sound.
impl Eq for Interval {}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.min
            .total_cmp(&other.min)
            .then(self.max.total_cmp(&other.max))
            .then(self.inclusive_max.cmp(&other.inclusive_max))
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| self.label.cmp(&other.label))
    }
}

/// Stepped bucket layout as it appears in the dictionary:
/// `start..end` in `step` increments, then one closed bucket `end..=last_max`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IntervalSpec {
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub last_max: f64,
}

impl IntervalSpec {
    pub const COMPOSITE: Self = Self {
        start: 10.0,
        end: 120.0,
        step: 10.0,
        last_max: 170.0,
    };

    pub const ATOMIC: Self = Self {
        start: 5.0,
        end: 40.0,
        step: 5.0,
        last_max: 50.0,
    };
}

/// Ordered, contiguous buckets. Every finite value inside
/// `[first.min, last.max]` falls in exactly one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn from_boundaries(bounds: &[f64]) -> anyhow::Result<Self> {
        if bounds.len() < 2 {
            bail!("an interval set needs at least two boundaries");
        }
        if let Some(bad) = bounds.iter().find(|b| !b.is_finite()) {
            bail!("interval boundary is not finite: {bad}");
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] >= pair[1]) {
            bail!(
                "interval boundaries must be strictly ascending: {} then {}",
                pair[0],
                pair[1]
            );
        }

        let last = bounds.len() - 2;
        let intervals = bounds
            .windows(2)
            .enumerate()
            .map(|(idx, pair)| {
                let (min, max) = (pair[0], pair[1]);
                let key = format!("{}-{}", fmt_bound(min), fmt_bound(max));
                Interval {
                    label: format!("{key}s"),
                    key,
                    min,
                    max,
                    inclusive_max: idx == last,
                }
            })
            .collect();

        Ok(Self { intervals })
    }

    pub fn stepped(spec: IntervalSpec) -> anyhow::Result<Self> {
        if [spec.start, spec.end, spec.step, spec.last_max]
            .iter()
            .any(|v| !v.is_finite())
        {
            bail!("interval layout must be finite: {spec:?}");
        }
        if spec.step <= 0.0 {
            return Err(anyhow!("interval step must be positive, got {}", spec.step));
        }
        if spec.end <= spec.start || spec.last_max <= spec.end {
            bail!(
                "invalid interval layout {}..{} then ..={}",
                spec.start,
                spec.end,
                spec.last_max
            );
        }

        let mut bounds = Vec::new();
        let mut at = spec.start;
        while at < spec.end {
            bounds.push(at);
            at += spec.step;
        }
        bounds.push(spec.end);
        bounds.push(spec.last_max);
        Self::from_boundaries(&bounds)
    }

    pub fn get(&self, key: &str) -> Option<&Interval> {
        self.intervals.iter().find(|it| it.key == key)
    }

    /// The single bucket holding `seconds`, if any.
    pub fn find(&self, seconds: f64) -> Option<&Interval> {
        self.intervals.iter().find(|it| it.contains(seconds))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.intervals.iter().map(|it| it.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

fn fmt_bound(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_layout_matches_dropdown() {
        let set = IntervalSet::stepped(IntervalSpec::COMPOSITE).unwrap();
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys.first(), Some(&"10-20"));
        assert_eq!(keys.last(), Some(&"120-170"));
        assert_eq!(set.len(), 12);
        assert_eq!(set.get("120-170").map(|it| it.label.as_str()), Some("120-170s"));
    }

    #[test]
    fn only_last_bucket_is_closed() {
        let set = IntervalSet::stepped(IntervalSpec::ATOMIC).unwrap();
        assert_eq!(set.find(10.0).map(|it| it.key.as_str()), Some("10-15"));
        assert_eq!(set.find(40.0).map(|it| it.key.as_str()), Some("40-50"));
        assert_eq!(set.find(50.0).map(|it| it.key.as_str()), Some("40-50"));
        assert!(set.find(50.5).is_none());
        assert!(set.find(4.9).is_none());
        assert!(set.find(f64::NAN).is_none());
    }

    #[test]
    fn rejects_non_ascending_boundaries() {
        assert!(IntervalSet::from_boundaries(&[10.0, 10.0, 20.0]).is_err());
        assert!(IntervalSet::from_boundaries(&[10.0]).is_err());
        assert!(IntervalSet::stepped(IntervalSpec {
            start: 0.0,
            end: 10.0,
            step: 0.0,
            last_max: 20.0
        })
        .is_err());
    }
}
