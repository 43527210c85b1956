//! Partition descriptors: time windows and fingerprint intervals.
//!
//! A [`Period`] is open-ended on the wire: an absent start realizes to the
//! release epoch, an absent end realizes to "now". Time ranges are
//! half-open `[start, end)` uniformly across hashing, counting, and
//! listing. Fingerprint ranges are inclusive on both bounds.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// The earliest realizable timestamp: 2025-01-01T00:00:00Z.
pub const RELEASE_EPOCH_UNIX: i64 = 1_735_689_600;

/// The release epoch as a timestamp.
pub fn release_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(RELEASE_EPOCH_UNIX, 0).unwrap_or_default()
}

/// A time window over message/bulletin `created_at` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Period {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<DateTime<Utc>>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// The whole realizable timeline.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Realize the start bound: absent means the release epoch.
    pub fn realize_start(&self) -> DateTime<Utc> {
        self.start.unwrap_or_else(release_epoch)
    }

    /// Realize the end bound against the given "now".
    pub fn realize_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end.unwrap_or(now)
    }

    /// Realize both bounds.
    pub fn realize(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.realize_start(), self.realize_end(now))
    }

    /// Half-open containment: `start <= t < end`.
    pub fn contains(&self, t: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (start, end) = self.realize(now);
        t >= start && t < end
    }

    /// Two periods cover the same window once realized.
    pub fn same_window(&self, other: &Period, now: DateTime<Utc>) -> bool {
        self.realize(now) == other.realize(now)
    }

    /// Divide the realized window into `n` contiguous sub-periods.
    ///
    /// The final sub-period absorbs the rounding remainder so the union
    /// exactly covers the input. `n` of zero is treated as one part.
    pub fn split(&self, n: usize, now: DateTime<Utc>) -> Vec<Period> {
        let (start, end) = self.realize(now);
        let n = n.max(1);
        let total = end - start;
        let part = total / n as i32;

        let mut parts = Vec::with_capacity(n);
        let mut cursor = start;
        for i in 0..n {
            let part_end = if i == n - 1 { end } else { cursor + part };
            parts.push(Period::new(cursor, part_end));
            cursor = part_end;
        }
        parts
    }
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    let days_back = now.weekday().num_days_from_monday() as i64;
    (now - Duration::days(days_back))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// An interval over fingerprint lexicographic order, inclusive on both
/// bounds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StringRange {
    pub start: String,
    pub end: String,
}

impl StringRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Inclusive containment: `start <= s <= end`.
    pub fn contains(&self, s: &str) -> bool {
        s >= self.start.as_str() && s <= self.end.as_str()
    }
}
