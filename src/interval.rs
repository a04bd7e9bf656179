//! Closed time intervals over one frame's worth of time.
//!
//! Used by the analytic solver's general case to track which portion of a
//! frame's designated-slot timing is still live while it partitions a scan
//! window across frame boundaries.

use std::time::Duration;

use crate::error::Error;

/// A closed, possibly-empty time interval.
///
/// A zero-length interval `[x, x]` is non-empty; only `Empty` carries no
/// points at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInterval {
    Empty,
    NonEmpty { start: Duration, end: Duration },
}

impl TimeInterval {
    /// The interval containing no points.
    pub const fn empty() -> Self {
        TimeInterval::Empty
    }

    /// Creates the interval `[start, end]`.
    ///
    /// Fails with [`Error::InvalidQuery`] if `start > end`.
    pub fn new(start: Duration, end: Duration) -> Result<Self, Error> {
        if start > end {
            return Err(Error::query("interval start must not exceed its end"));
        }
        Ok(TimeInterval::NonEmpty { start, end })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TimeInterval::Empty)
    }

    /// Length of the interval; zero for the empty interval.
    pub fn length(&self) -> Duration {
        match *self {
            TimeInterval::Empty => Duration::ZERO,
            TimeInterval::NonEmpty { start, end } => end - start,
        }
    }

    pub fn start(&self) -> Option<Duration> {
        match *self {
            TimeInterval::Empty => None,
            TimeInterval::NonEmpty { start, .. } => Some(start),
        }
    }

    pub fn end(&self) -> Option<Duration> {
        match *self {
            TimeInterval::Empty => None,
            TimeInterval::NonEmpty { end, .. } => Some(end),
        }
    }

    /// Whether `self` lies entirely within `other`.
    ///
    /// The empty interval is not considered a subset of anything, nor a
    /// superset of anything.
    pub fn is_subset_of(&self, other: &TimeInterval) -> bool {
        match (*self, *other) {
            (
                TimeInterval::NonEmpty { start, end },
                TimeInterval::NonEmpty {
                    start: other_start,
                    end: other_end,
                },
            ) => other_start <= start && other_end >= end,
            _ => false,
        }
    }

    /// The common part of two intervals; empty when they are disjoint.
    ///
    /// Intervals that merely touch at an endpoint intersect to a zero-length
    /// (non-empty) interval.
    pub fn intersection(a: TimeInterval, b: TimeInterval) -> TimeInterval {
        match (a, b) {
            (
                TimeInterval::NonEmpty {
                    start: a_start,
                    end: a_end,
                },
                TimeInterval::NonEmpty {
                    start: b_start,
                    end: b_end,
                },
            ) if a_start <= b_end && a_end >= b_start => TimeInterval::NonEmpty {
                start: a_start.max(b_start),
                end: a_end.min(b_end),
            },
            _ => TimeInterval::Empty,
        }
    }
}
