//! Output of one estimation run.

use std::time::Duration;

use serde::Serialize;

use crate::error::Error;

/// Average rendezvous time plus the step-indexed cumulative distribution of
/// the rendezvous step, as produced by one engine call.
///
/// A `Results` value is built once by its producing engine and read-only
/// afterwards; engines never retain references to values they returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    average_time: Duration,
    /// Prefix-summed step probabilities; index 0 is pinned to 0.
    cdf: Vec<f64>,
}

impl Results {
    pub(crate) fn new(average_time: Duration, cdf: Vec<f64>) -> Self {
        debug_assert!(!cdf.is_empty() && cdf[0] == 0.0);
        Self { average_time, cdf }
    }

    /// The average rendezvous time.
    pub fn average_time(&self) -> Duration {
        self.average_time
    }

    /// Cumulative probability that rendezvous happens within `steps` frames,
    /// i.e. P(X <= steps) for the 1-indexed rendezvous step X.
    ///
    /// Queries beyond the last recorded step return exactly 1; the
    /// probability mass is exhausted there. `steps == 0` fails with
    /// [`Error::InvalidQuery`].
    pub fn cdf(&self, steps: usize) -> Result<f64, Error> {
        if steps < 1 {
            return Err(Error::query("steps must be greater than zero"));
        }
        if steps >= self.cdf.len() {
            return Ok(1.0);
        }
        Ok(self.cdf[steps])
    }

    /// The last step with a recorded probability entry.
    pub fn max_step(&self) -> usize {
        self.cdf.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Results {
        Results::new(
            Duration::from_secs_f64(1.25),
            vec![0.0, 0.5, 0.75, 0.875],
        )
    }

    #[test]
    fn step_zero_is_an_invalid_query() {
        assert!(matches!(sample().cdf(0), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn recorded_steps_are_returned_verbatim() {
        let results = sample();
        assert_eq!(results.cdf(1).unwrap(), 0.5);
        assert_eq!(results.cdf(3).unwrap(), 0.875);
        assert_eq!(results.max_step(), 3);
    }

    #[test]
    fn queries_beyond_the_recorded_range_return_one() {
        let results = sample();
        assert_eq!(results.cdf(4).unwrap(), 1.0);
        assert_eq!(results.cdf(1000).unwrap(), 1.0);
    }
}
