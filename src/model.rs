//! Analytic solver for the rendezvous-time distribution.
//!
//! Computes the exact average rendezvous time and the step-indexed
//! cumulative distribution by case analysis on how the scan window aligns
//! with the frame grid. The general (misaligned) case partitions each frame
//! recursively; the recursion is driven by an explicit worklist so depth and
//! memory stay bounded.

use std::time::Duration;

use log::debug;

use crate::error::Error;
use crate::interval::TimeInterval;
use crate::params::{ScheduleParams, DEFAULT_SLOT_DURATION};
use crate::results::Results;

/// The per-step series is truncated once this much probability mass has
/// been accounted for.
const CONVERGENCE_THRESHOLD: f64 = 1.0 - 1e-9;

/// Worklist branches carrying less mass than this are dropped.
const MASS_EPSILON: f64 = 1e-9;

/// Hard bound on the truncated series length (cases 1 and 2).
const MAX_STEPS: usize = 10_000_000;

/// Hard bound on the number of worklist branches (general case).
const MAX_BRANCHES: usize = 4_000_000;

/// Calculates the average rendezvous time and the cumulative distribution
/// of the rendezvous step for the given schedule.
///
/// Deterministic and single-threaded; the channel switch delay is assumed
/// negligible and ignored. Fails with [`Error::NoConvergence`] when the
/// probability series cannot be exhausted (detection impossible, or the
/// iteration bound exceeded).
pub fn calculate(params: &ScheduleParams) -> Result<Results, Error> {
    let tsf = frame_nanos(params);
    let t_scan = params.t_scan().as_nanos() as i64;
    let tsf_secs = nanos_to_secs(tsf);
    let t_eb_secs = params.t_eb().as_secs_f64();

    let hits = designated_hit_cycle(params);
    if hits.iter().all(|&p| p <= 0.0) {
        return Err(Error::NoConvergence(
            "the beacon can never be detected with these probabilities".into(),
        ));
    }

    let (average_secs, per_step) = if t_scan < tsf {
        debug!("scan window shorter than one frame");
        sum_truncated_series(&hits, tsf_secs, t_eb_secs, |state, k| {
            state.short_scan_step(&hits, k)
        })
    } else if t_scan % tsf == 0 {
        let windows = t_scan / tsf;
        debug!("scan window spans {windows} whole frames");
        sum_truncated_series(&hits, tsf_secs, t_eb_secs, |state, k| {
            state.aligned_scan_step(&hits, k, windows)
        })
    } else {
        debug!(
            "scan window misaligned with the frame grid (ratio {:.4})",
            t_scan as f64 / tsf as f64
        );
        general_case(&hits, t_scan, tsf, t_eb_secs)
    }?;

    let mut cdf = Vec::with_capacity(per_step.len());
    cdf.push(0.0);
    for k in 1..per_step.len() {
        cdf.push(cdf[k - 1] + per_step[k]);
    }

    Ok(Results::new(Duration::from_secs_f64(average_secs), cdf))
}

pub(crate) fn frame_nanos(params: &ScheduleParams) -> i64 {
    DEFAULT_SLOT_DURATION.as_nanos() as i64 * i64::from(params.slots_per_frame())
}

pub(crate) fn nanos_to_secs(nanos: i64) -> f64 {
    nanos as f64 * 1e-9
}

/// Detection probability (`p_eb * p_sr`) of the designated slot's channel,
/// per frame index over one channel-rotation cycle.
///
/// Because the slot count and channel count are coprime, consecutive frames
/// walk a permutation of the hopping sequence.
pub(crate) fn designated_hit_cycle(params: &ScheduleParams) -> Vec<f64> {
    let channels = params.channels();
    let c = channels.len();
    let s = params.slots_per_frame() as usize;
    (0..c)
        .map(|j| {
            let channel = channels[(j * s) % c];
            params.p_eb() * params.p_sr()[&channel]
        })
        .collect()
}

/// Incremental per-offset survival state for cases 1 and 2.
///
/// Entry `y` is the probability that a listener starting at channel-cycle
/// offset `y` has missed every step so far (case 1), or the product of the
/// per-window survival factors over completed scan windows together with the
/// running hit-mass of the current window (case 2).
struct OffsetState {
    survival: Vec<f64>,
    window_mass: Vec<f64>,
}

impl OffsetState {
    fn new(c: usize) -> Self {
        Self {
            survival: vec![1.0; c],
            window_mass: vec![0.0; c],
        }
    }

    /// P(rendezvous at step `k`), scan window shorter than one frame.
    fn short_scan_step(&mut self, hits: &[f64], k: usize) -> f64 {
        let c = hits.len();
        let c_f = c as f64;
        let mut p_k = 0.0;
        for y in 0..c {
            let p_step = hits[(y + k - 1) % c] / c_f;
            p_k += self.survival[y] * p_step / c_f;
            self.survival[y] *= 1.0 - p_step;
        }
        p_k
    }

    /// P(rendezvous at step `k`), scan window spanning `windows` frames.
    ///
    /// Repeated visits to the same channel inside one window compound: the
    /// base hit probability is damped by the survival factor of the visits
    /// already made within the window.
    fn aligned_scan_step(&mut self, hits: &[f64], k: usize, windows: i64) -> f64 {
        let c = hits.len();
        let c_f = c as f64;
        let k_i = k as i64;
        let window_first = ((k_i - 1) / windows) * windows + 1;
        if k_i > 1 && k_i == window_first {
            for y in 0..c {
                self.survival[y] *= 1.0 - self.window_mass[y];
                self.window_mass[y] = 0.0;
            }
        }
        let revisits = ((k_i - window_first) / c as i64) as i32;
        let mut p_k = 0.0;
        for y in 0..c {
            let base = hits[(y + k - 1) % c];
            let p_step = (1.0 - base).powi(revisits) * base / c_f;
            p_k += self.survival[y] * p_step / c_f;
            self.window_mass[y] += p_step;
        }
        p_k
    }
}

/// Sums `P(k) * [(k - 1) * Tsf + Tsf / 2 + t_eb]` until the cumulative
/// probability reaches the truncation threshold, recording each step's
/// probability along the way.
fn sum_truncated_series(
    hits: &[f64],
    tsf_secs: f64,
    t_eb_secs: f64,
    mut step_probability: impl FnMut(&mut OffsetState, usize) -> f64,
) -> Result<(f64, Vec<f64>), Error> {
    let mut state = OffsetState::new(hits.len());
    let mut per_step = vec![0.0];
    let mut cumulative = 0.0;
    let mut average = 0.0;
    let mut k = 1;
    while cumulative < CONVERGENCE_THRESHOLD {
        if k > MAX_STEPS {
            return Err(Error::NoConvergence(format!(
                "series did not reach the truncation threshold within {MAX_STEPS} steps"
            )));
        }
        let p_k = step_probability(&mut state, k);
        cumulative += p_k;
        average += p_k * ((k - 1) as f64 * tsf_secs + tsf_secs / 2.0 + t_eb_secs);
        per_step.push(p_k);
        k += 1;
    }
    Ok((average, per_step))
}

/// One unresolved continuation of the general-case partition: probability
/// mass `mass` that has survived up to scan window `window`, restricted to
/// the still-live portion of the designated-slot timing within a frame.
struct Branch {
    mass: f64,
    window: i64,
    live: TimeInterval,
}

/// General case: the scan window is longer than a frame but not a whole
/// multiple of it, so every window boundary splits a frame into a part
/// already covered by the previous window and a misaligned remainder.
///
/// Each worklist branch resolves one scan window: the first
/// (possibly partially covered) designated-slot occurrence, the interior
/// occurrences, and the last occurrence weighted by its covered fraction.
/// It then continues onto the aligned remainder and, when the next boundary
/// is itself misaligned, onto the non-covered remainder.
fn general_case(
    hits: &[f64],
    t_scan: i64,
    tsf: i64,
    t_eb_secs: f64,
) -> Result<(f64, Vec<f64>), Error> {
    let c = hits.len();
    let c_i = c as i64;
    let c_f = c as f64;
    let tsf_secs = nanos_to_secs(tsf);
    let nanos = |v: i64| Duration::from_nanos(v as u64);

    // B(i): does scan window i start off the frame grid?
    let misaligned = |window: i64| ((window - 1) * t_scan) % tsf != 0;

    let mut per_step = vec![0.0];
    let mut average = 0.0;
    let mut branches = 0usize;

    for y in 0..c {
        let mut worklist = vec![Branch {
            mass: 1.0,
            window: 1,
            live: TimeInterval::new(Duration::ZERO, nanos(tsf))?,
        }];

        while let Some(Branch { mass, window, live }) = worklist.pop() {
            if live.is_empty() || mass < MASS_EPSILON {
                continue;
            }
            branches += 1;
            if branches > MAX_BRANCHES {
                return Err(Error::NoConvergence(format!(
                    "partition did not exhaust its mass within {MAX_BRANCHES} branches"
                )));
            }

            let boundary = (window * t_scan) % tsf;
            // Within the frame holding this window's end: [0, boundary] is
            // covered by the window, [boundary, Tsf] is not.
            let covered_head = TimeInterval::new(Duration::ZERO, nanos(boundary))?;
            let uncovered_tail = TimeInterval::new(nanos(boundary), nanos(tsf))?;
            let next_misaligned = boundary != 0;
            let aligned_live = if next_misaligned {
                TimeInterval::intersection(live, covered_head)
            } else {
                live
            };

            let k_first = if misaligned(window) {
                (((window - 1) * t_scan) + tsf - 1) / tsf
            } else {
                (window - 1) * t_scan / tsf + 1
            };
            let k_last = ((window * t_scan) + tsf - 1) / tsf;

            let window_tail =
                TimeInterval::new(nanos(((window - 1) * t_scan) % tsf), nanos(tsf))?;
            let first_covered = !misaligned(window) || live.is_subset_of(&window_tail);

            let p_step = |k: i64| hits[((y as i64 + k - 1) % c_i) as usize] / c_f;
            let base = |k: i64| hits[((y as i64 + k - 1) % c_i) as usize];
            // Designated-slot visits within this window up to step k.
            let visits = |k: i64| {
                if first_covered {
                    k - k_first + 1
                } else {
                    k - k_first
                }
            };
            let p_step_repeat =
                |k: i64| (1.0 - base(k)).powi(((visits(k) - 1) / c_i) as i32) * p_step(k);

            let p_first = if first_covered { p_step(k_first) } else { 0.0 };
            let hit_first = mass * p_first;
            let live_mid = midpoint_offset_secs(&live);
            let mut expected =
                hit_first * ((k_first - 1) as f64 * tsf_secs + live_mid + t_eb_secs);
            add_step(&mut per_step, k_first as usize, hit_first / c_f);

            let mut interior_mass = 0.0;
            for k in (k_first + 1)..k_last {
                let p = p_step_repeat(k);
                let hit = mass * p;
                interior_mass += p;
                expected += hit * ((k - 1) as f64 * tsf_secs + live_mid + t_eb_secs);
                add_step(&mut per_step, k as usize, hit / c_f);
            }

            // Fraction of the live window that the scan still covers at the
            // last occurrence. `live` has positive length here: a zero-length
            // interval only ever arrives on a branch with zero mass.
            let covered_share = if next_misaligned {
                length_ratio(TimeInterval::intersection(live, covered_head), live)
            } else {
                1.0
            };
            let p_last = (1.0 - base(k_last)).powi((visits(k_last - 1) / c_i) as i32)
                * p_step(k_last);
            let hit_last = mass * covered_share * p_last;
            if !aligned_live.is_empty() {
                expected += hit_last
                    * ((k_last - 1) as f64 * tsf_secs
                        + midpoint_offset_secs(&aligned_live)
                        + t_eb_secs);
            }
            add_step(&mut per_step, k_last as usize, hit_last / c_f);

            average += expected / c_f;

            let aligned_mass =
                mass * covered_share * (1.0 - (p_first + p_last + interior_mass));
            worklist.push(Branch {
                mass: aligned_mass,
                window: window + 1,
                live: aligned_live,
            });
            if next_misaligned {
                let uncovered_live = TimeInterval::intersection(live, uncovered_tail);
                let uncovered_mass = mass
                    * length_ratio(uncovered_live, live)
                    * (1.0 - (p_first + interior_mass));
                worklist.push(Branch {
                    mass: uncovered_mass,
                    window: window + 1,
                    live: uncovered_live,
                });
            }
        }
    }

    Ok((average, per_step))
}

/// Offset of the interval midpoint from the frame start, in seconds.
fn midpoint_offset_secs(interval: &TimeInterval) -> f64 {
    match interval.start() {
        Some(start) => start.as_secs_f64() + interval.length().as_secs_f64() / 2.0,
        None => 0.0,
    }
}

fn length_ratio(part: TimeInterval, whole: TimeInterval) -> f64 {
    part.length().as_nanos() as f64 / whole.length().as_nanos() as f64
}

fn add_step(per_step: &mut Vec<f64>, step: usize, p: f64) {
    if step >= per_step.len() {
        per_step.resize(step + 1, 0.0);
    }
    per_step[step] += p;
}
