//! Monte-Carlo estimator for the rendezvous-time distribution.
//!
//! Replays the scan procedure trial by trial against a randomized schedule
//! alignment and listening sequence, then averages. The random context is
//! caller-owned, so concurrent calls with separate generators need no
//! synchronization.

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use rand::Rng;

use crate::error::Error;
use crate::model::{designated_hit_cycle, frame_nanos, nanos_to_secs};
use crate::params::{ScheduleParams, DEFAULT_SLOT_DURATION, DEFAULT_TX_OFFSET};
use crate::results::Results;

/// Runs `num_runs` independent trials of the scan procedure and collects
/// the average rendezvous time and the empirical step distribution.
///
/// Fails with [`Error::InvalidQuery`] when `num_runs` is not positive, and
/// with [`Error::NoConvergence`] when detection is impossible (a trial
/// could then never terminate).
pub fn run<R: Rng + ?Sized>(
    params: &ScheduleParams,
    num_runs: i64,
    rng: &mut R,
) -> Result<Results, Error> {
    if num_runs <= 0 {
        return Err(Error::query("num_runs must be greater than 0"));
    }
    if designated_hit_cycle(params).iter().all(|&p| p <= 0.0) {
        return Err(Error::NoConvergence(
            "the beacon can never be detected with these probabilities".into(),
        ));
    }

    let channels = params.channels();
    let c = channels.len();
    let slot = DEFAULT_SLOT_DURATION.as_nanos() as i64;
    let tx_offset = DEFAULT_TX_OFFSET.as_nanos() as i64;
    let s = i64::from(params.slots_per_frame());
    let tsf = frame_nanos(params);
    let rotation = c as i64 * tsf;
    let t_scan = params.t_scan().as_nanos() as i64;
    let t_switch = params.t_switch().as_nanos() as i64;
    let t_eb = params.t_eb().as_nanos() as i64;

    // Detection probability per designated slot, indexed by `asn % c`.
    let slot_hit: Vec<f64> = (0..c)
        .map(|idx| params.p_eb() * params.p_sr()[&channels[idx]])
        .collect();

    let mut step_counts: BTreeMap<i64, i64> = BTreeMap::new();
    let mut average_secs = 0.0;

    for _ in 0..num_runs {
        let start = rng.gen_range(0..=rotation);
        let start_slot = start / slot;

        // First designated slot at or after the scan start: the start slot
        // itself only when it is designated and the transmission has not
        // already begun.
        let mut asn = if start_slot % s == 0 && start <= start_slot * slot + tx_offset {
            start_slot
        } else {
            start_slot + s - start_slot % s
        };

        let mut scanned = channels[rng.gen_range(0..c)];
        let mut selected_at = start;
        let mut next_selection = start + t_switch + t_scan;
        let mut switched = true;

        loop {
            let tx_time = asn * slot + tx_offset;
            let slot_index = (asn % c as i64) as usize;

            if c > 1 && tx_time >= next_selection {
                // Advance the listening schedule up to the scan window
                // covering the transmission time.
                loop {
                    let pick = channels[rng.gen_range(0..c)];
                    switched = pick != scanned;
                    scanned = pick;
                    selected_at = next_selection;
                    next_selection += if switched { t_switch + t_scan } else { t_scan };
                    if next_selection > tx_time {
                        break;
                    }
                }
            }

            let mid_switch = switched && tx_time < selected_at + t_switch;
            if !mid_switch
                && channels[slot_index] == scanned
                && rng.gen::<f64>() < slot_hit[slot_index]
            {
                average_secs += nanos_to_secs(tx_time - start + t_eb) / num_runs as f64;
                let step = ((tx_time - start) + tsf - 1) / tsf;
                *step_counts.entry(step).or_insert(0) += 1;
                break;
            }

            asn += s;
        }
    }

    debug!("collected {num_runs} rendezvous samples");

    // step_counts is non-empty: every trial ends in a recorded success.
    let max_step = step_counts.keys().next_back().copied().unwrap_or(0);
    let mut cdf = vec![0.0; (max_step + 1) as usize];
    let mut cumulative = 0i64;
    for (step, value) in cdf.iter_mut().enumerate().skip(1) {
        if let Some(&count) = step_counts.get(&(step as i64)) {
            cumulative += count;
        }
        *value = cumulative as f64 / num_runs as f64;
    }

    Ok(Results::new(Duration::from_secs_f64(average_secs), cdf))
}
