//! Validated, immutable description of the hopping schedule and the
//! detection probabilities.
//!
//! Both estimation engines accept a [`ScheduleParams`] and nothing else; all
//! invariants are established here, atomically, at construction time.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::Error;

/// Lowest valid channel id in the 2.4 GHz band.
pub const MIN_CHANNEL: u8 = 11;

/// Highest valid channel id in the 2.4 GHz band.
pub const MAX_CHANNEL: u8 = 26;

/// Default duration of one time slot (2.4 GHz band slot template).
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_millis(10);

/// Time between the start of a slot and the start of frame transmission,
/// for the default 2.4 GHz slot template. Only the simulator resolves time
/// this finely; the analytic model works at frame granularity.
pub const DEFAULT_TX_OFFSET: Duration = Duration::from_micros(2120);

/// The standard hopping sequence for a network using `channel_count`
/// channels (1 to 16 in the 2.4 GHz band), or `None` outside that range.
pub fn default_hopping_sequence(channel_count: usize) -> Option<&'static [u8]> {
    const SEQUENCES: [&[u8]; 16] = [
        &[11],
        &[11, 12],
        &[11, 13, 12],
        &[11, 13, 14, 12],
        &[11, 13, 14, 15, 12],
        &[16, 12, 15, 11, 13, 14],
        &[14, 13, 15, 11, 16, 12, 17],
        &[16, 12, 15, 11, 14, 13, 17, 18],
        &[11, 13, 12, 16, 17, 18, 19, 14, 15],
        &[16, 12, 19, 13, 17, 14, 20, 18, 15, 11],
        &[16, 12, 11, 20, 17, 18, 14, 13, 19, 15, 21],
        &[16, 19, 15, 20, 13, 12, 21, 18, 22, 11, 14, 17],
        &[15, 13, 20, 19, 17, 23, 16, 12, 21, 22, 14, 11, 18],
        &[14, 11, 21, 18, 16, 19, 17, 20, 22, 24, 15, 23, 12, 13],
        &[17, 22, 24, 18, 12, 11, 25, 13, 19, 16, 14, 15, 20, 23, 21],
        &[16, 17, 23, 18, 26, 15, 25, 22, 19, 11, 12, 13, 24, 14, 20, 21],
    ];
    match channel_count {
        1..=16 => Some(SEQUENCES[channel_count - 1]),
        _ => None,
    }
}

/// Parameters of the beacon scan procedure.
///
/// Immutable once constructed; accessors are pure reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleParams {
    /// Channel hopping sequence.
    channels: Vec<u8>,
    /// Number of slots in one frame.
    slots_per_frame: u32,
    /// Probability that a beacon is transmitted on a designated slot.
    p_eb: f64,
    /// Per-channel probability of successfully receiving a transmitted beacon.
    p_sr: BTreeMap<u8, f64>,
    /// Time a selected channel is scanned before the next selection.
    t_scan: Duration,
    /// Channel switch delay.
    t_switch: Duration,
    /// Time occupied by one beacon transmission.
    t_eb: Duration,
}

impl ScheduleParams {
    /// Creates a validated parameter set.
    ///
    /// Fails with [`Error::InvalidConfig`] if:
    /// (a) `channels` contains an id outside `11..=26`, or
    /// (b) `channels` contains an id more than once, or
    /// (c) `slots_per_frame` is zero, or
    /// (d) `slots_per_frame` and the channel count are not coprime, or
    /// (e) `p_eb` is not a probability, or
    /// (f) `p_sr` misses a channel of `channels`, holds an invalid
    ///     probability, or holds channels outside the sequence, or
    /// (g) `t_scan` is zero.
    ///
    /// Construction is atomic: on failure no partially-built value escapes.
    pub fn new(
        channels: Vec<u8>,
        slots_per_frame: u32,
        p_eb: f64,
        p_sr: BTreeMap<u8, f64>,
        t_scan: Duration,
        t_switch: Duration,
        t_eb: Duration,
    ) -> Result<Self, Error> {
        for &channel in &channels {
            if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
                return Err(Error::config(format!(
                    "channel {channel} is outside the valid range {MIN_CHANNEL}..={MAX_CHANNEL}"
                )));
            }
        }

        for (idx, &channel) in channels.iter().enumerate() {
            if channels[idx + 1..].contains(&channel) {
                return Err(Error::config(format!(
                    "channel {channel} appears more than once in the hopping sequence"
                )));
            }
        }

        if slots_per_frame == 0 {
            return Err(Error::config("slots_per_frame must be greater than 0"));
        }

        if gcd(channels.len() as u64, u64::from(slots_per_frame)) != 1 {
            return Err(Error::config(
                "the channel count and slots_per_frame must be coprime",
            ));
        }

        if !(0.0..=1.0).contains(&p_eb) {
            return Err(Error::config("p_eb is not a valid probability"));
        }

        for &channel in &channels {
            match p_sr.get(&channel) {
                None => {
                    return Err(Error::config(format!(
                        "p_sr has no entry for channel {channel}"
                    )))
                }
                Some(p) if !(0.0..=1.0).contains(p) => {
                    return Err(Error::config(format!(
                        "p_sr holds an invalid probability for channel {channel}"
                    )))
                }
                Some(_) => {}
            }
        }

        if p_sr.len() > channels.len() {
            return Err(Error::config(
                "p_sr holds entries for channels outside the hopping sequence",
            ));
        }

        if t_scan.is_zero() {
            return Err(Error::config("t_scan must be greater than 0"));
        }

        Ok(Self {
            channels,
            slots_per_frame,
            p_eb,
            p_sr,
            t_scan,
            t_switch,
            t_eb,
        })
    }

    /// The channel hopping sequence.
    pub fn channels(&self) -> &[u8] {
        &self.channels
    }

    /// Number of slots per frame.
    pub fn slots_per_frame(&self) -> u32 {
        self.slots_per_frame
    }

    /// Probability that a beacon is transmitted on a designated slot.
    pub fn p_eb(&self) -> f64 {
        self.p_eb
    }

    /// Per-channel beacon reception probabilities.
    pub fn p_sr(&self) -> &BTreeMap<u8, f64> {
        &self.p_sr
    }

    /// Mean of the per-channel reception probabilities.
    pub fn mean_p_sr(&self) -> f64 {
        self.p_sr.values().sum::<f64>() / self.p_sr.len() as f64
    }

    /// Scan dwell time per channel selection.
    pub fn t_scan(&self) -> Duration {
        self.t_scan
    }

    /// Channel switch delay.
    pub fn t_switch(&self) -> Duration {
        self.t_switch
    }

    /// Beacon transmission duration.
    pub fn t_eb(&self) -> Duration {
        self.t_eb
    }

    /// Wall-clock length of one frame.
    pub fn frame_duration(&self) -> Duration {
        DEFAULT_SLOT_DURATION * self.slots_per_frame
    }
}

impl fmt::Display for ScheduleParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ScheduleParams{{")?;
        writeln!(f, "channels: {:?}", self.channels)?;
        writeln!(f, "slots_per_frame: {}", self.slots_per_frame)?;
        writeln!(f, "p_eb: {}", self.p_eb)?;
        write!(f, "p_sr: {{")?;
        for (idx, (channel, p)) in self.p_sr.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{channel}:{p}")?;
        }
        writeln!(f, "}}")?;
        writeln!(f, "t_scan: {:?}", self.t_scan)?;
        writeln!(f, "t_switch: {:?}", self.t_switch)?;
        writeln!(f, "t_eb: {:?}", self.t_eb)?;
        write!(f, "}}")
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_p_sr(channels: &[u8], p: f64) -> BTreeMap<u8, f64> {
        channels.iter().map(|&ch| (ch, p)).collect()
    }

    fn valid_params() -> ScheduleParams {
        let channels = default_hopping_sequence(4).unwrap().to_vec();
        let p_sr = uniform_p_sr(&channels, 0.9);
        ScheduleParams::new(
            channels,
            101,
            0.9375,
            p_sr,
            Duration::from_millis(5250),
            Duration::ZERO,
            Duration::from_micros(4256),
        )
        .unwrap()
    }

    #[test]
    fn accessors_return_constructed_values() {
        let params = valid_params();
        assert_eq!(params.channels(), &[11, 13, 14, 12]);
        assert_eq!(params.slots_per_frame(), 101);
        assert_eq!(params.p_eb(), 0.9375);
        assert_eq!(params.t_scan(), Duration::from_millis(5250));
        assert_eq!(params.frame_duration(), Duration::from_millis(1010));
    }

    #[test]
    fn mean_p_sr_averages_all_channels() {
        let channels = vec![11, 13, 14, 12];
        let p_sr: BTreeMap<u8, f64> =
            [(11, 0.1), (12, 1.0), (13, 0.9), (14, 0.5)].into_iter().collect();
        let params = ScheduleParams::new(
            channels,
            101,
            1.0,
            p_sr,
            Duration::from_millis(100),
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap();
        approx::assert_abs_diff_eq!(params.mean_p_sr(), 0.625, epsilon = 1e-12);
    }

    #[test]
    fn channel_out_of_range_is_rejected() {
        let channels = vec![10, 12];
        let p_sr = uniform_p_sr(&channels, 1.0);
        let err = ScheduleParams::new(
            channels,
            5,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_channel_is_rejected() {
        let channels = vec![11, 12, 11];
        let p_sr = uniform_p_sr(&channels, 1.0);
        assert!(ScheduleParams::new(
            channels,
            5,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .is_err());
    }

    #[test]
    fn zero_slots_is_rejected() {
        let channels = vec![11];
        let p_sr = uniform_p_sr(&channels, 1.0);
        assert!(ScheduleParams::new(
            channels,
            0,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .is_err());
    }

    #[test]
    fn non_coprime_counts_are_rejected() {
        let channels = vec![11, 12];
        let p_sr = uniform_p_sr(&channels, 1.0);
        let err = ScheduleParams::new(
            channels,
            4,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn p_eb_outside_unit_interval_is_rejected() {
        let channels = vec![11];
        let p_sr = uniform_p_sr(&channels, 1.0);
        for p_eb in [-0.1, 1.1, f64::NAN] {
            assert!(ScheduleParams::new(
                channels.clone(),
                5,
                p_eb,
                p_sr.clone(),
                Duration::from_millis(10),
                Duration::ZERO,
                Duration::ZERO,
            )
            .is_err());
        }
    }

    #[test]
    fn missing_p_sr_entry_is_rejected() {
        let channels = vec![11, 13, 12];
        let p_sr = uniform_p_sr(&[11, 13], 1.0);
        let err = ScheduleParams::new(
            channels,
            5,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn extra_p_sr_entry_is_rejected() {
        let channels = vec![11, 12];
        let p_sr = uniform_p_sr(&[11, 12, 13], 1.0);
        assert!(ScheduleParams::new(
            channels,
            5,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .is_err());
    }

    #[test]
    fn invalid_p_sr_probability_is_rejected() {
        let channels = vec![11, 12];
        let mut p_sr = uniform_p_sr(&channels, 1.0);
        p_sr.insert(12, 1.5);
        assert!(ScheduleParams::new(
            channels,
            5,
            1.0,
            p_sr,
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::ZERO,
        )
        .is_err());
    }

    #[test]
    fn zero_scan_duration_is_rejected() {
        let channels = vec![11];
        let p_sr = uniform_p_sr(&channels, 1.0);
        assert!(ScheduleParams::new(
            channels,
            5,
            1.0,
            p_sr,
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
        )
        .is_err());
    }

    #[test]
    fn default_sequences_cover_one_to_sixteen_channels() {
        for count in 1..=16 {
            let seq = default_hopping_sequence(count).unwrap();
            assert_eq!(seq.len(), count);
            for &ch in seq {
                assert!((MIN_CHANNEL..=MAX_CHANNEL).contains(&ch));
            }
        }
        assert!(default_hopping_sequence(0).is_none());
        assert!(default_hopping_sequence(17).is_none());
    }

    #[test]
    fn display_lists_all_fields() {
        let rendered = valid_params().to_string();
        assert!(rendered.contains("slots_per_frame: 101"));
        assert!(rendered.contains("p_eb: 0.9375"));
        assert!(rendered.contains("11:0.9"));
    }
}
