//! Seeded mock series with injected Type A and Type B anomalies.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::ops::Range;

use crate::logging::{log, obj, v_num, Domain, Level};
use crate::observation::PriceObservation;
use serde_json::json;

/// 2024-06-01T00:00:00Z
pub const DEFAULT_START_TS: u64 = 1_717_200_000;

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub seed: u64,
    pub points: usize,
    pub start_ts: u64,
    pub interval_secs: u64,
    /// Baseline YES price band
    pub yes_low: f64,
    pub yes_high: f64,
    /// Added to YES over `spike_range`; NO follows as `1 - yes`
    pub spike_range: Range<usize>,
    pub spike_bump: f64,
    /// Subtracted from NO over `parity_range` after it is derived
    pub parity_range: Range<usize>,
    pub parity_drop: f64,
    pub volume_low: u64,
    pub volume_high: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            points: 200,
            start_ts: DEFAULT_START_TS,
            interval_secs: 12 * 3600,
            yes_low: 0.45,
            yes_high: 0.55,
            spike_range: 150..155,
            spike_bump: 0.35,
            parity_range: 50..55,
            parity_drop: 0.15,
            volume_low: 1_000,
            volume_high: 50_000,
        }
    }
}

fn clip(range: &Range<usize>, len: usize) -> Range<usize> {
    range.start.min(len)..range.end.min(len)
}

pub fn generate(cfg: &MockConfig) -> Vec<PriceObservation> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let n = cfg.points;

    let mut yes: Vec<f64> = (0..n)
        .map(|_| rng.gen_range(cfg.yes_low..cfg.yes_high))
        .collect();
    for i in clip(&cfg.spike_range, n) {
        yes[i] = (yes[i] + cfg.spike_bump).clamp(0.0, 1.0);
    }

    let mut no: Vec<f64> = yes.iter().map(|y| 1.0 - y).collect();
    for i in clip(&cfg.parity_range, n) {
        no[i] = (no[i] - cfg.parity_drop).clamp(0.0, 1.0);
    }

    let series: Vec<PriceObservation> = (0..n)
        .map(|i| PriceObservation {
            ts: cfg.start_ts.saturating_add((i as u64).saturating_mul(cfg.interval_secs)),
            price_yes: yes[i],
            price_no: no[i],
            volume: rng.gen_range(cfg.volume_low..cfg.volume_high),
        })
        .collect();

    log(
        Level::Info,
        Domain::Data,
        "mock_generated",
        obj(&[
            ("seed", json!(cfg.seed)),
            ("points", json!(n)),
            ("interval_secs", json!(cfg.interval_secs)),
            ("spike_bump", v_num(cfg.spike_bump)),
            ("parity_drop", v_num(cfg.parity_drop)),
        ]),
    );
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_series() {
        let cfg = MockConfig::default();
        assert_eq!(generate(&cfg), generate(&cfg));
        let other = MockConfig {
            seed: 7,
            ..MockConfig::default()
        };
        assert_ne!(generate(&cfg), generate(&other));
    }

    #[test]
    fn shape_and_spacing() {
        let series = generate(&MockConfig::default());
        assert_eq!(series.len(), 200);
        assert_eq!(series[0].ts, DEFAULT_START_TS);
        assert_eq!(series[1].ts - series[0].ts, 43_200);
        for o in &series {
            assert!(o.validate().is_ok());
            assert!((1_000..50_000).contains(&o.volume));
        }
    }

    #[test]
    fn injection_windows_are_clipped() {
        let cfg = MockConfig {
            points: 52,
            ..MockConfig::default()
        };
        let series = generate(&cfg);
        assert_eq!(series.len(), 52);
        assert!(series[51].parity_sum() < 0.9);
    }

    #[test]
    fn timestamps_saturate_near_max() {
        let cfg = MockConfig {
            points: 5,
            start_ts: u64::MAX - 1,
            interval_secs: 3600,
            ..MockConfig::default()
        };
        let series = generate(&cfg);
        assert_eq!(series[0].ts, u64::MAX - 1);
        assert_eq!(series[4].ts, u64::MAX);
    }
}
