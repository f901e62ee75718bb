//! Anomaly flagging over an ordered series of observations.
//!
//! Two rule filters drive the report:
//! - Type A (front-running): `price_yes > threshold`
//! - Type B (parity break):  `|price_yes + price_no - 1| > tolerance`
//!
//! Both are order-preserving subsequence filters and never fail. The z-score
//! filter is a separate sensitivity view and does not feed into either rule.

use serde::{Deserialize, Serialize};

use crate::logging::{log_detection, log_filter, ProfileScope};
use crate::observation::PriceObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    FrontRunning,
    ParityBreak,
    ZScoreSpike,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::FrontRunning => "front_running",
            AnomalyKind::ParityBreak => "parity_break",
            AnomalyKind::ZScoreSpike => "zscore_spike",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnomalyKind::FrontRunning => "Type A: Front-running",
            AnomalyKind::ParityBreak => "Type B: Parity Breakage",
            AnomalyKind::ZScoreSpike => "Sensitivity: Z-Score",
        }
    }

    pub fn rule(&self) -> &'static str {
        match self {
            AnomalyKind::FrontRunning => "Price(Yes) > Spike Threshold",
            AnomalyKind::ParityBreak => "|Price(Yes) + Price(No) - 1| > Tolerance",
            AnomalyKind::ZScoreSpike => "z(Price(Yes)) >= Sensitivity",
        }
    }
}

/// A flagged observation together with the value that tripped the rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub observation: PriceObservation,
    pub parity_sum: f64,
    /// `price_yes` for Type A, parity deviation for Type B, z-score otherwise
    pub score: f64,
}

impl Anomaly {
    fn new(kind: AnomalyKind, observation: PriceObservation, score: f64) -> Self {
        Self {
            kind,
            observation,
            parity_sum: observation.parity_sum(),
            score,
        }
    }
}

/// Observations whose YES price is strictly above `threshold`.
pub fn flag_price_spikes(observations: &[PriceObservation], threshold: f64) -> Vec<PriceObservation> {
    let flagged: Vec<PriceObservation> = observations
        .iter()
        .filter(|o| o.price_yes > threshold)
        .copied()
        .collect();
    log_filter(AnomalyKind::FrontRunning.as_str(), threshold, observations.len(), flagged.len());
    flagged
}

/// Observations whose parity sum deviates from 1 by strictly more than `tolerance`.
pub fn flag_parity_breaks(observations: &[PriceObservation], tolerance: f64) -> Vec<PriceObservation> {
    let flagged: Vec<PriceObservation> = observations
        .iter()
        .filter(|o| o.parity_deviation() > tolerance)
        .copied()
        .collect();
    log_filter(AnomalyKind::ParityBreak.as_str(), tolerance, observations.len(), flagged.len());
    flagged
}

/// Observations whose YES price z-score (population statistics over the whole
/// series) is at least `z_threshold`. Flat or single-point series flag nothing.
pub fn flag_zscore_spikes(observations: &[PriceObservation], z_threshold: f64) -> Vec<(PriceObservation, f64)> {
    if observations.len() < 2 {
        return Vec::new();
    }
    let prices: Vec<f64> = observations.iter().map(|o| o.price_yes).collect();
    let (mean, std) = mean_std(&prices);
    if std <= 1e-12 {
        return Vec::new();
    }
    let flagged: Vec<(PriceObservation, f64)> = observations
        .iter()
        .map(|o| (*o, (o.price_yes - mean) / std))
        .filter(|(_, z)| *z >= z_threshold)
        .collect();
    log_filter(AnomalyKind::ZScoreSpike.as_str(), z_threshold, observations.len(), flagged.len());
    flagged
}

fn mean_std(vals: &[f64]) -> (f64, f64) {
    if vals.is_empty() {
        return (0.0, 0.0);
    }
    let n = vals.len() as f64;
    let mean = vals.iter().sum::<f64>() / n;
    let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectConfig {
    pub spike_threshold: f64,
    pub parity_tolerance: f64,
    pub sensitivity: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            spike_threshold: 0.8,
            parity_tolerance: 0.1,
            sensitivity: 3.0,
        }
    }
}

/// Results of all filters over one series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection {
    pub spikes: Vec<Anomaly>,
    pub parity_breaks: Vec<Anomaly>,
    pub zscore_spikes: Vec<Anomaly>,
}

impl Detection {
    /// Type A plus Type B. The sensitivity view is not counted.
    pub fn total(&self) -> usize {
        self.spikes.len() + self.parity_breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

pub fn detect(observations: &[PriceObservation], cfg: &DetectConfig) -> Detection {
    let _scope = ProfileScope::new("detect");

    let spikes = flag_price_spikes(observations, cfg.spike_threshold)
        .into_iter()
        .map(|o| Anomaly::new(AnomalyKind::FrontRunning, o, o.price_yes))
        .collect::<Vec<_>>();
    let parity_breaks = flag_parity_breaks(observations, cfg.parity_tolerance)
        .into_iter()
        .map(|o| Anomaly::new(AnomalyKind::ParityBreak, o, o.parity_deviation()))
        .collect::<Vec<_>>();
    let zscore_spikes = flag_zscore_spikes(observations, cfg.sensitivity)
        .into_iter()
        .map(|(o, z)| Anomaly::new(AnomalyKind::ZScoreSpike, o, z))
        .collect::<Vec<_>>();

    log_detection(spikes.len(), parity_breaks.len(), zscore_spikes.len());

    Detection {
        spikes,
        parity_breaks,
        zscore_spikes,
    }
}
