use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::DetectConfig;
use crate::mock::{MockConfig, DEFAULT_START_TS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub market_name: String,
    pub market_status: String,
    pub spike_threshold: f64,
    pub parity_tolerance: f64,
    /// Z-score cutoff for the sensitivity view, in [1, 5]
    pub sensitivity: f64,
    pub mock_seed: u64,
    pub mock_points: usize,
    pub interval_secs: u64,
    pub start_ts: u64,
    pub out_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market_name: "US Election 2024".to_string(),
            market_status: "Active".to_string(),
            spike_threshold: 0.8,
            parity_tolerance: 0.1,
            sensitivity: 3.0,
            mock_seed: 42,
            mock_points: 200,
            interval_secs: 12 * 3600,
            start_ts: DEFAULT_START_TS,
            out_dir: "out/report".to_string(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            market_name: std::env::var("MARKET_NAME").unwrap_or(d.market_name),
            market_status: std::env::var("MARKET_STATUS").unwrap_or(d.market_status),
            spike_threshold: env_or("SPIKE_THRESHOLD", d.spike_threshold),
            parity_tolerance: env_or("PARITY_TOLERANCE", d.parity_tolerance),
            sensitivity: env_or("SENSITIVITY", d.sensitivity),
            mock_seed: env_or("MOCK_SEED", d.mock_seed),
            mock_points: env_or("MOCK_POINTS", d.mock_points),
            interval_secs: env_or("INTERVAL_SECS", d.interval_secs),
            start_ts: env_or("START_TS", d.start_ts),
            out_dir: std::env::var("OUT_DIR").unwrap_or(d.out_dir),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.spike_threshold) {
            return Err(anyhow!("spike_threshold {} outside [0,1]", self.spike_threshold));
        }
        if self.parity_tolerance.is_nan() || self.parity_tolerance < 0.0 {
            return Err(anyhow!("parity_tolerance {} must be >= 0", self.parity_tolerance));
        }
        if !(1.0..=5.0).contains(&self.sensitivity) {
            return Err(anyhow!("sensitivity {} outside [1,5]", self.sensitivity));
        }
        if self.mock_points == 0 {
            return Err(anyhow!("mock_points must be > 0"));
        }
        if self.interval_secs == 0 {
            return Err(anyhow!("interval_secs must be > 0"));
        }
        (self.mock_points as u64 - 1)
            .checked_mul(self.interval_secs)
            .and_then(|span| self.start_ts.checked_add(span))
            .ok_or_else(|| {
                anyhow!(
                    "start_ts {} + {} points at {}s overflows the timestamp range",
                    self.start_ts,
                    self.mock_points,
                    self.interval_secs
                )
            })?;
        Ok(())
    }

    pub fn detect(&self) -> DetectConfig {
        DetectConfig {
            spike_threshold: self.spike_threshold,
            parity_tolerance: self.parity_tolerance,
            sensitivity: self.sensitivity,
        }
    }

    pub fn mock(&self) -> MockConfig {
        MockConfig {
            seed: self.mock_seed,
            points: self.mock_points,
            start_ts: self.start_ts,
            interval_secs: self.interval_secs,
            ..MockConfig::default()
        }
    }

    /// Stable key for the logged config hash.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
