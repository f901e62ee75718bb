use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped quote for a binary YES/NO contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Epoch seconds (UTC)
    pub ts: u64,
    pub price_yes: f64,
    pub price_no: f64,
    pub volume: u64,
}

impl PriceObservation {
    pub fn new(ts: u64, price_yes: f64, price_no: f64, volume: u64) -> Self {
        Self {
            ts,
            price_yes,
            price_no,
            volume,
        }
    }

    /// YES + NO. Complementary legs should sum to 1.
    pub fn parity_sum(&self) -> f64 {
        self.price_yes + self.price_no
    }

    pub fn parity_deviation(&self) -> f64 {
        (self.parity_sum() - 1.0).abs()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, p) in [("price_yes", self.price_yes), ("price_no", self.price_no)] {
            if !p.is_finite() {
                return Err(anyhow!("{} is not finite at ts={}", name, self.ts));
            }
            if !(0.0..=1.0).contains(&p) {
                return Err(anyhow!("{}={} outside [0,1] at ts={}", name, p, self.ts));
            }
        }
        Ok(())
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.ts as i64, 0)
    }

    /// `YYYY-MM-DD HH:MM`, falling back to the raw epoch.
    pub fn ts_label(&self) -> String {
        self.datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| self.ts.to_string())
    }

    pub fn to_csv_line(&self) -> String {
        // `{}` on f64 is the shortest text that parses back to the same value
        format!(
            "{},{},{},{}",
            self.ts, self.price_yes, self.price_no, self.volume
        )
    }
}

/// Parse `ts,price_yes,price_no,volume`.
pub fn parse_csv_line(line: &str) -> Result<PriceObservation> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != 4 {
        return Err(anyhow!("expected 4 columns, got {}", parts.len()));
    }
    let obs = PriceObservation {
        ts: parts[0].trim().parse()?,
        price_yes: parts[1].trim().parse()?,
        price_no: parts[2].trim().parse()?,
        volume: parts[3].trim().parse()?,
    };
    obs.validate()?;
    Ok(obs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_sum_is_derived() {
        let o = PriceObservation::new(0, 0.6, 0.25, 1000);
        assert!((o.parity_sum() - 0.85).abs() < 1e-12);
        assert!((o.parity_deviation() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(PriceObservation::new(0, 1.2, 0.1, 1).validate().is_err());
        assert!(PriceObservation::new(0, 0.5, -0.1, 1).validate().is_err());
        assert!(PriceObservation::new(0, f64::NAN, 0.5, 1).validate().is_err());
        assert!(PriceObservation::new(0, 1.0, 0.0, 1).validate().is_ok());
    }

    #[test]
    fn parse_line() {
        let o = parse_csv_line("1717200000, 0.52,0.48,1200").unwrap();
        assert_eq!(o.ts, 1_717_200_000);
        assert_eq!(o.volume, 1200);
        assert!(parse_csv_line("1,2,3").is_err());
        assert!(parse_csv_line("1,0.5,0.5,-4").is_err());
        assert!(parse_csv_line("1,1.5,0.5,4").is_err());
        assert!(parse_csv_line("1,0.5,0.5,10,garbage,more").is_err());
        assert!(parse_csv_line("1,0.5,0.5,10,").is_err());
    }

    #[test]
    fn csv_line_keeps_full_precision() {
        let o = PriceObservation::new(1_717_200_000, 0.8000004, 0.1999996, 1000);
        let back = parse_csv_line(&o.to_csv_line()).unwrap();
        assert_eq!(back, o);
        assert!(back.price_yes > 0.8);
    }

    #[test]
    fn ts_label_formats_utc() {
        let o = PriceObservation::new(1_717_200_000, 0.5, 0.5, 0);
        assert_eq!(o.ts_label(), "2024-06-01 00:00");
    }
}
