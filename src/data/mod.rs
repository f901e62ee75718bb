use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::logging::{log_bad_row, log_dataset};
use crate::observation::{parse_csv_line, PriceObservation};

pub const EXPECTED_COLUMNS: [&str; 4] = ["ts", "price_yes", "price_no", "volume"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub start_ts: u64,
    pub end_ts: u64,
    pub missing_points: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub bad_rows: u64,
    pub ts_min: Option<u64>,
    pub ts_max: Option<u64>,
    pub interval_secs: u64,
    pub columns: Vec<String>,
    pub gaps: Vec<Gap>,
    pub warnings: Vec<String>,
    pub generated_at_epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub columns: Vec<String>,
    pub expected: Vec<String>,
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub rows: u64,
    pub bad_rows: u64,
    pub warnings: Vec<String>,
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

fn is_header(line: &str) -> bool {
    line.to_lowercase().starts_with("ts,")
}

/// Load observations from CSV. Bad rows are counted and skipped.
pub fn load_csv(path: &Path) -> Result<(Vec<PriceObservation>, DataQualityReport)> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    let mut report = DataQualityReport::default();

    for (idx, raw) in BufReader::new(file).split(b'\n').enumerate() {
        let raw = raw.with_context(|| format!("read {}", path.display()))?;
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(err) => {
                report.bad_rows += 1;
                let reason = format!("invalid utf-8: {}", err.utf8_error());
                log_bad_row(idx + 1, &reason);
                report.warnings.push(format!("bad_row line {}: {}", idx + 1, reason));
                continue;
            }
        };
        let trimmed = line.trim();
        if is_skippable(trimmed) || is_header(trimmed) {
            continue;
        }
        match parse_csv_line(trimmed) {
            Ok(obs) => {
                report.rows += 1;
                rows.push(obs);
            }
            Err(err) => {
                report.bad_rows += 1;
                log_bad_row(idx + 1, &err.to_string());
                report.warnings.push(format!("bad_row line {}: {}", idx + 1, err));
            }
        }
    }

    log_dataset(&path.display().to_string(), rows.len(), report.bad_rows);
    Ok((rows, report))
}

pub fn write_csv(path: &Path, observations: &[PriceObservation]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "{}", EXPECTED_COLUMNS.join(","))?;
    for obs in observations {
        writeln!(w, "{}", obs.to_csv_line())?;
    }
    w.flush()?;
    Ok(())
}

pub fn validate_schema(path: &Path) -> Result<SchemaReport> {
    let header = read_header(path)?;
    let expected = EXPECTED_COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let ok = header == expected;
    let message = if ok {
        "schema ok".to_string()
    } else {
        format!("schema mismatch: got {:?} expected {:?}", header, expected)
    };
    Ok(SchemaReport {
        columns: header,
        expected,
        ok,
        message,
    })
}

pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    for raw in BufReader::new(file).split(b'\n') {
        let raw = raw?;
        let line = String::from_utf8_lossy(&raw);
        let trimmed = line.trim();
        if is_skippable(trimmed) {
            continue;
        }
        if is_header(trimmed) {
            return Ok(trimmed.split(',').map(|s| s.trim().to_string()).collect());
        }
        break;
    }
    Ok(Vec::new())
}

/// Build a manifest for an already-loaded dataset.
pub fn analyze(
    path: &Path,
    observations: &[PriceObservation],
    quality: &DataQualityReport,
    interval_secs: u64,
    now_ts: u64,
) -> Result<DatasetManifest> {
    let mut warnings = quality.warnings.clone();
    let mut gaps = Vec::new();
    let mut ts_min: Option<u64> = None;
    let mut ts_max: Option<u64> = None;

    for (i, obs) in observations.iter().enumerate() {
        ts_min = Some(ts_min.map_or(obs.ts, |v| v.min(obs.ts)));
        ts_max = Some(ts_max.map_or(obs.ts, |v| v.max(obs.ts)));
        if i == 0 {
            continue;
        }
        let prev = observations[i - 1].ts;
        if obs.ts <= prev {
            warnings.push(format!("non_monotonic_ts: prev={} current={}", prev, obs.ts));
        } else if interval_secs > 0 && obs.ts - prev > interval_secs {
            gaps.push(Gap {
                start_ts: prev,
                end_ts: obs.ts,
                missing_points: (obs.ts - prev) / interval_secs - 1,
            });
        }
    }

    let columns = read_header(path)?;
    if columns.is_empty() {
        warnings.push("missing_header".to_string());
    }

    Ok(DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: file_sha256(path)?,
        row_count: quality.rows,
        bad_rows: quality.bad_rows,
        ts_min,
        ts_max,
        interval_secs,
        columns,
        gaps,
        warnings,
        generated_at_epoch: now_ts,
    })
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_manifest_path(dataset_path: &Path) -> PathBuf {
    let mut p = dataset_path.to_path_buf();
    let fname = dataset_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset.csv");
    p.set_file_name(format!("{}.manifest.json", fname));
    p
}
