use polysignal::data::{analyze, load_csv, validate_schema, write_csv, EXPECTED_COLUMNS};
use polysignal::detect::flag_price_spikes;
use polysignal::mock::{self, MockConfig};
use polysignal::observation::PriceObservation;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_raw(path: &Path, header: &[&str], rows: &[&str]) {
    let mut out = String::new();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    fs::write(path, out).unwrap();
}

#[test]
fn schema_accepts_good_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("good.csv");
    write_raw(&path, &EXPECTED_COLUMNS, &["1000,0.5,0.5,10"]);
    assert!(validate_schema(&path).unwrap().ok);
}

#[test]
fn schema_rejects_bad_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.csv");
    write_raw(&path, &["ts", "open", "close"], &["1000,1,2"]);
    assert!(!validate_schema(&path).unwrap().ok);
}

#[test]
fn bad_rows_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.csv");
    write_raw(
        &path,
        &EXPECTED_COLUMNS,
        &[
            "# comment",
            "1000,0.5,0.5,10",
            "1060,not-a-number,0.5,10",
            "1120,1.4,0.5,10",
            "",
            "1180,0.4,0.6,10",
            "1240,0.5,0.5,10,extra",
        ],
    );
    let (rows, report) = load_csv(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(report.rows, 2);
    assert_eq!(report.bad_rows, 3);
    assert_eq!(report.warnings.len(), 3);
    assert!(report.warnings[2].contains("expected 4 columns, got 5"));
}

#[test]
fn invalid_utf8_row_is_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bytes.csv");
    let mut bytes = b"ts,price_yes,price_no,volume\n1000,0.5,0.5,10\n".to_vec();
    bytes.extend_from_slice(b"1060,0.5\xff,0.5,10\n");
    bytes.extend_from_slice(b"1120,0.4,0.6,10\r\n");
    fs::write(&path, bytes).unwrap();

    let (rows, report) = load_csv(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].ts, 1120);
    assert_eq!(report.bad_rows, 1);
    assert!(report.warnings[0].starts_with("bad_row line 3: invalid utf-8"));
}

#[test]
fn written_mock_reloads_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/mock.csv");
    let series = mock::generate(&MockConfig::default());
    write_csv(&path, &series).unwrap();

    let (rows, report) = load_csv(&path).unwrap();
    assert_eq!(report.bad_rows, 0);
    assert_eq!(rows, series);
}

#[test]
fn reload_keeps_prices_just_above_threshold() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edge.csv");
    let series = vec![
        PriceObservation::new(1000, 0.8000004, 0.1999996, 1000),
        PriceObservation::new(1060, 0.8, 0.2, 1000),
    ];
    write_csv(&path, &series).unwrap();

    let (rows, _) = load_csv(&path).unwrap();
    assert_eq!(flag_price_spikes(&series, 0.8), flag_price_spikes(&rows, 0.8));
    assert_eq!(flag_price_spikes(&rows, 0.8).len(), 1);
}

#[test]
fn manifest_reports_gaps_and_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gaps.csv");
    write_raw(
        &path,
        &EXPECTED_COLUMNS,
        &["1000,0.5,0.5,1", "1060,0.5,0.5,1", "1240,0.5,0.5,1", "1200,0.5,0.5,1"],
    );
    let (rows, quality) = load_csv(&path).unwrap();
    let manifest = analyze(&path, &rows, &quality, 60, 2000).unwrap();
    assert_eq!(manifest.row_count, 4);
    assert_eq!(manifest.gaps.len(), 1);
    assert_eq!(manifest.gaps[0].missing_points, 2);
    assert_eq!(manifest.ts_min, Some(1000));
    assert_eq!(manifest.ts_max, Some(1240));
    assert!(manifest.warnings.iter().any(|w| w.starts_with("non_monotonic_ts")));
    assert_eq!(manifest.hash_sha256.len(), 64);
}
