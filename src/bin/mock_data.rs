use polysignal::config::Config;
use polysignal::data::{analyze, default_manifest_path, load_csv, write_csv};
use polysignal::logging;
use polysignal::mock;
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    let path = PathBuf::from(
        env::args()
            .nth(1)
            .unwrap_or_else(|| "data/mock.csv".to_string()),
    );
    let cfg = Config::from_env();
    if let Err(err) = cfg.validate() {
        eprintln!("invalid config: {}", err);
        std::process::exit(1);
    }

    let series = mock::generate(&cfg.mock());
    if let Err(err) = write_csv(&path, &series) {
        eprintln!("failed to write {}: {:#}", path.display(), err);
        std::process::exit(2);
    }

    let now_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let manifest = match load_csv(&path)
        .and_then(|(rows, quality)| analyze(&path, &rows, &quality, cfg.interval_secs, now_ts))
    {
        Ok(m) => m,
        Err(err) => {
            eprintln!("analysis failed: {:#}", err);
            std::process::exit(3);
        }
    };

    let out_path = default_manifest_path(&path);
    let payload = json!({
        "manifest": manifest,
        "mock": {
            "seed": cfg.mock_seed,
            "points": cfg.mock_points,
            "interval_secs": cfg.interval_secs,
            "start_ts": cfg.start_ts,
        }
    });
    let body = serde_json::to_string_pretty(&payload).unwrap_or_default();
    if let Err(err) = fs::write(&out_path, body) {
        eprintln!("failed to write {}: {}", out_path.display(), err);
        std::process::exit(4);
    }
    logging::flush();
    println!("wrote {} ({} rows) and {}", path.display(), series.len(), out_path.display());
}
