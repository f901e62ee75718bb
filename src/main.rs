use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_json::json;

use polysignal::config::Config;
use polysignal::data::{load_csv, validate_schema};
use polysignal::detect::detect;
use polysignal::logging::{self, log, log_config, obj, params_hash, v_num, v_str, Domain, Level};
use polysignal::mock;
use polysignal::observation::PriceObservation;
use polysignal::report::Report;

fn load(cfg: &Config, path: Option<&Path>) -> Result<(Vec<PriceObservation>, String)> {
    let Some(path) = path else {
        let mock_cfg = cfg.mock();
        let source = format!("mock seed={} points={}", mock_cfg.seed, mock_cfg.points);
        return Ok((mock::generate(&mock_cfg), source));
    };

    let schema = validate_schema(path)?;
    if !schema.ok {
        bail!("{}: {}", path.display(), schema.message);
    }
    let (rows, quality) = load_csv(path)?;
    if !quality.warnings.is_empty() {
        log(
            Level::Warn,
            Domain::Data,
            "data_quality",
            obj(&[
                ("rows", json!(quality.rows)),
                ("bad_rows", json!(quality.bad_rows)),
                ("warnings", json!(quality.warnings)),
            ]),
        );
    }
    Ok((rows, path.display().to_string()))
}

fn run() -> Result<()> {
    let cfg = Config::from_env();
    cfg.validate()?;
    log_config(
        &params_hash(&cfg.fingerprint()),
        obj(&[
            ("market", v_str(&cfg.market_name)),
            ("spike_threshold", v_num(cfg.spike_threshold)),
            ("parity_tolerance", v_num(cfg.parity_tolerance)),
            ("sensitivity", v_num(cfg.sensitivity)),
        ]),
    );

    let path = std::env::args().nth(1).map(PathBuf::from);
    let (observations, source) = load(&cfg, path.as_deref())?;

    let detection = detect(&observations, &cfg.detect());
    let report = Report::build(&cfg, &observations, &detection, &source);
    print!("{}", report.render_text());

    let written = report.write_to(Path::new(&cfg.out_dir))?;
    log(
        Level::Info,
        Domain::System,
        "done",
        obj(&[
            ("run_id", v_str(&logging::run_id())),
            ("outputs", json!(written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>())),
            ("total_anomalies", json!(detection.total())),
        ]),
    );
    Ok(())
}

fn main() -> Result<()> {
    let result = run();
    if let Err(err) = &result {
        log(
            Level::Error,
            Domain::System,
            "failed",
            obj(&[("error", v_str(&format!("{:#}", err)))]),
        );
    }
    logging::flush();
    result
}
