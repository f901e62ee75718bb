//! Structured JSONL logging for report runs.
//!
//! Every record carries a run id, a sequence number, a level and a domain so
//! that a run can be reconstructed from `events.jsonl` alone. Records are
//! mirrored to stderr; stdout is reserved for the rendered report.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    /// `LOG_LEVEL`, defaulting to info when unset or unrecognized.
    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Data,    // Dataset load, mock generation, quality checks
    Detect,  // Anomaly filters
    Report,  // Rendering and output files
    System,  // Startup, config, shutdown
    Profile, // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Data => "data",
            Domain::Detect => "detect",
            Domain::Report => "report",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    /// `list` is a comma-separated set of domain names, or "all".
    pub fn enabled_in(&self, list: &str) -> bool {
        list.split(',')
            .map(str::trim)
            .any(|d| d == "all" || d == self.as_str())
    }

    pub fn is_enabled(&self) -> bool {
        std::env::var("LOG_DOMAINS")
            .map(|list| self.enabled_in(&list))
            .unwrap_or(true)
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn files_enabled() -> bool {
    !matches!(std::env::var("LOG_FILES").as_deref(), Ok("0") | Ok("false"))
}

fn open_log(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        if !files_enabled() {
            return RunContext {
                run_id,
                events: None,
                trace: None,
            };
        }

        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_log(run_dir.join("events.jsonl")),
            trace: open_log(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(Ok(mut w)) = writer.as_ref().map(|m| m.lock()) {
        let _ = writeln!(w, "{}", line);
    }
}

/// Flush buffered log files. Call before process exit.
pub fn flush() {
    if let Some(ctx) = RUN_CONTEXT.get() {
        for writer in [&ctx.events, &ctx.trace].into_iter().flatten() {
            if let Ok(mut w) = writer.lock() {
                let _ = w.flush();
            }
        }
    }
}

pub fn run_id() -> String {
    ensure_run_context().run_id.clone()
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain, event, fields);
}

/// One JSONL record. A `msg` field is lifted out of `data` to the top level.
fn build_record(
    run_id: &str,
    seq: u64,
    level: Level,
    domain: Domain,
    event: &str,
    mut fields: Map<String, Value>,
) -> Value {
    let msg = fields.remove("msg").unwrap_or_else(|| v_str(""));
    json!({
        "ts": ts_now(),
        "run_id": run_id,
        "seq": seq,
        "lvl": level.as_str().to_uppercase(),
        "component": domain.as_str(),
        "event": event,
        "msg": msg,
        "data": Value::Object(fields),
    })
}

fn emit_record(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let line = build_record(&ctx.run_id, next_seq(), level, domain, event, fields).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_config(cfg_hash: &str, mut fields: Map<String, Value>) {
    fields.insert("cfg_hash".to_string(), v_str(cfg_hash));
    log(Level::Info, Domain::System, "config", fields);
}

pub fn log_dataset(source: &str, rows: usize, bad_rows: u64) {
    log(
        Level::Info,
        Domain::Data,
        "dataset_loaded",
        obj(&[
            ("source", v_str(source)),
            ("rows", json!(rows)),
            ("bad_rows", json!(bad_rows)),
        ]),
    );
}

pub fn log_bad_row(line_no: usize, reason: &str) {
    log(
        Level::Warn,
        Domain::Data,
        "bad_row",
        obj(&[("line", json!(line_no)), ("reason", v_str(reason))]),
    );
}

pub fn log_filter(filter: &str, threshold: f64, input: usize, flagged: usize) {
    log(
        Level::Debug,
        Domain::Detect,
        "filter",
        obj(&[
            ("filter", v_str(filter)),
            ("threshold", v_num(threshold)),
            ("input", json!(input)),
            ("flagged", json!(flagged)),
        ]),
    );
}

pub fn log_detection(spikes: usize, parity_breaks: usize, zscore_spikes: usize) {
    let level = if spikes + parity_breaks > 0 {
        Level::Warn
    } else {
        Level::Info
    };
    log(
        level,
        Domain::Detect,
        "detection",
        obj(&[
            ("spikes", json!(spikes)),
            ("parity_breaks", json!(parity_breaks)),
            ("zscore_spikes", json!(zscore_spikes)),
        ]),
    );
}

pub fn log_output(kind: &str, path: &str, bytes: usize) {
    log(
        Level::Info,
        Domain::Report,
        "written",
        obj(&[
            ("kind", v_str(kind)),
            ("path", v_str(path)),
            ("bytes", json!(bytes)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn params_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut h);
    format!("{:x}", h.finish())
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits `elapsed_ms` at trace level when dropped.
pub struct ProfileScope {
    label: &'static str,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        log(
            Level::Trace,
            Domain::Profile,
            "profile",
            obj(&[("label", v_str(self.label)), ("elapsed_ms", v_num(elapsed_ms))]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn level_names_parse_and_filter() {
        assert_eq!(Level::parse("WARN"), Some(Level::Warn));
        assert_eq!(Level::parse(" debug "), Some(Level::Debug));
        assert_eq!(Level::parse("verbose"), None);
        for lvl in [Level::Trace, Level::Info, Level::Fatal] {
            assert_eq!(Level::parse(lvl.as_str()), Some(lvl));
            assert_eq!(serde_json::to_value(lvl).unwrap(), lvl.as_str());
        }
        // a bad-row warning passes the default info cutoff, filter stats do not
        assert!(Level::Warn >= Level::Info);
        assert!(Level::Debug < Level::Info);
    }

    #[test]
    fn domain_list_selects_components() {
        assert!(Domain::Detect.enabled_in("data, detect"));
        assert!(!Domain::Report.enabled_in("data,detect"));
        assert!(Domain::Profile.enabled_in("all"));
        assert!(!Domain::System.enabled_in(""));
        assert_eq!(serde_json::to_value(Domain::Data).unwrap(), Domain::Data.as_str());
    }

    #[test]
    fn record_lifts_msg_and_nests_fields() {
        let mut fields = obj(&[("line", json!(7)), ("reason", v_str("expected 4 columns, got 5"))]);
        fields.insert("msg".to_string(), v_str("skipped"));
        let rec = build_record("r-test", 3, Level::Warn, Domain::Data, "bad_row", fields);
        assert_eq!(rec["run_id"], "r-test");
        assert_eq!(rec["seq"], 3);
        assert_eq!(rec["lvl"], "WARN");
        assert_eq!(rec["component"], "data");
        assert_eq!(rec["event"], "bad_row");
        assert_eq!(rec["msg"], "skipped");
        assert_eq!(rec["data"]["line"], 7);
        assert!(rec["data"].get("msg").is_none());
    }

    #[test]
    fn config_hash_tracks_detection_params() {
        let base = Config::default();
        let looser = Config { spike_threshold: 0.7, ..Config::default() };
        assert_eq!(params_hash(&base.fingerprint()), params_hash(&Config::default().fingerprint()));
        assert_ne!(params_hash(&base.fingerprint()), params_hash(&looser.fingerprint()));
    }
}
