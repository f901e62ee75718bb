//! Report assembly and rendering.
//!
//! A `Report` is a serializable snapshot of one run: summary cards, the price
//! series, and one section per anomaly type. It renders to plain text for the
//! terminal and to a self-contained HTML page with inline SVG charts.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::detect::{Anomaly, AnomalyKind, DetectConfig, Detection};
use crate::logging::log_output;
use crate::observation::PriceObservation;

pub const TITLE: &str = "Polymarket Signal Analysis";
pub const NO_SPIKES_MSG: &str = "No Type A anomalies found with current parameters.";
pub const PARITY_STABLE_MSG: &str = "Market Parity is stable (Sum ≈ 1.0).";
pub const NO_ZSCORE_MSG: &str = "No observations exceed the sensitivity cutoff.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPeriod {
    pub start: String,
    pub end: String,
    pub days: f64,
    pub label: String,
}

impl DataPeriod {
    fn from_series(observations: &[PriceObservation]) -> Option<Self> {
        let first = observations.iter().min_by_key(|o| o.ts)?;
        let last = observations.iter().max_by_key(|o| o.ts)?;
        let days = (last.ts - first.ts) as f64 / 86_400.0;
        Some(Self {
            start: first.ts_label(),
            end: last.ts_label(),
            days,
            label: period_label(days),
        })
    }
}

fn period_label(days: f64) -> String {
    if days >= 60.0 {
        format!("{} Months", (days / 30.4).round() as u64)
    } else if days >= 1.0 {
        format!("{} Days", days.round() as u64)
    } else {
        format!("{} Hours", (days * 24.0).round() as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub market: String,
    pub market_status: String,
    pub total_anomalies: usize,
    pub observations: usize,
    pub period: Option<DataPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub kind: AnomalyKind,
    pub label: String,
    pub rule: String,
    pub threshold: f64,
    pub rows: Vec<Anomaly>,
    pub empty_message: String,
}

impl Section {
    fn new(kind: AnomalyKind, threshold: f64, rows: &[Anomaly], empty_message: &str) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            rule: kind.rule().to_string(),
            threshold,
            rows: rows.to_vec(),
            empty_message: empty_message.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub generated: String,
    pub source: String,
    pub params: DetectConfig,
    pub summary: Summary,
    pub series: Vec<PriceObservation>,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn build(
        cfg: &Config,
        observations: &[PriceObservation],
        detection: &Detection,
        source: &str,
    ) -> Self {
        let params = cfg.detect();
        Self {
            title: TITLE.to_string(),
            generated: chrono::Utc::now().to_rfc3339(),
            source: source.to_string(),
            params,
            summary: Summary {
                market: cfg.market_name.clone(),
                market_status: cfg.market_status.clone(),
                total_anomalies: detection.total(),
                observations: observations.len(),
                period: DataPeriod::from_series(observations),
            },
            series: observations.to_vec(),
            sections: vec![
                Section::new(
                    AnomalyKind::FrontRunning,
                    params.spike_threshold,
                    &detection.spikes,
                    NO_SPIKES_MSG,
                ),
                Section::new(
                    AnomalyKind::ParityBreak,
                    params.parity_tolerance,
                    &detection.parity_breaks,
                    PARITY_STABLE_MSG,
                ),
                Section::new(
                    AnomalyKind::ZScoreSpike,
                    params.sensitivity,
                    &detection.zscore_spikes,
                    NO_ZSCORE_MSG,
                ),
            ],
        }
    }

    pub fn section(&self, kind: AnomalyKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;
        let _ = writeln!(out, "=== {} ===", self.title);
        let _ = writeln!(out, "source: {}  generated: {}", self.source, self.generated);
        let _ = writeln!(out);
        let _ = writeln!(out, "  Market Status            {} ({})", s.market, s.market_status);
        let _ = writeln!(out, "  Total Anomalies Detected {}", s.total_anomalies);
        match &s.period {
            Some(p) => {
                let _ = writeln!(out, "  Data Period              {} ({} .. {})", p.label, p.start, p.end);
            }
            None => {
                let _ = writeln!(out, "  Data Period              n/a");
            }
        }
        let _ = writeln!(out, "  Observations             {}", s.observations);

        for section in &self.sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "--- {} [{}] ---", section.label, section.kind.as_str());
            let _ = writeln!(out, "rule: {} (threshold={})", section.rule, section.threshold);
            if section.is_empty() {
                let _ = writeln!(out, "{}", section.empty_message);
                continue;
            }
            match section.kind {
                AnomalyKind::FrontRunning => {
                    let _ = writeln!(out, "{:<18} {:>9} {:>8}", "timestamp", "price_yes", "volume");
                    for a in &section.rows {
                        let o = &a.observation;
                        let _ = writeln!(out, "{:<18} {:>9.4} {:>8}", o.ts_label(), o.price_yes, o.volume);
                    }
                }
                AnomalyKind::ParityBreak => {
                    let _ = writeln!(
                        out,
                        "{:<18} {:>9} {:>9} {:>10}",
                        "timestamp", "price_yes", "price_no", "parity_sum"
                    );
                    for a in &section.rows {
                        let o = &a.observation;
                        let _ = writeln!(
                            out,
                            "{:<18} {:>9.4} {:>9.4} {:>10.4}",
                            o.ts_label(),
                            o.price_yes,
                            o.price_no,
                            a.parity_sum
                        );
                    }
                }
                AnomalyKind::ZScoreSpike => {
                    let _ = writeln!(out, "{:<18} {:>9} {:>7}", "timestamp", "price_yes", "z");
                    for a in &section.rows {
                        let o = &a.observation;
                        let _ = writeln!(out, "{:<18} {:>9.4} {:>7.2}", o.ts_label(), o.price_yes, a.score);
                    }
                }
            }
        }
        out
    }

    pub fn render_html(&self) -> String {
        let s = &self.summary;
        let period = s
            .period
            .as_ref()
            .map(|p| format!("{} <span class=\"muted\">{} .. {}</span>", esc(&p.label), esc(&p.start), esc(&p.end)))
            .unwrap_or_else(|| "n/a".to_string());

        let mut cards = String::new();
        card(&mut cards, "Market Status", &esc(&s.market), &esc(&s.market_status));
        card(&mut cards, "Total Anomalies Detected", &s.total_anomalies.to_string(), "Type A + Type B");
        card(&mut cards, "Data Period", &period, &format!("{} observations", s.observations));

        let price_lines: [Series<'_>; 2] = [
            ("Price_Yes", "var(--accent)", yes_price),
            ("Price_No", "var(--yellow)", no_price),
        ];
        let overview = svg_lines(&self.series, &price_lines, Some((0.0, 1.0)));

        let mut sections = String::new();
        for section in &self.sections {
            sections.push_str(&self.render_section_html(section));
        }

        let blob = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        let (title, source, generated) = (esc(&self.title), esc(&self.source), esc(&self.generated));
        let data = blob.replace("</", "<\\/");
        let values: [(&str, &str); 7] = [
            ("__TITLE__", title.as_str()),
            ("__SOURCE__", source.as_str()),
            ("__GENERATED__", generated.as_str()),
            ("__CARDS__", cards.as_str()),
            ("__OVERVIEW__", overview.as_str()),
            ("__SECTIONS__", sections.as_str()),
            ("__REPORT_DATA__", data.as_str()),
        ];
        fill_template(TEMPLATE, &values)
    }

    /// Write `report.html` and `report.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let html = self.render_html();
        let json = serde_json::to_string_pretty(self)?;
        let mut written = Vec::new();
        for (kind, name, body) in [("html", "report.html", html), ("json", "report.json", json)] {
            let path = dir.join(name);
            fs::write(&path, &body).with_context(|| format!("write {}", path.display()))?;
            log_output(kind, &path.display().to_string(), body.len());
            written.push(path);
        }
        Ok(written)
    }

    fn render_section_html(&self, section: &Section) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<section class=\"section\"><h2>{}</h2><div class=\"rule\">Detection Rule: {} (threshold {})</div>",
            esc(&section.label),
            esc(&section.rule),
            section.threshold
        );
        if section.is_empty() {
            let class = if section.kind == AnomalyKind::ParityBreak { "ok" } else { "muted" };
            let _ = write!(out, "<p class=\"{}\">{}</p></section>", class, esc(&section.empty_message));
            return out;
        }

        match section.kind {
            AnomalyKind::FrontRunning => {
                out.push_str("<p>Identified Abnormal Movements:</p>");
                table(
                    &mut out,
                    &["Timestamp", "Price_Yes", "Volume"],
                    section.rows.iter().map(|a| {
                        vec![
                            a.observation.ts_label(),
                            format!("{:.4}", a.observation.price_yes),
                            a.observation.volume.to_string(),
                        ]
                    }),
                );
            }
            AnomalyKind::ParityBreak => {
                out.push_str("<p>Arbitrage Opportunities (Inefficiency detected):</p>");
                let parity_line: [Series<'_>; 1] = [("Parity_Sum", "var(--red)", parity_sum)];
                out.push_str(&svg_lines(&self.series, &parity_line, None));
                table(
                    &mut out,
                    &["Timestamp", "Price_Yes", "Price_No", "Parity_Sum"],
                    section.rows.iter().map(|a| {
                        vec![
                            a.observation.ts_label(),
                            format!("{:.4}", a.observation.price_yes),
                            format!("{:.4}", a.observation.price_no),
                            format!("{:.4}", a.parity_sum),
                        ]
                    }),
                );
            }
            AnomalyKind::ZScoreSpike => {
                table(
                    &mut out,
                    &["Timestamp", "Price_Yes", "Z"],
                    section.rows.iter().map(|a| {
                        vec![
                            a.observation.ts_label(),
                            format!("{:.4}", a.observation.price_yes),
                            format!("{:.2}", a.score),
                        ]
                    }),
                );
            }
        }
        out.push_str("</section>");
        out
    }
}

/// Substitute placeholders in one left-to-right pass. Inserted values are
/// never rescanned, so user text that looks like a placeholder stays literal.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find("__") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('_');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn card(out: &mut String, label: &str, value: &str, detail: &str) {
    let _ = write!(
        out,
        "<div class=\"card\"><div class=\"card-label\">{}</div><div class=\"card-val\">{}</div><div class=\"card-detail\">{}</div></div>",
        label, value, detail
    );
}

fn table<I>(out: &mut String, headers: &[&str], rows: I)
where
    I: Iterator<Item = Vec<String>>,
{
    out.push_str("<div class=\"table-wrap\"><table><thead><tr>");
    for h in headers {
        let _ = write!(out, "<th>{}</th>", esc(h));
    }
    out.push_str("</tr></thead><tbody>");
    for row in rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td class=\"mono\">{}</td>", esc(&cell));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table></div>");
}

type Series<'a> = (&'a str, &'a str, fn(&PriceObservation) -> f64);

fn yes_price(o: &PriceObservation) -> f64 {
    o.price_yes
}

fn no_price(o: &PriceObservation) -> f64 {
    o.price_no
}

fn parity_sum(o: &PriceObservation) -> f64 {
    o.parity_sum()
}

const SVG_W: f64 = 960.0;
const SVG_H: f64 = 240.0;
const SVG_PAD: f64 = 28.0;

/// Line chart over the observation index. `y_range` of `None` fits the data.
fn svg_lines(observations: &[PriceObservation], series: &[Series<'_>], y_range: Option<(f64, f64)>) -> String {
    if observations.len() < 2 {
        return "<p class=\"muted\">Not enough data to chart.</p>".to_string();
    }
    let (lo, hi) = y_range.unwrap_or_else(|| {
        let vals = series
            .iter()
            .flat_map(|(_, _, f)| observations.iter().map(f));
        let (mn, mx) = vals.fold((f64::MAX, f64::MIN), |(a, b), v| (a.min(v), b.max(v)));
        let pad = ((mx - mn) * 0.1).max(0.01);
        (mn - pad, mx + pad)
    });
    let span = (hi - lo).max(1e-9);
    let n = (observations.len() - 1) as f64;
    let px = |i: usize| SVG_PAD + i as f64 / n * (SVG_W - 2.0 * SVG_PAD);
    let py = |v: f64| SVG_H - SVG_PAD - (v - lo) / span * (SVG_H - 2.0 * SVG_PAD);

    let mut out = String::new();
    let _ = write!(
        out,
        "<svg class=\"chart\" viewBox=\"0 0 {} {}\" preserveAspectRatio=\"none\">",
        SVG_W, SVG_H
    );
    for tick in [lo, (lo + hi) / 2.0, hi] {
        let _ = write!(
            out,
            "<line x1=\"{p}\" x2=\"{w}\" y1=\"{y:.1}\" y2=\"{y:.1}\" class=\"gridline\"/><text x=\"2\" y=\"{ty:.1}\" class=\"axis\">{t:.2}</text>",
            p = SVG_PAD,
            w = SVG_W - SVG_PAD,
            y = py(tick),
            ty = py(tick) + 4.0,
            t = tick
        );
    }
    for (name, color, f) in series {
        let points: Vec<String> = observations
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{:.1},{:.1}", px(i), py(f(o))))
            .collect();
        let _ = write!(
            out,
            "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"1.5\" points=\"{}\"><title>{}</title></polyline>",
            color,
            points.join(" "),
            esc(name)
        );
    }
    out.push_str("</svg><div class=\"legend\">");
    for (name, color, _) in series {
        let _ = write!(out, "<span style=\"color:{}\">&#9632; {}</span>", color, esc(name));
    }
    out.push_str("</div>");
    out
}

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>__TITLE__</title>
  <style>
    :root {
      --bg: #0d1117; --bg-raised: #161b22;
      --fg: #c9d1d9; --fg-muted: #8b949e; --fg-bright: #f0f6fc;
      --accent: #58a6ff; --green: #3fb950; --red: #f85149; --yellow: #d29922;
      --border: #30363d;
      --mono: 'JetBrains Mono', 'Fira Code', 'SF Mono', monospace;
      --sans: -apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif;
      --radius: 8px;
    }
    *, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
    body { font-family: var(--sans); background: var(--bg); color: var(--fg); line-height: 1.6; }
    main { max-width: 1280px; margin: 0 auto; padding: 1.5rem; }
    h1 { color: var(--fg-bright); font-size: 1.5rem; }
    h2 { color: var(--fg-bright); font-size: 1.05rem; border-bottom: 1px solid var(--border); padding-bottom: 0.4rem; margin-bottom: 0.8rem; }
    .sub { color: var(--fg-muted); font-size: 0.8rem; font-family: var(--mono); margin-bottom: 1.5rem; }
    .grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(240px, 1fr)); gap: 0.65rem; margin-bottom: 2rem; }
    .card { background: var(--bg-raised); border: 1px solid var(--border); border-top: 3px solid var(--accent); border-radius: var(--radius); padding: 0.75rem 0.9rem; }
    .card-label { font-size: 0.72rem; color: var(--fg-muted); text-transform: uppercase; letter-spacing: 0.04em; }
    .card-val { font-size: 1.4rem; font-weight: 700; color: var(--fg-bright); font-family: var(--mono); }
    .card-detail { font-size: 0.7rem; color: var(--fg-muted); }
    .section { margin-bottom: 2.5rem; }
    .rule { background: #2d1f00; color: var(--yellow); border: 1px solid #4d3800; border-radius: 4px; padding: 0.4rem 0.7rem; font-size: 0.8rem; margin-bottom: 0.8rem; }
    .chart { width: 100%; height: 240px; background: var(--bg-raised); border: 1px solid var(--border); border-radius: var(--radius); }
    .chart .gridline { stroke: var(--border); stroke-dasharray: 3 3; }
    .chart .axis { fill: var(--fg-muted); font-size: 10px; font-family: var(--mono); }
    .legend { display: flex; gap: 1rem; font-size: 0.75rem; margin: 0.3rem 0 1rem; }
    .table-wrap { overflow-x: auto; border: 1px solid var(--border); border-radius: var(--radius); }
    table { width: 100%; border-collapse: collapse; font-size: 0.78rem; }
    th { text-align: left; padding: 0.5rem 0.7rem; color: var(--fg-muted); background: var(--bg-raised); border-bottom: 1px solid var(--border); }
    td { padding: 0.4rem 0.7rem; border-bottom: 1px solid rgba(48,54,61,0.5); }
    .mono { font-family: var(--mono); }
    .muted { color: var(--fg-muted); }
    .ok { color: var(--green); }
    footer { color: var(--fg-muted); font-size: 0.72rem; border-top: 1px solid var(--border); padding-top: 0.8rem; }
  </style>
</head>
<body>
<main>
  <h1>__TITLE__</h1>
  <div class="sub">source: __SOURCE__ &middot; generated: __GENERATED__</div>
  <div class="grid">__CARDS__</div>
  <section class="section">
    <h2>Market Price Overview</h2>
    __OVERVIEW__
  </section>
  __SECTIONS__
  <footer>Empirical detection of unusual odds movements.</footer>
</main>
<script type="application/json" id="report-data">__REPORT_DATA__</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect;

    fn flat(n: u64) -> Vec<PriceObservation> {
        (0..n).map(|i| PriceObservation::new(i * 3600, 0.5, 0.5, 100)).collect()
    }

    #[test]
    fn empty_sections_show_messages() {
        let cfg = Config::default();
        let series = flat(10);
        let d = detect(&series, &cfg.detect());
        let r = Report::build(&cfg, &series, &d, "test");
        assert_eq!(r.summary.total_anomalies, 0);
        let text = r.render_text();
        assert!(text.contains(NO_SPIKES_MSG));
        assert!(text.contains(PARITY_STABLE_MSG));
        let html = r.render_html();
        assert!(html.contains("Market Parity is stable"));
        assert!(!html.contains("__SECTIONS__"));
    }

    #[test]
    fn flagged_rows_render() {
        let cfg = Config::default();
        let series = vec![
            PriceObservation::new(1_717_200_000, 0.85, 0.15, 1000),
            PriceObservation::new(1_717_243_200, 0.6, 0.25, 1000),
            PriceObservation::new(1_717_286_400, 0.5, 0.5, 1000),
        ];
        let d = detect(&series, &cfg.detect());
        let r = Report::build(&cfg, &series, &d, "test");
        assert_eq!(r.summary.total_anomalies, 2);
        assert_eq!(r.section(AnomalyKind::FrontRunning).unwrap().rows.len(), 1);
        let text = r.render_text();
        assert!(text.contains("2024-06-01 00:00"));
        assert!(text.contains("0.8500"));
        assert!(!text.contains(NO_SPIKES_MSG));
        let html = r.render_html();
        assert!(html.contains("Arbitrage Opportunities"));
        assert!(html.contains("<polyline"));
    }

    #[test]
    fn period_labels() {
        assert_eq!(period_label(99.5), "3 Months");
        assert_eq!(period_label(10.0), "10 Days");
        assert_eq!(period_label(0.5), "12 Hours");
    }

    #[test]
    fn html_escapes_market_name() {
        let cfg = Config {
            market_name: "<b>x</b>".to_string(),
            ..Config::default()
        };
        let series = flat(3);
        let r = Report::build(&cfg, &series, &Detection::default(), "t");
        let html = r.render_html();
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
    }

    #[test]
    fn placeholder_text_in_inputs_stays_literal() {
        let cfg = Config {
            market_name: "__SECTIONS__".to_string(),
            market_status: "__REPORT_DATA__".to_string(),
            ..Config::default()
        };
        let series = flat(3);
        let r = Report::build(&cfg, &series, &Detection::default(), "__CARDS__");
        let html = r.render_html();
        assert_eq!(html.matches("Detection Rule:").count(), 3);
        assert_eq!(html.matches("class=\"card\"").count(), 3);
        assert!(html.contains("source: __CARDS__"));
        assert_eq!(html.matches("id=\"report-data\"").count(), 1);
    }

    #[test]
    fn fill_template_single_pass() {
        let out = fill_template("a __X__ b __Y__ _c_", &[("__X__", "__Y__"), ("__Y__", "y")]);
        assert_eq!(out, "a __Y__ b y _c_");
    }

    #[test]
    fn text_sections_carry_kind_tags() {
        let cfg = Config::default();
        let series = flat(4);
        let r = Report::build(&cfg, &series, &Detection::default(), "t");
        let text = r.render_text();
        assert!(text.contains("--- Type A: Front-running [front_running] ---"));
        assert!(text.contains("[parity_break]"));
        assert!(text.contains("[zscore_spike]"));
    }
}
