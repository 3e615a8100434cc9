//! Output formatters for merged runs
//!
//! Provides Table, JSON, CSV and summary renderings of events, stats and sessions.

use anyhow::Result;

use crate::executor::SessionOutcome;
use crate::models::{Event, EventKind, RunStats};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

const EVENT_HEADER: [&str; 5] = ["index", "kind", "runner", "title", "args"];

/// Formatter for aggregated output
pub struct ReportFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single forwarded event
    pub fn format_event(&self, event: &Event) -> String {
        match self.format {
            OutputFormat::Table => self.format_event_table(event),
            OutputFormat::Json => serde_json::to_string(event).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(event).unwrap_or_default(),
            OutputFormat::Csv => {
                let row = event_row(0, event);
                render_csv(None, &[row])
                    .unwrap_or_default()
                    .trim_end()
                    .to_string()
            }
            OutputFormat::Summary => event.to_string(),
        }
    }

    fn format_event_table(&self, event: &Event) -> String {
        let (symbol, color) = match event.kind {
            EventKind::TestPass => ("✓", "32"),
            EventKind::TestFail => ("✗", "31"),
            EventKind::TestPending => ("○", "33"),
            EventKind::RunBegin => ("▶", "36"),
            EventKind::RunEnd => ("■", "36"),
            _ => ("·", "90"),
        };
        let marker = if self.colorize {
            format!("\x1b[{color}m{symbol} {:<10}\x1b[0m", event.kind.name())
        } else {
            format!("{symbol} {:<10}", event.kind.name())
        };

        format!(
            "{} {:<12} {}",
            marker,
            event.runner_name().unwrap_or("-"),
            event.title().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }

    /// Format the whole merged event stream
    pub fn format_transcript(&self, events: &[Event]) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut output = String::new();
                output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
                output.push_str(&format!("║  Merged event stream ({:5} events){:27}║\n", events.len(), ""));
                output.push_str("╚══════════════════════════════════════════════════════════════╝\n");
                for event in events {
                    output.push_str("  ");
                    output.push_str(&self.format_event_table(event));
                    output.push('\n');
                }
                output
            }
            OutputFormat::Json => serde_json::to_string(events).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(events).unwrap_or_default(),
            OutputFormat::Csv => {
                let rows: Vec<_> = events
                    .iter()
                    .enumerate()
                    .map(|(index, event)| event_row(index, event))
                    .collect();
                render_csv(Some(&EVENT_HEADER), &rows).unwrap_or_default()
            }
            OutputFormat::Summary => {
                let count = |kind| events.iter().filter(|e| e.kind == kind).count();
                format!(
                    "{} events ({} begin, {} end, {} pass, {} fail, {} pending)",
                    events.len(),
                    count(EventKind::RunBegin),
                    count(EventKind::RunEnd),
                    count(EventKind::TestPass),
                    count(EventKind::TestFail),
                    count(EventKind::TestPending)
                )
            }
        }
    }

    /// Format run statistics
    pub fn format_stats(&self, stats: &RunStats) -> String {
        match self.format {
            OutputFormat::Table => self.format_stats_table(stats),
            OutputFormat::Json => serde_json::to_string(stats).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(stats).unwrap_or_default(),
            OutputFormat::Csv => {
                let row = vec![
                    stats.suites.to_string(),
                    stats.tests.to_string(),
                    stats.passes.to_string(),
                    stats.failures.to_string(),
                    stats.pending.to_string(),
                    stats
                        .duration_ms
                        .map(|d| d.to_string())
                        .unwrap_or_default(),
                ];
                render_csv(
                    Some(&["suites", "tests", "passes", "failures", "pending", "duration_ms"]),
                    &[row],
                )
                .unwrap_or_default()
            }
            OutputFormat::Summary => stats.to_string(),
        }
    }

    fn format_stats_table(&self, stats: &RunStats) -> String {
        let mut output = String::new();

        let pass_str = if self.colorize {
            format!("\x1b[32m{:3}\x1b[0m", stats.passes)
        } else {
            format!("{:3}", stats.passes)
        };
        let fail_str = if self.colorize && stats.failures > 0 {
            format!("\x1b[31m{:3}\x1b[0m", stats.failures)
        } else {
            format!("{:3}", stats.failures)
        };

        output.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Suites: {:3} | Tests: {:3} | Pass: {} | Fail: {} | Pending: {:3} ║\n",
            stats.suites, stats.tests, pass_str, fail_str, stats.pending
        ));
        let duration = stats
            .duration_ms
            .map(|d| format!("{d}ms"))
            .unwrap_or_else(|| "n/a".to_string());
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:>10}                      ║\n",
            stats.pass_rate(),
            duration
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    /// Format a complete session
    pub fn format_outcome(&self, outcome: &SessionOutcome) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut output = self.format_transcript(&outcome.events);
                output.push_str(&self.format_stats_table(&outcome.stats));
                output.push_str(&format!("  {}\n", status_line(outcome)));
                output
            }
            OutputFormat::Json => serde_json::to_string(outcome).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Csv => self.format_transcript(&outcome.events),
            OutputFormat::Summary => format!(
                "{} runners, {} tests: {} passed, {} failed, {} pending ({:.1}%) in {}ms - {}",
                outcome.runners,
                outcome.stats.tests,
                outcome.stats.passes,
                outcome.stats.failures,
                outcome.stats.pending,
                outcome.stats.pass_rate(),
                outcome.elapsed_ms,
                status_line(outcome)
            ),
        }
    }
}

fn status_line(outcome: &SessionOutcome) -> String {
    match &outcome.stall {
        None => format!("COMPLETE (total {})", outcome.total),
        Some(report) => format!("STALLED ({report})"),
    }
}

fn event_row(index: usize, event: &Event) -> Vec<String> {
    vec![
        index.to_string(),
        event.kind.name().to_string(),
        event.runner_name().unwrap_or_default().to_string(),
        event.title().unwrap_or_default().to_string(),
        if event.args.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&event.args).unwrap_or_default()
        },
    ]
}

fn render_csv(header: Option<&[&str]>, rows: &[Vec<String>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
