use crate::configuration::OutputFormat;
use crate::metrics::DashboardMetrics;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use siem_lite_common::{LogEvent, Severity};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait OutputStrategy {
    fn format_event(&self, event: &LogEvent) -> String;
    fn format_header(&self) -> String;
    fn format_summary(&self, events: &[LogEvent], metrics: &DashboardMetrics) -> String;
    fn file_extension(&self) -> &'static str;

    /// Header plus one line per event; what `export` writes.
    fn render(&self, events: &[LogEvent]) -> String {
        let mut out = String::new();
        let header = self.format_header();
        if !header.is_empty() {
            out.push_str(&header);
            out.push('\n');
        }
        for event in events {
            out.push_str(&self.format_event(event));
            out.push('\n');
        }
        out
    }

    fn save_to_file(&self, path: &Path, content: &str) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

pub struct JsonOutputStrategy;

impl OutputStrategy for JsonOutputStrategy {
    fn format_event(&self, event: &LogEvent) -> String {
        serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_header(&self) -> String {
        String::new()
    }

    fn format_summary(&self, events: &[LogEvent], metrics: &DashboardMetrics) -> String {
        let summary = JsonSummary {
            generated_at: chrono::Utc::now().to_rfc3339(),
            metrics,
            severity_breakdown: count_by_severity(events),
            event_type_breakdown: count_by_event_type(events),
        };

        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    /// A JSON array, so the export is one valid document.
    fn render(&self, events: &[LogEvent]) -> String {
        serde_json::to_string_pretty(events).unwrap_or_else(|_| "[]".to_string())
    }
}

pub struct CsvOutputStrategy;

impl OutputStrategy for CsvOutputStrategy {
    fn format_event(&self, event: &LogEvent) -> String {
        format!(
            "{},{},{},{}",
            escape_csv(&event.timestamp),
            escape_csv(&event.actor_address),
            escape_csv(&event.event_type),
            event.severity.as_str()
        )
    }

    fn format_header(&self) -> String {
        "Timestamp,IP Address,Event,Severity".to_string()
    }

    fn format_summary(&self, _events: &[LogEvent], metrics: &DashboardMetrics) -> String {
        let mut summary = String::new();
        writeln!(&mut summary, "Metric,Value").unwrap();
        writeln!(&mut summary, "Total Events,{}", metrics.total_events).unwrap();
        writeln!(&mut summary, "Failed,{}", metrics.failed_count).unwrap();
        writeln!(&mut summary, "Unique Actors,{}", metrics.unique_actors).unwrap();
        writeln!(&mut summary, "Blocked Actors,{}", metrics.blocked_actors).unwrap();
        writeln!(&mut summary, "Active Alerts,{}", metrics.active_alerts).unwrap();
        summary
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }
}

pub struct PlainTextOutputStrategy {
    verbose: bool,
}

impl PlainTextOutputStrategy {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl OutputStrategy for PlainTextOutputStrategy {
    fn format_event(&self, event: &LogEvent) -> String {
        let icon = severity_icon(event.severity);
        let line = format!(
            "[{}] {} {:<8} {:<15} {}",
            event.timestamp,
            icon,
            event.severity.as_str().to_uppercase(),
            event.actor_address,
            event.event_type
        );

        match (&event.message, self.verbose) {
            (Some(message), true) => format!("{} - {}", line, message),
            _ => line,
        }
    }

    fn format_header(&self) -> String {
        if self.verbose {
            "🔍 SIEM Lite - Verbose Mode".to_string()
        } else {
            "🔍 SIEM Lite".to_string()
        }
    }

    fn format_summary(&self, events: &[LogEvent], metrics: &DashboardMetrics) -> String {
        let mut summary = String::new();
        writeln!(&mut summary, "\n📊 Dashboard Summary").unwrap();
        writeln!(&mut summary, "====================").unwrap();
        writeln!(&mut summary, "Total Events:   {}", metrics.total_events).unwrap();
        writeln!(&mut summary, "Failed:         {}", metrics.failed_count).unwrap();
        writeln!(&mut summary, "Unique Actors:  {}", metrics.unique_actors).unwrap();
        writeln!(&mut summary, "Blocked Actors: {}", metrics.blocked_actors).unwrap();
        writeln!(&mut summary, "Active Alerts:  {}", metrics.active_alerts).unwrap();

        let severities = count_by_severity(events);
        if !severities.is_empty() {
            writeln!(&mut summary, "\n🚨 Severity Breakdown:").unwrap();
            for severity in Severity::all().iter().rev() {
                if let Some(count) = severities.get(severity.as_str()) {
                    writeln!(
                        &mut summary,
                        "  {} {}: {}",
                        severity_icon(*severity),
                        severity.as_str().to_uppercase(),
                        count
                    )
                    .unwrap();
                }
            }
        }

        let alerts: Vec<&LogEvent> = events.iter().filter(|e| e.severity.is_alert()).collect();
        if !alerts.is_empty() {
            writeln!(&mut summary, "\n⚠️  Recent Alerts:").unwrap();
            for event in alerts.iter().take(5) {
                writeln!(
                    &mut summary,
                    "  • {} from {} at {}",
                    event.event_type, event.actor_address, event.timestamp
                )
                .unwrap();
            }
            if alerts.len() > 5 {
                writeln!(&mut summary, "  ... and {} more alerts", alerts.len() - 5).unwrap();
            }
        }

        summary
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    generated_at: String,
    metrics: &'a DashboardMetrics,
    severity_breakdown: BTreeMap<&'static str, usize>,
    event_type_breakdown: BTreeMap<String, usize>,
}

pub fn strategy_for(format: OutputFormat, verbose: bool) -> Box<dyn OutputStrategy> {
    match format {
        OutputFormat::Plain => Box::new(PlainTextOutputStrategy::new(verbose)),
        OutputFormat::Json => Box::new(JsonOutputStrategy),
        OutputFormat::Csv => Box::new(CsvOutputStrategy),
    }
}

/// `logs-export-YYYY-MM-DD.<ext>`
pub fn default_export_path(date: NaiveDate, strategy: &dyn OutputStrategy) -> PathBuf {
    PathBuf::from(format!(
        "logs-export-{}.{}",
        date.format("%Y-%m-%d"),
        strategy.file_extension()
    ))
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::High => "🟠",
        Severity::Medium => "🟡",
        Severity::Low => "🟢",
    }
}

fn count_by_severity(events: &[LogEvent]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.severity.as_str()).or_insert(0) += 1;
    }
    counts
}

fn count_by_event_type(events: &[LogEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type.clone()).or_insert(0) += 1;
    }
    counts
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
