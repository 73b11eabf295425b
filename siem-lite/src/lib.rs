//! Live security event aggregation for a SIEM-lite dashboard.
//!
//! Events arrive from a periodic snapshot endpoint and a push stream; the
//! [`event_processing::DashboardSession`] reconciles them into one bounded,
//! ordered, duplicate-free buffer and derives metrics and filtered views
//! from it. The [`supervisor::ConnectivitySupervisor`] owns the timers and
//! the stream connection.

use siem_lite_common::LogEvent;

pub mod channel;
pub mod cli;
pub mod configuration;
pub mod errors;
pub mod event_processing;
pub mod filter;
pub mod metrics;
pub mod output_strategy;
pub mod severity_classifier;
pub mod supervisor;

pub use errors::{ChannelKind, Result, SiemError};
pub use event_processing::{DashboardProjection, DashboardSession};
pub use supervisor::{ChannelSet, ConnectivitySupervisor};

/// Fixed-width table rows for the terminal.
pub struct EventFormatter {
    verbose: bool,
}

impl EventFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn header(&self) -> String {
        if self.verbose {
            format!(
                "{:<25} {:<15} {:<22} {:<8} {:<40}",
                "TIMESTAMP", "ACTOR", "EVENT", "SEVERITY", "MESSAGE"
            )
        } else {
            format!(
                "{:<25} {:<15} {:<22} {:<8}",
                "TIMESTAMP", "ACTOR", "EVENT", "SEVERITY"
            )
        }
    }

    pub fn separator(&self) -> String {
        if self.verbose {
            "-".repeat(114)
        } else {
            "-".repeat(73)
        }
    }

    pub fn format_event(&self, event: &LogEvent) -> String {
        let timestamp = truncate(&event.timestamp, 25);
        let actor = truncate(&event.actor_address, 15);
        let event_type = truncate(&event.event_type, 22);
        let severity = event.severity.as_str().to_uppercase();

        if self.verbose {
            let message = event.message.as_deref().unwrap_or("");
            format!(
                "{:<25} {:<15} {:<22} {:<8} {:<40}",
                timestamp,
                actor,
                event_type,
                severity,
                truncate(message, 40)
            )
        } else {
            format!(
                "{:<25} {:<15} {:<22} {:<8}",
                timestamp, actor, event_type, severity
            )
        }
    }
}

/// Cut `value` to at most `width` characters, marking the cut with "...".
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }
    let kept: String = value.chars().take(width - 3).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siem_lite_common::Severity;

    mod formatter_tests {
        use super::*;

        fn sample() -> LogEvent {
            LogEvent::new("2024-01-16T14:30:00Z", "10.0.0.1", "LOGIN_FAILED")
                .with_message("invalid password")
                .with_severity(Severity::High)
        }

        #[test]
        fn should_format_compact_row() {
            let formatter = EventFormatter::new(false);

            let row = formatter.format_event(&sample());

            assert!(row.starts_with("2024-01-16T14:30:00Z"));
            assert!(row.contains("10.0.0.1"));
            assert!(row.contains("HIGH"));
            assert!(!row.contains("invalid password"));
        }

        #[test]
        fn should_include_message_in_verbose_row() {
            let formatter = EventFormatter::new(true);

            assert!(formatter.format_event(&sample()).contains("invalid password"));
            assert!(formatter.header().contains("MESSAGE"));
        }

        #[test]
        fn should_size_separator_to_header() {
            for verbose in [false, true] {
                let formatter = EventFormatter::new(verbose);
                assert_eq!(formatter.separator().len(), formatter.header().len());
            }
        }
    }

    mod truncate_tests {
        use super::*;

        #[test]
        fn should_leave_short_values_alone() {
            assert_eq!(truncate("short", 10), "short");
        }

        #[test]
        fn should_mark_truncated_values() {
            assert_eq!(truncate("a-very-long-event-type", 10), "a-very-...");
        }

        #[test]
        fn should_respect_char_boundaries() {
            assert_eq!(truncate("ééééé", 4), "é...");
        }
    }
}
