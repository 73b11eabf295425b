//! Dashboard Metrics
//!
//! Counters are derived from the reconciliation buffer. When the server
//! pushes its own statistics those take precedence field by field, and any
//! field the server leaves out falls back to the locally derived value.

use serde::{Deserialize, Serialize};
use siem_lite_common::LogEvent;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardMetrics {
    pub total_events: usize,
    pub failed_count: usize,
    pub unique_actors: usize,
    pub blocked_actors: usize,
    pub active_alerts: usize,
}

/// Statistics pushed by the server over the stream (`stats_update`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    #[serde(default)]
    pub total_logs: Option<usize>,
    #[serde(default)]
    pub failed_logins: Option<usize>,
    #[serde(default, rename = "blockedIPs")]
    pub blocked_ips: Option<usize>,
    #[serde(default)]
    pub active_alerts: Option<usize>,
    #[serde(default)]
    pub unique_actors: Option<usize>,
}

impl ServerStats {
    pub fn is_empty(&self) -> bool {
        self.total_logs.is_none()
            && self.failed_logins.is_none()
            && self.blocked_ips.is_none()
            && self.active_alerts.is_none()
            && self.unique_actors.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSource {
    Local,
    ServerPushed,
}

impl MetricsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsSource::Local => "local",
            MetricsSource::ServerPushed => "server",
        }
    }
}

pub trait MetricsStrategy {
    fn compute(&self, events: &[LogEvent]) -> DashboardMetrics;
    fn source(&self) -> MetricsSource;
}

/// Counts derived purely from the buffered events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMetrics;

impl MetricsStrategy for LocalMetrics {
    fn compute(&self, events: &[LogEvent]) -> DashboardMetrics {
        derive_metrics(events)
    }

    fn source(&self) -> MetricsSource {
        MetricsSource::Local
    }
}

/// Server statistics laid over the local derivation.
#[derive(Debug, Clone)]
pub struct ServerPushedMetrics {
    stats: ServerStats,
}

impl ServerPushedMetrics {
    pub fn new(stats: ServerStats) -> Self {
        Self { stats }
    }
}

impl MetricsStrategy for ServerPushedMetrics {
    fn compute(&self, events: &[LogEvent]) -> DashboardMetrics {
        let local = derive_metrics(events);
        DashboardMetrics {
            total_events: self.stats.total_logs.unwrap_or(local.total_events),
            failed_count: self.stats.failed_logins.unwrap_or(local.failed_count),
            unique_actors: self.stats.unique_actors.unwrap_or(local.unique_actors),
            blocked_actors: self.stats.blocked_ips.unwrap_or(local.blocked_actors),
            active_alerts: self.stats.active_alerts.unwrap_or(local.active_alerts),
        }
    }

    fn source(&self) -> MetricsSource {
        MetricsSource::ServerPushed
    }
}

/// Pick the strategy for the current session state.
pub fn strategy_for(stats: Option<&ServerStats>) -> Box<dyn MetricsStrategy> {
    match stats {
        Some(stats) if !stats.is_empty() => Box::new(ServerPushedMetrics::new(stats.clone())),
        _ => Box::new(LocalMetrics),
    }
}

pub fn derive_metrics(events: &[LogEvent]) -> DashboardMetrics {
    let mut actors = HashSet::new();
    let mut blocked = HashSet::new();
    let mut failed_count = 0;
    let mut active_alerts = 0;

    for event in events {
        actors.insert(event.actor_address.as_str());

        let text = event.searchable_text().to_lowercase();
        if text.contains("failed") || text.contains("denied") {
            failed_count += 1;
        }
        if text.contains("block") {
            blocked.insert(event.actor_address.as_str());
        }
        if event.severity.is_alert() {
            active_alerts += 1;
        }
    }

    DashboardMetrics {
        total_events: events.len(),
        failed_count,
        unique_actors: actors.len(),
        blocked_actors: blocked.len(),
        active_alerts,
    }
}
