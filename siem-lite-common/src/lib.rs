//! Shared event model for siem-lite.
//!
//! A [`LogEvent`] is the canonical, immutable form of one security log line
//! once it has been decoded from either the snapshot API or the push stream.
//! [`RawLogEntry`] is the loosely-typed wire shape both channels deliver.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Actor placeholder used when the source omits the address.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Epoch values at or above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn all() -> [Severity; 4] {
        [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical events count as active alerts.
    pub fn is_alert(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown severity level: {0}")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// Whether the severity came with the event or was derived locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityOrigin {
    Supplied,
    Derived,
}

/// Position of an event on the time axis.
///
/// `Unparseable` sorts below every valid instant so that malformed
/// timestamps land in the oldest bucket of a newest-first sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderKey {
    Unparseable,
    At(DateTime<Utc>),
}

impl OrderKey {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            OrderKey::Unparseable => None,
            OrderKey::At(at) => Some(*at),
        }
    }

    pub fn is_parseable(&self) -> bool {
        matches!(self, OrderKey::At(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp is missing")]
    Missing,
    #[error("unrecognised timestamp format: {0}")]
    Unrecognised(String),
    #[error("epoch value out of range: {0}")]
    OutOfRange(i64),
}

/// Parse a source timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` / `YYYY-MM-DDTHH:MM:SS[.fff]`
/// (interpreted as UTC) and integral epoch seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Missing);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(epoch) = trimmed.parse::<i64>() {
        let parsed = if epoch.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD as u64 {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
        return parsed.ok_or(TimestampError::OutOfRange(epoch));
    }

    Err(TimestampError::Unrecognised(trimmed.to_string()))
}

/// Identity tuple used for duplicate detection.
///
/// Two events with equal keys are the same event no matter which channel
/// delivered them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub timestamp: String,
    pub actor_address: String,
    pub event_type: String,
    pub message: Option<String>,
}

impl EventKey {
    /// Stable identifier derived from the key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("evt-{:016x}", hasher.finish())
    }
}

/// Wire shape shared by `/api/logs/*` responses and `new_log` stream frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLogEntry {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default, alias = "actor", alias = "actorAddress")]
    pub ip: Option<String>,
    #[serde(default, alias = "eventType", alias = "event_type")]
    pub event: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub id: String,
    pub timestamp: String,
    #[serde(skip)]
    pub order_key: OrderKey,
    #[serde(rename = "ip")]
    pub actor_address: String,
    #[serde(rename = "event")]
    pub event_type: String,
    pub severity: Severity,
    #[serde(skip)]
    pub severity_origin: SeverityOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip)]
    pub source_id: Option<String>,
}

impl LogEvent {
    /// Create an event whose severity is still to be derived.
    pub fn new(
        timestamp: impl Into<String>,
        actor_address: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        let timestamp = timestamp.into();
        let order_key = parse_timestamp(&timestamp)
            .map(OrderKey::At)
            .unwrap_or(OrderKey::Unparseable);
        let actor_address = normalize_actor(Some(actor_address.into()));

        let mut event = Self {
            id: String::new(),
            timestamp,
            order_key,
            actor_address,
            event_type: event_type.into(),
            severity: Severity::Low,
            severity_origin: SeverityOrigin::Derived,
            message: None,
            source: None,
            source_id: None,
        };
        event.rekey();
        event
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self.rekey();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self.severity_origin = SeverityOrigin::Supplied;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Record a locally derived severity. Supplied severities are kept.
    pub fn apply_derived_severity(&mut self, severity: Severity) {
        if self.severity_origin == SeverityOrigin::Derived {
            self.severity = severity;
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            timestamp: self.timestamp.clone(),
            actor_address: self.actor_address.clone(),
            event_type: self.event_type.clone(),
            message: self.message.clone(),
        }
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.order_key.instant()
    }

    pub fn has_supplied_severity(&self) -> bool {
        self.severity_origin == SeverityOrigin::Supplied
    }

    /// Event type and message, used by keyword matching.
    pub fn searchable_text(&self) -> String {
        match &self.message {
            Some(message) => format!("{} {}", self.event_type, message),
            None => self.event_type.clone(),
        }
    }

    fn rekey(&mut self) {
        self.id = self.key().fingerprint();
    }
}

impl From<RawLogEntry> for LogEvent {
    fn from(raw: RawLogEntry) -> Self {
        let timestamp = raw.timestamp.map(value_to_text).unwrap_or_default();
        let mut event = LogEvent::new(
            timestamp,
            normalize_actor(raw.ip),
            raw.event.unwrap_or_default(),
        );

        if let Some(message) = raw.message.filter(|m| !m.is_empty()) {
            event = event.with_message(message);
        }
        if let Some(severity) = raw.severity.and_then(|s| s.parse::<Severity>().ok()) {
            event = event.with_severity(severity);
        }
        if let Some(source) = raw.source {
            event = event.with_source(source);
        }
        if let Some(id) = raw.id.map(value_to_text).filter(|id| !id.is_empty()) {
            event = event.with_source_id(id);
        }
        event
    }
}

fn normalize_actor(actor: Option<String>) -> String {
    match actor {
        Some(actor) if !actor.trim().is_empty() => actor,
        _ => UNKNOWN_ACTOR.to_string(),
    }
}

fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
