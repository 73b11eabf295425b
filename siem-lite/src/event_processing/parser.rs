//! Wire Decoding
//!
//! Turns snapshot/search response bodies and stream frames into
//! [`LogEvent`]s. Individual malformed records degrade instead of failing
//! the whole page: a bad timestamp only costs the event its ordering.

use crate::errors::{ChannelKind, Result, SiemError};
use crate::metrics::ServerStats;
use log::{debug, warn};
use serde::Deserialize;
use siem_lite_common::{LogEvent, RawLogEntry};

pub const FRAME_NEW_LOG: &str = "new_log";
pub const FRAME_CONNECTION_STATUS: &str = "connection_status";
pub const FRAME_STATS_UPDATE: &str = "stats_update";
pub const FRAME_NEW_ALERT: &str = "new_alert";

/// One page of events as returned by the snapshot or search endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPage {
    pub events: Vec<LogEvent>,
    /// Server-reported total, or the page length when the server omits it.
    pub total: usize,
}

/// Messages carried on the push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    NewLog(LogEvent),
    ConnectionStatus { connected: bool },
    StatsUpdate(ServerStats),
    NewAlert(serde_json::Value),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    pub healthy: bool,
}

#[derive(Deserialize)]
struct LogsEnvelope {
    #[serde(default)]
    logs: Vec<serde_json::Value>,
    #[serde(default)]
    total: Option<usize>,
}

#[derive(Deserialize)]
struct StreamFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct HealthEnvelope {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct ConnectionStatusPayload {
    #[serde(default)]
    connected: bool,
}

pub struct EventParser;

impl EventParser {
    /// Decode `{"logs": [...], "total": n}`. A bare array is also accepted.
    pub fn parse_logs_response(channel: ChannelKind, body: &str) -> Result<LogPage> {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| SiemError::decode(channel, e))?;

        let envelope = match value {
            serde_json::Value::Array(logs) => LogsEnvelope { logs, total: None },
            other => serde_json::from_value::<LogsEnvelope>(other)
                .map_err(|e| SiemError::decode(channel, e))?,
        };

        let mut events = Vec::with_capacity(envelope.logs.len());
        for record in envelope.logs {
            match Self::parse_log_value(record) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping {} record: {}", channel, e),
            }
        }

        let total = envelope.total.unwrap_or(events.len());
        Ok(LogPage { events, total })
    }

    /// Decode one wire log record.
    pub fn parse_log_value(value: serde_json::Value) -> Result<LogEvent> {
        if !value.is_object() {
            return Err(SiemError::MalformedEvent {
                field: "record".to_string(),
                value: value.to_string(),
            });
        }

        let raw: RawLogEntry = serde_json::from_value(value).map_err(|e| {
            SiemError::MalformedEvent {
                field: "record".to_string(),
                value: e.to_string(),
            }
        })?;
        let event = LogEvent::from(raw);

        if let Err(e) = Self::check_timestamp(&event) {
            warn!("{}; event {} will sort as oldest", e, event.id);
        }
        Ok(event)
    }

    pub fn check_timestamp(event: &LogEvent) -> Result<()> {
        if event.order_key.is_parseable() {
            Ok(())
        } else {
            Err(SiemError::MalformedEvent {
                field: "timestamp".to_string(),
                value: event.timestamp.clone(),
            })
        }
    }

    /// Decode a `{"event": name, "data": payload}` stream frame.
    pub fn parse_stream_frame(text: &str) -> Result<StreamMessage> {
        let frame: StreamFrame = serde_json::from_str(text)
            .map_err(|e| SiemError::decode(ChannelKind::Stream, e))?;

        match frame.event.as_str() {
            FRAME_NEW_LOG => Self::parse_log_value(frame.data).map(StreamMessage::NewLog),
            FRAME_CONNECTION_STATUS => {
                let payload: ConnectionStatusPayload = serde_json::from_value(frame.data)
                    .map_err(|e| SiemError::decode(ChannelKind::Stream, e))?;
                Ok(StreamMessage::ConnectionStatus {
                    connected: payload.connected,
                })
            }
            FRAME_STATS_UPDATE => serde_json::from_value(frame.data)
                .map(StreamMessage::StatsUpdate)
                .map_err(|e| SiemError::decode(ChannelKind::Stream, e)),
            FRAME_NEW_ALERT => Ok(StreamMessage::NewAlert(frame.data)),
            other => {
                debug!("Ignoring unknown stream frame: {}", other);
                Ok(StreamMessage::Unknown(other.to_string()))
            }
        }
    }

    /// Decode `{"status": "..."}`. Only `"healthy"` counts as healthy.
    pub fn parse_health(body: &str) -> Result<HealthStatus> {
        let envelope: HealthEnvelope = serde_json::from_str(body)
            .map_err(|e| SiemError::decode(ChannelKind::Health, e))?;
        let healthy = envelope.status == "healthy";
        Ok(HealthStatus {
            status: envelope.status,
            healthy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use siem_lite_common::{OrderKey, Severity, UNKNOWN_ACTOR};

    mod logs_response_tests {
        use super::*;

        #[test]
        fn should_decode_logs_with_total() {
            let body = r#"{
                "logs": [
                    {"id": 7, "timestamp": "2024-01-16T14:30:00Z", "ip": "10.0.0.1",
                     "event": "LOGIN_FAILED", "severity": "high", "message": "bad password"},
                    {"timestamp": "2024-01-16T14:29:00Z", "event": "LOGIN_SUCCESS"}
                ],
                "total": 250
            }"#;

            let page = EventParser::parse_logs_response(ChannelKind::Snapshot, body).unwrap();

            assert_eq!(page.total, 250);
            assert_eq!(page.events.len(), 2);
            assert_eq!(page.events[0].severity, Severity::High);
            assert_eq!(page.events[0].source_id.as_deref(), Some("7"));
            assert_eq!(page.events[1].actor_address, UNKNOWN_ACTOR);
        }

        #[test]
        fn should_fall_back_to_page_length_for_total() {
            let body = r#"{"logs": [{"timestamp": "1", "ip": "a", "event": "X"}]}"#;

            let page = EventParser::parse_logs_response(ChannelKind::Search, body).unwrap();

            assert_eq!(page.total, 1);
        }

        #[test]
        fn should_accept_bare_array() {
            let body = r#"[{"timestamp": "1", "ip": "a", "event": "X"}]"#;

            let page = EventParser::parse_logs_response(ChannelKind::Snapshot, body).unwrap();

            assert_eq!(page.events.len(), 1);
        }

        #[test]
        fn should_skip_non_object_records() {
            let body = r#"{"logs": [42, {"timestamp": "1", "ip": "a", "event": "X"}]}"#;

            let page = EventParser::parse_logs_response(ChannelKind::Snapshot, body).unwrap();

            assert_eq!(page.events.len(), 1);
        }

        #[test]
        fn should_keep_event_with_malformed_timestamp() {
            let body = r#"{"logs": [{"timestamp": "around noon", "ip": "a", "event": "X"}]}"#;

            let page = EventParser::parse_logs_response(ChannelKind::Snapshot, body).unwrap();

            assert_eq!(page.events[0].order_key, OrderKey::Unparseable);
            assert_matches!(
                EventParser::check_timestamp(&page.events[0]),
                Err(SiemError::MalformedEvent { .. })
            );
        }

        #[test]
        fn should_report_decode_error_for_invalid_json() {
            let result = EventParser::parse_logs_response(ChannelKind::Snapshot, "<html>");

            assert_matches!(
                result,
                Err(SiemError::Decode {
                    channel: ChannelKind::Snapshot,
                    ..
                })
            );
        }
    }

    mod stream_frame_tests {
        use super::*;

        #[test]
        fn should_decode_new_log() {
            let frame = r#"{"event": "new_log", "data": {"timestamp": "2024-01-16T14:30:00Z",
                "ip": "10.0.0.5", "event": "MALWARE_DETECTED"}}"#;

            let message = EventParser::parse_stream_frame(frame).unwrap();

            assert_matches!(message, StreamMessage::NewLog(event) => {
                assert_eq!(event.actor_address, "10.0.0.5");
                assert_eq!(event.event_type, "MALWARE_DETECTED");
            });
        }

        #[test]
        fn should_decode_stats_update() {
            let frame = r#"{"event": "stats_update", "data": {"totalLogs": 12, "activeAlerts": 2}}"#;

            let message = EventParser::parse_stream_frame(frame).unwrap();

            assert_matches!(message, StreamMessage::StatsUpdate(stats) => {
                assert_eq!(stats.total_logs, Some(12));
                assert_eq!(stats.active_alerts, Some(2));
            });
        }

        #[test]
        fn should_decode_connection_status_and_alert() {
            assert_eq!(
                EventParser::parse_stream_frame(
                    r#"{"event": "connection_status", "data": {"connected": true}}"#
                )
                .unwrap(),
                StreamMessage::ConnectionStatus { connected: true }
            );
            assert_matches!(
                EventParser::parse_stream_frame(r#"{"event": "new_alert", "data": {"id": 1}}"#),
                Ok(StreamMessage::NewAlert(_))
            );
        }

        #[test]
        fn should_pass_through_unknown_frames() {
            assert_eq!(
                EventParser::parse_stream_frame(r#"{"event": "heartbeat"}"#).unwrap(),
                StreamMessage::Unknown("heartbeat".to_string())
            );
        }

        #[test]
        fn should_reject_frame_without_event_name() {
            assert_matches!(
                EventParser::parse_stream_frame(r#"{"data": {}}"#),
                Err(SiemError::Decode { .. })
            );
        }
    }

    mod health_tests {
        use super::*;

        #[test]
        fn should_only_treat_healthy_status_as_healthy() {
            assert!(EventParser::parse_health(r#"{"status": "healthy"}"#).unwrap().healthy);
            assert!(!EventParser::parse_health(r#"{"status": "degraded"}"#).unwrap().healthy);
            assert!(!EventParser::parse_health(r#"{}"#).unwrap().healthy);
        }
    }
}
