//! Snapshot/stream reconciliation through the dashboard session.


use std::sync::Arc;

use siem_lite::configuration::Configuration;
use siem_lite::DashboardSession;
use siem_lite_common::{LogEvent, Severity};
use test_helpers::{events, LogEventBuilder};

fn session_with_capacity(capacity: usize) -> DashboardSession {
    let mut config = Configuration::default();
    config.buffer.capacity = capacity;
    DashboardSession::new(Arc::new(config))
}

fn admit(session: &DashboardSession, page: Vec<LogEvent>) {
    let ticket = session.begin_request();
    session
        .admit_snapshot(ticket, page)
        .expect("fresh snapshot should be applied");
}

mod duplicate_suppression {
    use super::*;

    #[test]
    fn should_ignore_streamed_copy_of_snapshot_event() {
        let session = session_with_capacity(100);
        let event = LogEventBuilder::new()
            .at("2024-01-16T14:00:10Z")
            .actor("1.1.1.1")
            .event_type("LOGIN_FAILED")
            .build();

        admit(&session, vec![event.clone()]);
        let outcome = session.admit_streamed(event);

        assert_eq!(session.len(), 1);
        assert_eq!(outcome.duplicates, 1);
        assert!(!outcome.changed());
    }

    #[test]
    fn should_make_repeated_snapshots_idempotent() {
        let session = session_with_capacity(100);
        let page = events::distinct_batch(20);

        admit(&session, page.clone());
        let first = session.events();
        admit(&session, page);

        assert_eq!(session.events(), first);
    }

    #[test]
    fn should_treat_different_message_as_distinct_event() {
        let session = session_with_capacity(100);
        let denied = |message: &str| {
            LogEventBuilder::new()
                .event_type("ACCESS_DENIED")
                .message(message)
                .build()
        };

        session.admit_streamed(denied("door 1"));
        session.admit_streamed(denied("door 2"));

        assert_eq!(session.len(), 2);
    }

    #[test]
    fn should_not_publish_for_duplicate_stream_event() {
        let session = session_with_capacity(100);
        let event = events::failed_login_from("10.0.0.1", 5);
        session.admit_streamed(event.clone());
        let revision = session.projection().revision;

        session.admit_streamed(event);

        assert_eq!(session.projection().revision, revision);
    }
}

mod bounded_window {
    use super::*;

    #[test]
    fn should_evict_oldest_when_stream_overflows_full_buffer() {
        let session = session_with_capacity(100);
        let page = events::distinct_batch(100);
        let oldest = page.last().cloned().unwrap();
        admit(&session, page);

        let newest = events::failed_login_from("172.16.0.9", 3000);
        let outcome = session.admit_streamed(newest.clone());

        assert_eq!(session.len(), 100);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(session.events()[0], newest);
        assert!(!session.events().contains(&oldest));
    }

    #[test]
    fn should_never_exceed_capacity_after_any_admission() {
        let session = session_with_capacity(10);

        admit(&session, events::distinct_batch(25));
        for second in 100..130 {
            session.admit_streamed(events::failed_login_from("10.9.9.9", second));
            assert!(session.len() <= 10);
        }

        assert_eq!(session.len(), 10);
    }

    #[test]
    fn should_drop_stale_streamed_event_when_full() {
        let session = session_with_capacity(3);
        admit(
            &session,
            vec![
                events::failed_login_from("a", 30),
                events::failed_login_from("b", 20),
                events::failed_login_from("c", 10),
            ],
        );

        session.admit_streamed(events::failed_login_from("old", 1));

        assert_eq!(session.len(), 3);
        assert!(session.events().iter().all(|e| e.actor_address != "old"));
    }
}

mod ordering {
    use super::*;

    fn is_newest_first(events: &[LogEvent]) -> bool {
        events.windows(2).all(|w| w[0].order_key >= w[1].order_key)
    }

    #[test]
    fn should_keep_newest_first_across_interleaved_channels() {
        let session = session_with_capacity(50);

        admit(
            &session,
            vec![
                events::successful_login_from("10.0.0.1", 40),
                events::successful_login_from("10.0.0.2", 20),
            ],
        );
        session.admit_streamed(events::failed_login_from("10.0.0.3", 30));
        session.admit_streamed(events::failed_login_from("10.0.0.4", 50));
        admit(&session, vec![events::successful_login_from("10.0.0.5", 10)]);

        let actors: Vec<String> = session
            .events()
            .iter()
            .map(|e| e.actor_address.clone())
            .collect();
        assert_eq!(
            actors,
            vec!["10.0.0.4", "10.0.0.1", "10.0.0.3", "10.0.0.2", "10.0.0.5"]
        );
        assert!(is_newest_first(&session.events()));
    }

    #[test]
    fn should_keep_malformed_timestamps_after_valid_ones() {
        let session = session_with_capacity(10);

        session.admit_streamed(
            LogEventBuilder::new()
                .at("yesterday-ish")
                .event_type("SYSTEM_ERROR")
                .build(),
        );
        session.admit_streamed(events::failed_login_from("10.0.0.1", 1));

        let stored = session.events();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].event_type, "LOGIN_FAILED");
        assert_eq!(stored[1].timestamp, "yesterday-ish");
    }
}

mod stale_requests {
    use super::*;

    #[test]
    fn should_discard_snapshot_older_than_last_applied() {
        let session = session_with_capacity(10);
        let slow = session.begin_request();
        let fast = session.begin_request();

        assert!(session
            .admit_snapshot(fast, vec![events::failed_login_from("10.0.0.1", 2)])
            .is_some());
        assert!(session
            .admit_snapshot(slow, vec![events::failed_login_from("10.0.0.2", 1)])
            .is_none());

        assert_eq!(session.len(), 1);
    }

    #[test]
    fn should_discard_requests_issued_before_reset() {
        let session = session_with_capacity(10);
        let before = session.begin_request();

        session.reset();

        assert!(session
            .admit_snapshot(before, vec![events::failed_login_from("10.0.0.1", 1)])
            .is_none());
        assert!(session.is_empty());

        let after = session.begin_request();
        assert!(session
            .admit_snapshot(after, vec![events::failed_login_from("10.0.0.1", 1)])
            .is_some());
    }
}

mod severity_resolution {
    use super::*;

    #[test]
    fn should_derive_severity_for_admitted_events() {
        let session = session_with_capacity(10);

        admit(
            &session,
            vec![
                events::malware_detection(4),
                events::failed_login_from("10.0.0.1", 3),
                LogEventBuilder::new()
                    .event_type("SUSPICIOUS_ACTIVITY")
                    .at_second(2)
                    .build(),
                events::successful_login_from("10.0.0.1", 1),
            ],
        );

        let severities: Vec<Severity> = session.events().iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        );
    }

    #[test]
    fn should_keep_supplied_severity() {
        let session = session_with_capacity(10);

        session.admit_streamed(
            LogEventBuilder::new()
                .event_type("MALWARE_DETECTED")
                .severity(Severity::Low)
                .build(),
        );

        assert_eq!(session.events()[0].severity, Severity::Low);
    }
}
