//! Metrics, filtered views and search mode derived from the session.


use std::sync::Arc;

use assert_matches::assert_matches;
use siem_lite::configuration::Configuration;
use siem_lite::event_processing::LogPage;
use siem_lite::filter::{FilterEngine, FilterState, SearchMode};
use siem_lite::metrics::{MetricsSource, ServerStats};
use siem_lite::{DashboardSession, SiemError};
use siem_lite_common::{LogEvent, Severity};
use test_helpers::{events, LogEventBuilder};

fn session() -> DashboardSession {
    DashboardSession::new(Arc::new(Configuration::default()))
}

fn seeded_session() -> DashboardSession {
    let session = session();
    let ticket = session.begin_request();
    session.admit_snapshot(
        ticket,
        vec![
            events::firewall_block_of("203.0.113.7", 50),
            events::failed_login_from("192.168.1.5", 40),
            events::failed_login_from("10.0.0.1", 30),
            events::successful_login_from("192.168.1.5", 20),
            events::malware_detection(10),
        ],
    );
    session
}

mod metrics_consistency {
    use super::*;

    fn alert_count(events: &[LogEvent]) -> usize {
        events.iter().filter(|e| e.severity.is_alert()).count()
    }

    #[test]
    fn should_count_alerts_from_current_buffer() {
        let session = seeded_session();

        let metrics = session.metrics();

        assert_eq!(metrics.total_events, 5);
        assert_eq!(metrics.active_alerts, alert_count(&session.events()));
        assert_eq!(metrics.active_alerts, 4);
        assert_eq!(metrics.failed_count, 2);
        assert_eq!(metrics.unique_actors, 4);
        assert_eq!(metrics.blocked_actors, 1);
    }

    #[test]
    fn should_raise_alert_count_for_streamed_malware() {
        let session = seeded_session();
        let before = session.metrics().active_alerts;

        session.admit_streamed(
            LogEventBuilder::new()
                .event_type("MALWARE_DETECTED")
                .actor("10.0.0.99")
                .at_second(60)
                .build(),
        );

        let newest = &session.events()[0];
        assert_eq!(newest.severity, Severity::Critical);
        assert_eq!(session.metrics().active_alerts, before + 1);
    }

    #[test]
    fn should_keep_metrics_consistent_after_eviction() {
        let mut config = Configuration::default();
        config.buffer.capacity = 3;
        let session = DashboardSession::new(Arc::new(config));

        for second in 0..10 {
            session.admit_streamed(events::malware_detection(second));
            assert_eq!(
                session.metrics().active_alerts,
                alert_count(&session.events())
            );
        }
        assert_eq!(session.metrics().active_alerts, 3);
    }
}

mod server_pushed_metrics {
    use super::*;

    #[test]
    fn should_prefer_server_values_when_pushed() {
        let session = seeded_session();

        session.apply_server_stats(ServerStats {
            total_logs: Some(12_000),
            active_alerts: Some(42),
            ..ServerStats::default()
        });

        let projection = session.projection();
        assert_eq!(projection.metrics_source, MetricsSource::ServerPushed);
        assert_eq!(projection.metrics.total_events, 12_000);
        assert_eq!(projection.metrics.active_alerts, 42);
        assert_eq!(projection.metrics.unique_actors, 4);
    }

    #[test]
    fn should_keep_server_values_when_empty_update_follows() {
        let session = seeded_session();
        session.apply_server_stats(ServerStats {
            total_logs: Some(12_000),
            ..ServerStats::default()
        });

        session.apply_server_stats(ServerStats::default());

        let projection = session.projection();
        assert_eq!(projection.metrics_source, MetricsSource::ServerPushed);
        assert_eq!(projection.metrics.total_events, 12_000);
    }

    #[test]
    fn should_fall_back_to_local_metrics_after_reset() {
        let session = seeded_session();
        session.apply_server_stats(ServerStats {
            total_logs: Some(1),
            ..ServerStats::default()
        });

        session.reset();

        let projection = session.projection();
        assert_eq!(projection.metrics_source, MetricsSource::Local);
        assert_eq!(projection.metrics.total_events, 0);
    }
}

mod local_filtering {
    use super::*;

    fn actors(view: &[LogEvent]) -> Vec<String> {
        view.iter().map(|e| e.actor_address.clone()).collect()
    }

    #[test]
    fn should_match_actor_prefix_as_substring() {
        let session = session();
        session.admit_streamed(events::failed_login_from("192.168.1.5", 2));
        session.admit_streamed(events::failed_login_from("10.0.0.1", 1));

        session.set_filter(FilterState::default().with_actor("192.168"));

        assert_eq!(actors(&session.view()), vec!["192.168.1.5"]);
    }

    #[test]
    fn should_intersect_actor_and_event_type_filters() {
        let buffer = seeded_session().events();
        let by_actor = FilterState::default().with_actor("192.168");
        let by_type = FilterState::default().with_event_type("failed");
        let both = by_actor.clone().with_event_type("failed");

        let expected: Vec<LogEvent> = FilterEngine::apply(&buffer, &by_actor)
            .into_iter()
            .filter(|e| FilterEngine::apply(&buffer, &by_type).contains(e))
            .collect();

        assert_eq!(FilterEngine::apply(&buffer, &both), expected);
        assert_eq!(expected.len(), 1);
    }

    #[test]
    fn should_refilter_when_buffer_changes() {
        let session = seeded_session();
        session.set_filter(FilterState::default().with_event_type("login_failed"));
        assert_eq!(session.view().len(), 2);

        session.admit_streamed(events::failed_login_from("172.16.0.1", 90));

        assert_eq!(session.view().len(), 3);
        assert_eq!(session.projection().view_total, 3);
    }

    #[test]
    fn should_leave_buffer_untouched_by_filters() {
        let session = seeded_session();

        session.set_filter(FilterState::default().with_actor("no-such-actor"));

        assert!(session.view().is_empty());
        assert_eq!(session.len(), 5);

        session.clear_filters();
        assert_eq!(session.view().len(), 5);
    }

    #[test]
    fn should_list_filter_options_from_buffer() {
        let options = seeded_session().filter_options();

        assert_eq!(options.actors[0].actor, "192.168.1.5");
        assert_eq!(options.actors[0].count, 2);
        let failed = options
            .event_types
            .iter()
            .find(|o| o.event_type == "LOGIN_FAILED")
            .unwrap();
        assert_eq!(failed.count, 2);
        assert_eq!(failed.severity, Severity::High);
    }
}

mod remote_search_mode {
    use super::*;

    fn page(total: usize) -> LogPage {
        LogPage {
            events: vec![events::failed_login_from("198.51.100.1", 1)],
            total,
        }
    }

    #[test]
    fn should_reject_results_outside_remote_mode() {
        let session = seeded_session();
        let ticket = session.begin_request();

        let result = session.apply_search_results(ticket, 1, page(1));

        assert_matches!(result, Err(SiemError::SearchModeMismatch));
    }

    #[test]
    fn should_show_remote_page_instead_of_local_view() {
        let session = seeded_session();
        session.set_search_mode(SearchMode::Remote);
        let ticket = session.begin_request();

        assert!(session.apply_search_results(ticket, 3, page(120)).unwrap());

        let projection = session.projection();
        assert_eq!(projection.mode, SearchMode::Remote);
        assert_eq!(projection.view.len(), 1);
        assert_eq!(projection.view_total, 120);
        assert_eq!(projection.remote_page, Some(3));
        assert_eq!(projection.events.len(), 5);
    }

    #[test]
    fn should_drop_remote_results_when_filter_changes() {
        let session = seeded_session();
        session.set_search_mode(SearchMode::Remote);
        let ticket = session.begin_request();
        session.apply_search_results(ticket, 1, page(1)).unwrap();

        session.set_filter(FilterState::default().with_actor("10.0.0.1"));

        assert!(session.view().is_empty());
        assert_eq!(session.projection().remote_page, None);
    }

    #[test]
    fn should_ignore_stale_search_response() {
        let session = session();
        session.set_search_mode(SearchMode::Remote);
        let older = session.begin_request();
        let newer = session.begin_request();

        assert!(session.apply_search_results(newer, 2, page(10)).unwrap());
        assert!(!session.apply_search_results(older, 1, page(99)).unwrap());

        assert_eq!(session.projection().remote_page, Some(2));
    }

    #[test]
    fn should_discard_results_requested_under_previous_filter() {
        let session = seeded_session();
        session.set_search_mode(SearchMode::Remote);
        session.set_filter(FilterState::default().with_actor("10.0.0.1"));
        let in_flight = session.begin_request();

        session.set_filter(FilterState::default().with_actor("192.168"));

        assert!(!session.apply_search_results(in_flight, 1, page(1)).unwrap());
        assert!(session.view().is_empty());
        assert_eq!(session.projection().remote_page, None);

        let fresh = session.begin_request();
        assert!(session.apply_search_results(fresh, 1, page(1)).unwrap());
    }

    #[test]
    fn should_discard_results_requested_before_mode_round_trip() {
        let session = seeded_session();
        session.set_search_mode(SearchMode::Remote);
        let in_flight = session.begin_request();

        session.set_search_mode(SearchMode::Local);
        session.set_search_mode(SearchMode::Remote);

        assert!(!session.apply_search_results(in_flight, 1, page(1)).unwrap());
        assert_eq!(session.projection().remote_page, None);
    }

    #[test]
    fn should_return_to_local_view_when_switching_back() {
        let session = seeded_session();
        session.set_search_mode(SearchMode::Remote);
        assert!(session.view().is_empty());

        session.set_search_mode(SearchMode::Local);

        assert_eq!(session.view().len(), 5);
    }
}

mod projection_publishing {
    use super::*;

    #[tokio::test]
    async fn should_notify_subscribers_of_each_change() {
        let session = session();
        let mut projections = session.subscribe();

        session.admit_streamed(events::failed_login_from("10.0.0.1", 1));

        projections.changed().await.unwrap();
        let projection = projections.borrow_and_update().clone();
        assert_eq!(projection.events.len(), 1);
        assert_eq!(projection.metrics.failed_count, 1);
    }
}
