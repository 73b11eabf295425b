//! Dashboard Session
//!
//! Owns the reconciliation buffer and every piece of view state derived
//! from it. All mutations go through one lock, and each one publishes a
//! fresh [`DashboardProjection`] on a watch channel so readers never see
//! a half-applied merge.

use crate::configuration::Configuration;
use crate::errors::{Result, SiemError};
use crate::event_processing::{AdmissionOutcome, LogPage, ReconciliationBuffer};
use crate::filter::{FilterEngine, FilterOptions, FilterState, SearchMode};
use crate::metrics::{strategy_for, DashboardMetrics, MetricsSource, ServerStats};
use crate::severity_classifier::{KeywordSeverityClassifier, SeverityClassifier};
use log::{debug, info};
use parking_lot::Mutex;
use siem_lite_common::LogEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Sequence number handed out before a snapshot or search request.
/// Responses carrying an older ticket than the last applied one are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Everything a renderer needs, computed in one critical section.
#[derive(Debug, Clone)]
pub struct DashboardProjection {
    pub revision: u64,
    /// Buffered events, newest first.
    pub events: Vec<LogEvent>,
    /// Local filter result, or the current remote page in remote mode.
    pub view: Vec<LogEvent>,
    /// Length of `view` locally; server-reported total remotely.
    pub view_total: usize,
    pub metrics: DashboardMetrics,
    pub metrics_source: MetricsSource,
    pub filter: FilterState,
    pub mode: SearchMode,
    /// 1-based page of the remote results on display.
    pub remote_page: Option<u32>,
}

impl DashboardProjection {
    fn empty() -> Self {
        Self {
            revision: 0,
            events: Vec::new(),
            view: Vec::new(),
            view_total: 0,
            metrics: DashboardMetrics::default(),
            metrics_source: MetricsSource::Local,
            filter: FilterState::default(),
            mode: SearchMode::Local,
            remote_page: None,
        }
    }
}

#[derive(Debug, Clone)]
struct RemoteResults {
    page: u32,
    events: Vec<LogEvent>,
    total: usize,
}

struct SessionState {
    buffer: ReconciliationBuffer,
    filter: FilterState,
    mode: SearchMode,
    remote: Option<RemoteResults>,
    server_stats: Option<ServerStats>,
    last_snapshot: u64,
    last_search: u64,
    revision: u64,
}

pub struct DashboardSession {
    config: Arc<Configuration>,
    classifier: Box<dyn SeverityClassifier>,
    state: Mutex<SessionState>,
    next_ticket: AtomicU64,
    projection: watch::Sender<Arc<DashboardProjection>>,
}

impl DashboardSession {
    pub fn new(config: Arc<Configuration>) -> Self {
        let classifier = Box::new(KeywordSeverityClassifier::from_config(&config));
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(
        config: Arc<Configuration>,
        classifier: Box<dyn SeverityClassifier>,
    ) -> Self {
        let (projection, _) = watch::channel(Arc::new(DashboardProjection::empty()));
        let state = SessionState {
            buffer: ReconciliationBuffer::new(config.buffer_capacity()),
            filter: FilterState::default(),
            mode: SearchMode::Local,
            remote: None,
            server_stats: None,
            last_snapshot: 0,
            last_search: 0,
            revision: 0,
        };

        Self {
            config,
            classifier,
            state: Mutex::new(state),
            next_ticket: AtomicU64::new(0),
            projection,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Reserve a sequence number for an outgoing snapshot or search.
    pub fn begin_request(&self) -> RequestTicket {
        RequestTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Merge a snapshot page. Returns `None` when a newer snapshot has
    /// already been applied.
    pub fn admit_snapshot(
        &self,
        ticket: RequestTicket,
        events: Vec<LogEvent>,
    ) -> Option<AdmissionOutcome> {
        let mut state = self.state.lock();
        if ticket.0 <= state.last_snapshot {
            debug!(
                "Discarding stale snapshot #{} (last applied #{})",
                ticket.0, state.last_snapshot
            );
            return None;
        }
        state.last_snapshot = ticket.0;

        let events = self.classify_all(events);
        let outcome = state.buffer.admit_snapshot(events);
        self.publish(&mut state);
        Some(outcome)
    }

    pub fn admit_streamed(&self, mut event: LogEvent) -> AdmissionOutcome {
        self.classifier.resolve(&mut event);

        let mut state = self.state.lock();
        let outcome = state.buffer.admit_streamed(event);
        if outcome.changed() {
            self.publish(&mut state);
        }
        outcome
    }

    /// Record pushed statistics. An empty update never replaces earlier ones.
    pub fn apply_server_stats(&self, stats: ServerStats) {
        let mut state = self.state.lock();
        if stats.is_empty() && state.server_stats.is_some() {
            debug!("Ignoring empty stats_update");
            return;
        }
        state.server_stats = Some(stats);
        self.publish(&mut state);
    }

    /// Empty the buffer and forget server statistics. Requests issued
    /// before the reset are treated as stale.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let issued = self.next_ticket.load(Ordering::SeqCst);
        state.buffer.reset();
        state.server_stats = None;
        state.remote = None;
        state.last_snapshot = issued;
        state.last_search = issued;
        info!("Session reset");
        self.publish(&mut state);
    }

    pub fn set_filter(&self, filter: FilterState) {
        let mut state = self.state.lock();
        if state.filter == filter {
            return;
        }
        state.filter = filter;
        state.remote = None;
        state.last_search = self.next_ticket.load(Ordering::SeqCst);
        self.publish(&mut state);
    }

    pub fn clear_filters(&self) {
        self.set_filter(FilterState::default());
    }

    pub fn filter(&self) -> FilterState {
        self.state.lock().filter.clone()
    }

    pub fn set_search_mode(&self, mode: SearchMode) {
        let mut state = self.state.lock();
        if state.mode == mode {
            return;
        }
        debug!("Search mode: {} -> {}", state.mode.as_str(), mode.as_str());
        state.mode = mode;
        state.remote = None;
        state.last_search = self.next_ticket.load(Ordering::SeqCst);
        self.publish(&mut state);
    }

    pub fn search_mode(&self) -> SearchMode {
        self.state.lock().mode
    }

    /// Show a remote search page. Fails outside remote mode; returns
    /// `false` for a stale response.
    pub fn apply_search_results(
        &self,
        ticket: RequestTicket,
        page_number: u32,
        page: LogPage,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        if state.mode != SearchMode::Remote {
            return Err(SiemError::SearchModeMismatch);
        }
        if ticket.0 <= state.last_search {
            debug!("Discarding stale search response #{}", ticket.0);
            return Ok(false);
        }
        state.last_search = ticket.0;

        state.remote = Some(RemoteResults {
            page: page_number,
            events: self.classify_all(page.events),
            total: page.total,
        });
        self.publish(&mut state);
        Ok(true)
    }

    pub fn projection(&self) -> Arc<DashboardProjection> {
        self.projection.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardProjection>> {
        self.projection.subscribe()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.state.lock().buffer.events().to_vec()
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> DashboardMetrics {
        self.projection().metrics
    }

    pub fn view(&self) -> Vec<LogEvent> {
        self.projection().view.clone()
    }

    pub fn filter_options(&self) -> FilterOptions {
        let state = self.state.lock();
        FilterEngine::options(state.buffer.events(), &self.config)
    }

    fn classify_all(&self, mut events: Vec<LogEvent>) -> Vec<LogEvent> {
        for event in &mut events {
            self.classifier.resolve(event);
        }
        events
    }

    fn publish(&self, state: &mut SessionState) {
        state.revision += 1;

        let events = state.buffer.events();
        let strategy = strategy_for(state.server_stats.as_ref());
        let metrics = strategy.compute(events);

        let (view, view_total, remote_page) = match (state.mode, &state.remote) {
            (SearchMode::Local, _) => {
                let view = FilterEngine::apply(events, &state.filter);
                let total = view.len();
                (view, total, None)
            }
            (SearchMode::Remote, Some(remote)) => {
                (remote.events.clone(), remote.total, Some(remote.page))
            }
            (SearchMode::Remote, None) => (Vec::new(), 0, None),
        };

        let projection = DashboardProjection {
            revision: state.revision,
            events: events.to_vec(),
            view,
            view_total,
            metrics,
            metrics_source: strategy.source(),
            filter: state.filter.clone(),
            mode: state.mode,
            remote_page,
        };
        self.projection.send_replace(Arc::new(projection));
    }
}
