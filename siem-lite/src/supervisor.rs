//! Connectivity Supervisor
//!
//! Drives the session from the outside world: periodic snapshot and
//! health checks, the push stream with its retry budget, and backfill
//! after the stream comes back. Background failures only change state
//! flags and get logged; user-initiated calls return their errors.

use crate::channel::{
    ApiClient, HealthSource, Observers, RemoteSearch, RetryPolicy, SnapshotSource,
    StreamConnector, StreamNotification, StreamState, StreamSubscriber, WebSocketConnector,
};
use crate::configuration::Configuration;
use crate::errors::{Result, SiemError};
use crate::event_processing::{AdmissionOutcome, DashboardSession};
use crate::filter::{FilterEngine, SearchMode, SearchQuery};
use crate::metrics::ServerStats;
use log::{debug, info, warn};
use siem_lite_common::LogEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The collaborators the supervisor talks to.
#[derive(Clone)]
pub struct ChannelSet {
    pub snapshot: Arc<dyn SnapshotSource>,
    pub health: Arc<dyn HealthSource>,
    pub search: Arc<dyn RemoteSearch>,
    pub stream: Arc<dyn StreamConnector>,
}

impl ChannelSet {
    /// HTTP endpoints plus the websocket stream, all from `config`.
    pub fn http(config: &Configuration) -> Result<Self> {
        let api = Arc::new(ApiClient::new(config)?);
        let stream = Arc::new(WebSocketConnector::from_config(config)?);
        Ok(Self {
            snapshot: api.clone(),
            health: api.clone(),
            search: api,
            stream,
        })
    }
}

/// Callback registries for stream traffic. Event observers only hear
/// about pushed events that made it into the buffer.
#[derive(Default)]
pub struct StreamObservers {
    pub events: Observers<LogEvent>,
    pub connectivity: Observers<StreamState>,
    pub stats: Observers<ServerStats>,
    pub alerts: Observers<serde_json::Value>,
}

impl StreamObservers {
    fn clear(&self) {
        self.events.clear();
        self.connectivity.clear();
        self.stats.clear();
        self.alerts.clear();
    }
}

pub struct ConnectivitySupervisor {
    config: Arc<Configuration>,
    session: Arc<DashboardSession>,
    channels: ChannelSet,
    observers: Arc<StreamObservers>,
    stream_state: Arc<watch::Sender<StreamState>>,
    healthy: Arc<watch::Sender<bool>>,
    backfill: Arc<Notify>,
    has_connected: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    disposed: bool,
    tasks: Vec<JoinHandle<()>>,
    stream_task: Option<JoinHandle<()>>,
}

impl ConnectivitySupervisor {
    pub fn new(
        config: Arc<Configuration>,
        session: Arc<DashboardSession>,
        channels: ChannelSet,
    ) -> Self {
        let (stream_state, _) = watch::channel(StreamState::Disconnected);
        let (healthy, _) = watch::channel(false);

        Self {
            config,
            session,
            channels,
            observers: Arc::new(StreamObservers::default()),
            stream_state: Arc::new(stream_state),
            healthy: Arc::new(healthy),
            backfill: Arc::new(Notify::new()),
            has_connected: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            disposed: false,
            tasks: Vec::new(),
            stream_task: None,
        }
    }

    /// Start the snapshot timer, the health timer and the stream.
    /// Both timers fire immediately, then on their configured intervals.
    pub fn start(&mut self) -> Result<()> {
        if self.disposed {
            return Err(SiemError::Disposed);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(SiemError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        self.tasks.push(tokio::spawn(Self::snapshot_loop(
            self.session.clone(),
            self.channels.snapshot.clone(),
            self.config.snapshot_interval(),
            self.backfill.clone(),
        )));
        self.tasks.push(tokio::spawn(Self::health_loop(
            self.channels.health.clone(),
            self.config.health_interval(),
            self.healthy.clone(),
        )));
        self.spawn_stream();

        info!(
            "Supervisor started: snapshot every {:?}, health every {:?}",
            self.config.snapshot_interval(),
            self.config.health_interval()
        );
        Ok(())
    }

    /// User-initiated snapshot fetch. Errors are returned, not swallowed.
    /// `None` means a newer snapshot landed first.
    pub async fn refresh(&self) -> Result<Option<AdmissionOutcome>> {
        if self.disposed {
            return Err(SiemError::Disposed);
        }
        fetch_snapshot(&self.session, self.channels.snapshot.as_ref()).await
    }

    /// Run the current filter against the search endpoint and show the
    /// result. Only valid in remote search mode.
    pub async fn search(&self, page: u32, limit: u32) -> Result<bool> {
        if self.disposed {
            return Err(SiemError::Disposed);
        }
        if self.session.search_mode() != SearchMode::Remote {
            return Err(SiemError::SearchModeMismatch);
        }

        let query = SearchQuery::new(self.session.filter())
            .with_page(page)
            .with_limit(limit);
        let ticket = self.session.begin_request();
        let results = FilterEngine::search_remote(self.channels.search.as_ref(), &query).await?;
        self.session.apply_search_results(ticket, query.page, results)
    }

    /// One-off health probe; also updates the health flag.
    pub async fn check_health(&self) -> bool {
        let healthy = probe_health(self.channels.health.as_ref()).await;
        set_if_changed(&self.healthy, healthy);
        healthy
    }

    /// Drop the current stream task and start over with a full retry budget.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.disposed {
            return Err(SiemError::Disposed);
        }
        info!("Reconnecting stream");
        self.stop_stream();
        self.spawn_stream();
        Ok(())
    }

    /// Stop every timer and the stream. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("Disposing supervisor");
        self.running.store(false, Ordering::SeqCst);

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.stop_stream();
        self.observers.clear();
        self.disposed = true;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> &Arc<DashboardSession> {
        &self.session
    }

    pub fn observers(&self) -> &StreamObservers {
        &self.observers
    }

    pub fn stream_state(&self) -> watch::Receiver<StreamState> {
        self.stream_state.subscribe()
    }

    pub fn health(&self) -> watch::Receiver<bool> {
        self.healthy.subscribe()
    }

    fn stop_stream(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        if set_if_changed(&self.stream_state, StreamState::Disconnected) {
            self.observers.connectivity.notify(&StreamState::Disconnected);
        }
    }

    fn spawn_stream(&mut self) {
        let subscriber = StreamSubscriber::new(
            self.channels.stream.clone(),
            RetryPolicy::from_config(&self.config),
        );
        let session = self.session.clone();
        let observers = self.observers.clone();
        let stream_state = self.stream_state.clone();
        let backfill = self.backfill.clone();
        let has_connected = self.has_connected.clone();
        let backfill_on_reconnect = self.config.stream.backfill_on_reconnect;

        let task = tokio::spawn(async move {
            let exhausted = subscriber
                .run(move |notification| match notification {
                    StreamNotification::State(state) => {
                        if state == StreamState::Connected
                            && has_connected.swap(true, Ordering::SeqCst)
                            && backfill_on_reconnect
                        {
                            debug!("Requesting backfill after reconnect");
                            backfill.notify_one();
                        }
                        if set_if_changed(&stream_state, state) {
                            observers.connectivity.notify(&state);
                        }
                    }
                    StreamNotification::Event(event) => {
                        if session.admit_streamed(event.clone()).changed() {
                            observers.events.notify(&event);
                        }
                    }
                    StreamNotification::Stats(stats) => {
                        session.apply_server_stats(stats.clone());
                        observers.stats.notify(&stats);
                    }
                    StreamNotification::Alert(alert) => observers.alerts.notify(&alert),
                })
                .await;
            warn!("Stream stopped: {}. Waiting for manual reconnect", exhausted);
        });
        self.stream_task = Some(task);
    }

    async fn snapshot_loop(
        session: Arc<DashboardSession>,
        source: Arc<dyn SnapshotSource>,
        every: Duration,
        backfill: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = backfill.notified() => info!("Backfilling snapshot after stream reconnect"),
            }

            if let Err(e) = fetch_snapshot(&session, source.as_ref()).await {
                warn!("Snapshot refresh failed: {}", e);
            }
        }
    }

    async fn health_loop(
        source: Arc<dyn HealthSource>,
        every: Duration,
        healthy: Arc<watch::Sender<bool>>,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now_healthy = probe_health(source.as_ref()).await;
            if set_if_changed(&healthy, now_healthy) {
                info!("Backend health: {}", if now_healthy { "up" } else { "down" });
            }
        }
    }
}

impl Drop for ConnectivitySupervisor {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn fetch_snapshot(
    session: &DashboardSession,
    source: &dyn SnapshotSource,
) -> Result<Option<AdmissionOutcome>> {
    let ticket = session.begin_request();
    let page = source.fetch_latest().await?;
    Ok(session.admit_snapshot(ticket, page.events))
}

async fn probe_health(source: &dyn HealthSource) -> bool {
    match source.check_health().await {
        Ok(status) => status.healthy,
        Err(e) => {
            warn!("Health check failed: {}", e);
            false
        }
    }
}

fn set_if_changed<T: PartialEq>(sender: &watch::Sender<T>, value: T) -> bool {
    sender.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}
