//! Filtering and Search
//!
//! Local mode narrows the buffered events with a conjunction of the active
//! filters. Remote mode hands the same filters to the search endpoint and
//! shows whatever page comes back, never mixed with local results.

use crate::channel::RemoteSearch;
use crate::configuration::Configuration;
use crate::errors::Result;
use crate::event_processing::LogPage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use siem_lite_common::{LogEvent, Severity};
use std::collections::HashMap;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    /// Case-insensitive substring of the actor address.
    pub actor: Option<String>,
    /// Case-insensitive substring of the event type.
    pub event_type: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl FilterState {
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into()).filter(|a: &String| !a.is_empty());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn with_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn clear(&mut self) {
        *self = FilterState::default();
    }

    pub fn has_active_filters(&self) -> bool {
        self.actor.is_some() || self.event_type.is_some() || self.has_time_range()
    }

    pub fn has_time_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn matches(&self, event: &LogEvent) -> bool {
        if let Some(actor) = &self.actor {
            if !event
                .actor_address
                .to_lowercase()
                .contains(&actor.to_lowercase())
            {
                return false;
            }
        }

        if let Some(event_type) = &self.event_type {
            if !event
                .event_type
                .to_lowercase()
                .contains(&event_type.to_lowercase())
            {
                return false;
            }
        }

        if self.has_time_range() {
            let Some(at) = event.occurred_at() else {
                return false;
            };
            if self.from.is_some_and(|from| at < from) || self.to.is_some_and(|to| at > to) {
                return false;
            }
        }

        true
    }

    /// Query parameters for the remote search endpoint.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(actor) = &self.actor {
            pairs.push(("actor", actor.clone()));
        }
        if let Some(event_type) = &self.event_type {
            pairs.push(("eventType", event_type.clone()));
        }
        if let Some(from) = self.from {
            pairs.push(("from", from.to_rfc3339()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.to_rfc3339()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Local,
    Remote,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Local => "local",
            SearchMode::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub filter: FilterState,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(filter: FilterState) -> Self {
        Self {
            filter,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = self.filter.to_query_pairs();
        pairs.push(("page", self.page.to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorOption {
    pub actor: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTypeOption {
    pub event_type: String,
    pub count: usize,
    /// Highest severity seen for this type.
    pub severity: Severity,
    /// Whether the type is in the configured catalog.
    pub known: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub actors: Vec<ActorOption>,
    pub event_types: Vec<EventTypeOption>,
}

pub struct FilterEngine;

impl FilterEngine {
    /// Local view: every buffered event matching all active filters, in
    /// buffer order.
    pub fn apply(events: &[LogEvent], filter: &FilterState) -> Vec<LogEvent> {
        if !filter.has_active_filters() {
            return events.to_vec();
        }
        events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }

    /// Remote view: pass the query straight through to the server.
    pub async fn search_remote(source: &dyn RemoteSearch, query: &SearchQuery) -> Result<LogPage> {
        source.search(query).await
    }

    /// Distinct actors and event types with counts, most frequent first.
    pub fn options(events: &[LogEvent], config: &Configuration) -> FilterOptions {
        let mut actors: HashMap<&str, usize> = HashMap::new();
        let mut types: HashMap<&str, (usize, Severity)> = HashMap::new();

        for event in events {
            *actors.entry(event.actor_address.as_str()).or_default() += 1;

            let entry = types
                .entry(event.event_type.as_str())
                .or_insert((0, event.severity));
            entry.0 += 1;
            entry.1 = entry.1.max(event.severity);
        }

        let mut actors: Vec<ActorOption> = actors
            .into_iter()
            .map(|(actor, count)| ActorOption {
                actor: actor.to_string(),
                count,
            })
            .collect();
        actors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.actor.cmp(&b.actor)));

        let mut event_types: Vec<EventTypeOption> = types
            .into_iter()
            .filter(|(event_type, _)| !event_type.is_empty())
            .map(|(event_type, (count, severity))| EventTypeOption {
                event_type: event_type.to_string(),
                count,
                severity,
                known: config.is_known_event_type(event_type),
            })
            .collect();
        event_types.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.event_type.cmp(&b.event_type))
        });

        FilterOptions {
            actors,
            event_types,
        }
    }
}
