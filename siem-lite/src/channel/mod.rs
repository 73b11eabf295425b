//! Collaborator Channels
//!
//! The session talks to the outside world through a handful of narrow
//! traits so the supervisor can be driven by the HTTP/websocket clients in
//! production and by in-memory fakes in tests.
//!
//! Key components:
//! - ApiClient: snapshot, health, remote search and upload over HTTP
//! - WebSocketConnector: push stream connection
//! - StreamSubscriber: connection loop with bounded retries
//! - Observers: cancellable callback registry

pub mod http_client;
pub mod observers;
pub mod stream_subscriber;

pub use http_client::{ApiClient, UploadFormat, UploadReceipt};
pub use observers::{Observers, Subscription};
pub use stream_subscriber::{
    RetryPolicy, StreamNotification, StreamState, StreamSubscriber, WebSocketConnector,
};

use crate::errors::Result;
use crate::event_processing::{HealthStatus, LogPage, StreamMessage};
use crate::filter::SearchQuery;
use async_trait::async_trait;
use std::path::Path;

/// Fetches the most recent window of events.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<LogPage>;
}

#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn check_health(&self) -> Result<HealthStatus>;
}

#[async_trait]
pub trait RemoteSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<LogPage>;
}

#[async_trait]
pub trait LogUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<UploadReceipt>;
}

/// Opens push stream connections.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>>;
}

/// One open push stream connection.
#[async_trait]
pub trait StreamConnection: Send {
    /// `None` once the connection has closed. Decode errors are per frame;
    /// transport errors end the connection.
    async fn next_message(&mut self) -> Option<Result<StreamMessage>>;

    async fn close(&mut self);
}
