//! Push Stream Subscription
//!
//! Keeps a websocket connection to the server open and turns its frames
//! into notifications. A failed or dropped connection is retried after a
//! fixed delay; once `max_retries` consecutive retries have failed the
//! subscriber reports [`SiemError::StreamExhausted`] and stops. A
//! successful connection restores the full retry budget.

use super::{StreamConnection, StreamConnector};
use crate::configuration::Configuration;
use crate::errors::{ChannelKind, Result, SiemError};
use crate::event_processing::{EventParser, StreamMessage};
use crate::metrics::ServerStats;
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use siem_lite_common::LogEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Disconnected => "disconnected",
            StreamState::Connecting => "connecting",
            StreamState::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, StreamState::Connected)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotification {
    State(StreamState),
    Event(LogEvent),
    Stats(ServerStats),
    Alert(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            max_retries: config.stream.max_retries,
            delay: config.retry_delay(),
        }
    }

    /// Connection attempts made before giving up, counting the first one.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct StreamSubscriber {
    connector: Arc<dyn StreamConnector>,
    policy: RetryPolicy,
}

impl StreamSubscriber {
    pub fn new(connector: Arc<dyn StreamConnector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Connect and relay notifications until the retry budget is spent.
    ///
    /// Only returns after giving up; the returned error is always
    /// [`SiemError::StreamExhausted`].
    pub async fn run<F>(&self, mut notify: F) -> SiemError
    where
        F: FnMut(StreamNotification) + Send,
    {
        let mut failures: u32 = 0;
        let mut attempts: u32 = 0;

        loop {
            notify(StreamNotification::State(StreamState::Connecting));
            attempts += 1;

            match self.connector.connect().await {
                Ok(mut connection) => {
                    info!("Stream connected");
                    failures = 0;
                    attempts = 0;
                    notify(StreamNotification::State(StreamState::Connected));

                    Self::relay(connection.as_mut(), &mut notify).await;
                    connection.close().await;

                    warn!("Stream connection dropped");
                    notify(StreamNotification::State(StreamState::Disconnected));
                }
                Err(e) => {
                    warn!("Stream connection attempt {} failed: {}", attempts, e);
                }
            }

            if failures >= self.policy.max_retries {
                let exhausted = SiemError::StreamExhausted { attempts };
                warn!("{}", exhausted);
                notify(StreamNotification::State(StreamState::Disconnected));
                return exhausted;
            }

            failures += 1;
            debug!(
                "Retrying stream in {:?} ({}/{})",
                self.policy.delay, failures, self.policy.max_retries
            );
            tokio::time::sleep(self.policy.delay).await;
        }
    }

    async fn relay<F>(connection: &mut dyn StreamConnection, notify: &mut F)
    where
        F: FnMut(StreamNotification) + Send,
    {
        while let Some(message) = connection.next_message().await {
            match message {
                Ok(StreamMessage::NewLog(event)) => notify(StreamNotification::Event(event)),
                Ok(StreamMessage::StatsUpdate(stats)) => notify(StreamNotification::Stats(stats)),
                Ok(StreamMessage::NewAlert(alert)) => notify(StreamNotification::Alert(alert)),
                Ok(StreamMessage::ConnectionStatus { connected }) => {
                    debug!("Server reports connection status: {}", connected);
                }
                Ok(StreamMessage::Unknown(_)) => {}
                Err(e) if e.is_transport() => {
                    warn!("Stream read failed: {}", e);
                    break;
                }
                Err(e) => warn!("Dropping stream frame: {}", e),
            }
        }
    }
}

/// Connects to the server's websocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &Configuration) -> Result<Self> {
        Ok(Self::new(config.stream_url()?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>> {
        debug!("Connecting to {}", self.url);
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SiemError::transport(ChannelKind::Stream, e))?;
        Ok(Box::new(WebSocketConnection { socket }))
    }
}

struct WebSocketConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for WebSocketConnection {
    async fn next_message(&mut self) -> Option<Result<StreamMessage>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(EventParser::parse_stream_frame(&text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(EventParser::parse_stream_frame(&text)),
                    Err(e) => return Some(Err(SiemError::decode(ChannelKind::Stream, e))),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(SiemError::transport(ChannelKind::Stream, e))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!("Stream close: {}", e);
        }
    }
}
