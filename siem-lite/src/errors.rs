//! Error types for siem-lite
//!
//! Transport failures, degraded event admissions and an exhausted stream
//! retry budget are kept distinct so callers can decide which ones to
//! surface and which to fold into a state flag.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiemError {
    #[error("{channel} transport failed: {message}")]
    Transport {
        channel: ChannelKind,
        message: String,
    },

    #[error("Malformed event field {field}: {value}")]
    MalformedEvent { field: String, value: String },

    #[error("Stream gave up after {attempts} connection attempts")]
    StreamExhausted { attempts: u32 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Upload rejected for {path}: {reason}")]
    InvalidUpload { path: String, reason: String },

    #[error("Failed to decode {channel} payload: {message}")]
    Decode {
        channel: ChannelKind,
        message: String,
    },

    #[error("Remote search is not active in the current search mode")]
    SearchModeMismatch,

    #[error("Supervisor is already running")]
    AlreadyRunning,

    #[error("Supervisor has been disposed")]
    Disposed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SiemError {
    pub fn transport(channel: ChannelKind, message: impl std::fmt::Display) -> Self {
        SiemError::Transport {
            channel,
            message: message.to_string(),
        }
    }

    pub fn decode(channel: ChannelKind, message: impl std::fmt::Display) -> Self {
        SiemError::Decode {
            channel,
            message: message.to_string(),
        }
    }

    /// True for failures of the network path itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, SiemError::Transport { .. })
    }
}

/// The collaborator channels the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Snapshot,
    Stream,
    Health,
    Search,
    Upload,
}

impl ChannelKind {
    pub fn all() -> Vec<ChannelKind> {
        vec![
            Self::Snapshot,
            Self::Stream,
            Self::Health,
            Self::Search,
            Self::Upload,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Snapshot => "snapshot",
            ChannelKind::Stream => "stream",
            ChannelKind::Health => "health",
            ChannelKind::Search => "search",
            ChannelKind::Upload => "upload",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = SiemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ChannelKind::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SiemError::ConfigError {
                message: format!(
                    "Unknown channel: {}. Valid channels: {:?}",
                    s,
                    ChannelKind::all()
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                ),
            })
    }
}

pub type Result<T> = std::result::Result<T, SiemError>;
