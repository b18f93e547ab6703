//! Application-wide error types.

use std::fmt;

use thiserror::Error;

use crate::notification::channels::ChannelKind;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Transient delivery failure: {0}")]
    Transient(String),

    #[error("Permanent delivery failure: status={status} body={body}")]
    Permanent { status: u16, body: String },

    #[error("Deadline exceeded")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{channel} channel failed: {source}")]
    Channel {
        channel: ChannelKind,
        #[source]
        source: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure classification used by delivery outcomes and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    UnknownEventKind,
    Transient,
    Permanent,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnknownEventKind => "unknown_event_kind",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Attribute this error to the channel that produced it.
    pub fn in_channel(self, channel: ChannelKind) -> Self {
        Self::Channel {
            channel,
            source: Box::new(self),
        }
    }

    /// Classify the error. Channel-attributed errors report the kind of their source.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UnknownEventKind(_) => ErrorKind::UnknownEventKind,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Permanent { .. } => ErrorKind::Permanent,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Channel { source, .. } => source.kind(),
            Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Http(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// The channel this error is attributed to, if any.
    pub fn channel(&self) -> Option<ChannelKind> {
        match self {
            Self::Channel { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}
