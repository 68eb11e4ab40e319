//! Sink and setup errors.

use auditline_common_config::ConfigError;
use auditline_common_http::HttpError;
use thiserror::Error;

/// Kafka REST proxy error code for failures the broker expects to clear.
const RETRIABLE_BROKER_CODE: i32 = 2;

/// Failure writing one record to one sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("invalid sink endpoint '{endpoint}': {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("audit queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("audit queue is closed")]
    QueueClosed,

    #[error("broker rejected record (code {code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Whether a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_transient(),
            Self::QueueFull { .. } | Self::Unavailable(_) => true,
            Self::Rejected { code, .. } => *code == RETRIABLE_BROKER_CODE,
            Self::Serialize(_) | Self::Endpoint { .. } | Self::QueueClosed => false,
        }
    }
}

/// Failure building a dispatcher from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build sink client: {0}")]
    Client(#[from] HttpError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
