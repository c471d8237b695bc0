/// Typed error hierarchy for chat-completion gateway calls.
///
/// Every variant is a transport failure from the turn's point of view: it
/// ends the turn and is surfaced in the message content. User cancellation
/// never travels through this type; the turn observes its token directly.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    /// Error object delivered inside the event stream after a 2xx response.
    #[error("{0}")]
    Provider(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Provider(_) => "provider",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
