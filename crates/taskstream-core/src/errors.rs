/// Failure of a single artifact lookup attempt.
///
/// Every variant is treated as "no artifacts this attempt" by the retrieval
/// loop; the distinction only matters for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// Network or connection failure.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Server answered with a non-success status.
    #[error("lookup failed with status {status}: {message}")]
    Status { status: u16, message: String },
    /// Response body did not have the expected shape.
    #[error("malformed lookup response: {message}")]
    Decode { message: String },
}

impl LookupError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// True when the failure was a malformed response rather than a network
    /// or server problem.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Short stable code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "lookup.transport",
            Self::Status { status, .. } if *status >= 500 => "lookup.server_error.5xx",
            Self::Status { .. } => "lookup.status",
            Self::Decode { .. } => "lookup.decode",
        }
    }
}

/// Top-level error type for the public engine API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Invalid engine or lookup configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty task id).
    #[error("validation error: {0}")]
    Validation(String),
    /// A task stream was opened outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl EngineError {
    pub(crate) fn config_msg(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
