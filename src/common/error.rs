use thiserror::Error;

/// Maelstrom error codes carried in `{"type":"error"}` bodies.
pub mod code {
    pub const NOT_SUPPORTED: u32 = 10;
    pub const MALFORMED_REQUEST: u32 = 12;
    pub const CRASH: u32 = 13;
}

/// Failure of a single outbound request. Never fatal to the node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("node runtime is closed")]
    Closed,

    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("remote error {code}: {text}")]
    Remote { code: u32, text: String },

    #[error("failed to encode request: {0}")]
    Encode(String),
}

/// Failure of an inbound request; turned into an error reply for that request only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("message type {0} not supported")]
    NotSupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn code(&self) -> u32 {
        match self {
            HandlerError::Malformed(_) => code::MALFORMED_REQUEST,
            HandlerError::NotSupported(_) => code::NOT_SUPPORTED,
            HandlerError::Internal(_) => code::CRASH,
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Malformed(err.to_string())
    }
}

/// Errors of the stdio node runtime itself.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node is already running")]
    AlreadyRunning,
}
