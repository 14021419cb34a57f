use thiserror::Error;

/// Failure reported by a serial link or power/reset collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Transport disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a new bus error.
    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus(message.into())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Registration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Device identity pool exhausted (maximum {max} devices)")]
    ResourceExhausted { max: usize },

    // Hardware errors
    #[error("Transport failure during {context}: {source}")]
    TransportFailure {
        context: String,
        #[source]
        source: TransportError,
    },

    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    // Data plane errors
    #[error("Operation would block")]
    WouldBlock,

    #[error("Wait interrupted")]
    Interrupted,

    #[error("Device not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Create a new invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Create a new transport failure with the operation that failed.
    pub fn transport(context: impl Into<String>, source: TransportError) -> Self {
        Self::TransportFailure {
            context: context.into(),
            source,
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new not found error.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound(device.into())
    }

    /// `true` for the expected non-blocking control-flow signal.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// `true` when a wait was cancelled by its owner.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
