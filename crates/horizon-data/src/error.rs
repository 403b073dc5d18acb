//! Error types for data providers.

/// Result type alias for data provider operations.
pub type DataResult<T> = std::result::Result<T, DataError>;

/// Errors surfaced by data providers and their decorators.
///
/// Decorators never wrap or retry a wrapped provider's error; it reaches the
/// consumer exactly as the raw provider produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    /// The underlying source failed to produce data.
    #[error("Fetch failed: {message}")]
    Fetch { message: String },

    /// The fetch was cancelled through its abort signal.
    #[error("Fetch aborted: {reason}")]
    Aborted { reason: String },

    /// The fetch parameters cannot be honoured.
    #[error("Invalid fetch parameters: {0}")]
    InvalidParameters(String),

    /// Provider configuration could not be read.
    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl DataError {
    /// Create a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Create an abort error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted { reason: reason.into() }
    }

    /// Whether this error is the result of an abort.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl From<toml::de::Error> for DataError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DataError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<regex::Error> for DataError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidParameters(err.to_string())
    }
}
