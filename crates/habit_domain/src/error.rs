use thiserror::Error;

pub type Result<T> = std::result::Result<T, HabitError>;

/// Failure modes of the habit API and the store operations wrapping it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HabitError {
    /// Input rejected before it reached the network.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("network request failed: {0}")]
    Network(String),

    #[error("habit `{id}` not found")]
    NotFound { id: String },

    /// Duplicate completion for the same habit and date. Adapters treat it
    /// as success, so the store never returns it.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("a completion toggle for habit `{id}` is already in progress")]
    ToggleInFlight { id: String },
}

impl HabitError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}
