use serde::{
    Deserialize,
    Serialize,
};

/// Lifecycle of the link to the remote document.
///
/// `Connecting -> {Connected, TimedOut, Denied}`; any later delivery moves back
/// to `Connected`, so neither error state is final.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConnectionState {
    /// no subscription open
    #[default]
    Idle,
    Connecting,
    Connected,
    TimedOut,
    Denied { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection timed out before the first snapshot arrived")]
    Timeout,
    #[error("{0}")]
    Denied(String),
}

impl ConnectionState {
    pub fn error(&self) -> Option<ConnectionError> {
        match self {
            ConnectionState::TimedOut => Some(ConnectionError::Timeout),
            ConnectionState::Denied { message } => {
                Some(ConnectionError::Denied(message.clone()))
            }
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}
