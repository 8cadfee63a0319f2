//! Error types surfaced by the chat engine.
//!
//! Only configuration, provider and caller-input failures unwind to the caller. Failures
//! inside registered functions are turned into conversation content by the
//! dispatcher and never show up here.

use thiserror::Error;

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing credential, unsupported provider id, or an unreadable config.
    #[error("{0}")]
    Configuration(String),

    /// The upstream API failed, timed out, or answered with something unusable.
    #[error("{message}")]
    Provider {
        provider: &'static str,
        /// HTTP status, when the exchange got far enough to have one.
        status: Option<u16>,
        message: String,
    },

    /// A caller-supplied message that cannot be stored, such as an unknown role.
    #[error("{0}")]
    InvalidMessage(String),

    #[error("Function calling did not settle after {0} iterations")]
    MaxIterationsExceeded(u32),
}

impl ChatError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn provider(provider: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            status,
            message: message.into(),
        }
    }

    /// Upstream HTTP status, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
