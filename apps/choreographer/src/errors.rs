use thiserror::Error;

/// Library-level error type.
///
/// Every failure here is a misconfiguration caught once, at construction or
/// when the phase loop is first scheduled. Nothing in the choreographer fails
/// transiently, so there is no retry story.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChoreographerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No Tokio runtime available to schedule the phase loop")]
    NoRuntime,
}

impl ChoreographerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ChoreographerError::InvalidConfiguration(msg.into())
    }
}
