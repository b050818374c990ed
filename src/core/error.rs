//! Error taxonomy of the chat core

use crate::infrastructure::entities::MissingAuthor;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store could not be reached or rejected the statement. Retryable.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("attachment service failed: {0}")]
    Attachments(#[source] anyhow::Error),
}

impl ChatError {
    pub fn not_a_member() -> ChatError {
        ChatError::Forbidden("caller is not an active member of this room".to_owned())
    }
}

impl From<MissingAuthor> for ChatError {
    fn from(_: MissingAuthor) -> Self {
        ChatError::InvalidArgument("a user message requires an author".to_owned())
    }
}
