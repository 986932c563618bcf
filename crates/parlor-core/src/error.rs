//! Domain errors for `parlor-core`.

use thiserror::Error;

/// Expected business-rule violations.
///
/// Backends wrap these in their own error types; callers reach them through
/// [`DomainError`] so they can branch on not-found without knowing the
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
  #[error("conversation not found")]
  ConversationNotFound,

  #[error("speaker not found")]
  SpeakerNotFound,

  #[error("model not found")]
  ModelNotFound,
}

impl Error {
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::ConversationNotFound | Self::SpeakerNotFound | Self::ModelNotFound
    )
  }
}

/// Access to the domain error carried by a backend error, if any.
pub trait DomainError {
  fn domain(&self) -> Option<&Error>;
}

impl DomainError for Error {
  fn domain(&self) -> Option<&Error> { Some(self) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
