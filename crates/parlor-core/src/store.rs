//! The `ConversationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `parlor-store-sqlite`).
//! Higher layers (`parlor-api`, `parlor-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use serde::Deserialize;

use crate::{
  conversation::{Conversation, ConversationDocument, Turn},
  error::DomainError,
  id::{ConversationId, SpeakerId},
  speaker::Speaker,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`ConversationStore::get_speaker`].
///
/// A non-empty `id` always wins over `name`. Leaving both empty is a
/// programming error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GetSpeakerFilter {
  pub id:   SpeakerId,
  pub name: String,
}

impl GetSpeakerFilter {
  pub fn by_id(id: impl Into<SpeakerId>) -> Self {
    Self { id: id.into(), ..Self::default() }
  }

  pub fn by_name(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Parlor conversation store backend.
///
/// Every write runs as one atomic transaction: referential checks, the write
/// itself, and reading back the stored row either all happen or none do.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ConversationStore: Send + Sync {
  type Error: std::error::Error + DomainError + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert or overwrite a turn.
  ///
  /// An empty id inserts a new row with a store-assigned id. Fails with
  /// `ConversationNotFound` or `SpeakerNotFound` (checked in that order)
  /// without writing anything.
  fn save_turn(
    &self,
    turn: Turn,
  ) -> impl Future<Output = Result<Turn, Self::Error>> + Send + '_;

  /// Insert or overwrite a speaker. `tools` on the input is ignored; the
  /// returned speaker carries the tools currently associated with it.
  fn save_speaker(
    &self,
    speaker: Speaker,
  ) -> impl Future<Output = Result<Speaker, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Assemble a conversation with its ordered turns and their speakers from
  /// one consistent snapshot.
  fn get_conversation_document<'a>(
    &'a self,
    id: &'a ConversationId,
  ) -> impl Future<Output = Result<ConversationDocument, Self::Error>> + Send + 'a;

  /// All conversations, newest first.
  fn get_conversations(
    &self,
  ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>> + Send + '_;

  /// The most recently created conversation.
  fn get_latest_conversation(
    &self,
  ) -> impl Future<Output = Result<Conversation, Self::Error>> + Send + '_;

  /// All speakers ordered by name, each with its tools.
  fn get_speakers(
    &self,
  ) -> impl Future<Output = Result<Vec<Speaker>, Self::Error>> + Send + '_;

  /// One speaker by id or, failing that, by name.
  ///
  /// # Panics
  ///
  /// If neither `filter.id` nor `filter.name` is set.
  fn get_speaker(
    &self,
    filter: GetSpeakerFilter,
  ) -> impl Future<Output = Result<Speaker, Self::Error>> + Send + '_;
}
