//! The storage port.
//!
//! [`StoreTx`] is the handful of primitives the upsert and assembly
//! algorithms need from an open transaction. Backends implement it over their
//! own transaction handle; the algorithms in [`crate::upsert`] and
//! [`crate::document`] never see the engine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::{
  conversation::{Conversation, Turn},
  id::{ConversationId, ModelId, SpeakerId},
  speaker::Speaker,
};

/// Statements available inside one open transaction.
///
/// Everything issued through one value of this type commits or rolls back
/// together; that guarantee belongs to whoever hands it out.
pub trait StoreTx {
  type Error: From<crate::Error>;

  // ── Existence predicates ──────────────────────────────────────────────

  fn conversation_exists(&self, id: &ConversationId) -> Result<bool, Self::Error>;

  fn speaker_exists(&self, id: &SpeakerId) -> Result<bool, Self::Error>;

  fn model_exists(&self, id: &ModelId) -> Result<bool, Self::Error>;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a turn, letting the store assign its id. Returns the stored row.
  fn insert_turn(&self, turn: &Turn, now: DateTime<Utc>) -> Result<Turn, Self::Error>;

  /// Insert a turn under `turn.id`, or overwrite every mutable field of the
  /// existing row. `created` survives an overwrite; `updated` becomes `now`.
  fn upsert_turn(&self, turn: &Turn, now: DateTime<Utc>) -> Result<Turn, Self::Error>;

  /// Insert a speaker row, letting the store assign its id. The returned
  /// speaker has no tools.
  fn insert_speaker(
    &self,
    speaker: &Speaker,
    now: DateTime<Utc>,
  ) -> Result<Speaker, Self::Error>;

  /// Insert-or-overwrite counterpart of [`StoreTx::insert_speaker`].
  fn upsert_speaker(
    &self,
    speaker: &Speaker,
    now: DateTime<Utc>,
  ) -> Result<Speaker, Self::Error>;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_conversation(
    &self,
    id: &ConversationId,
  ) -> Result<Option<Conversation>, Self::Error>;

  /// Turns of a conversation, oldest first.
  fn list_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>, Self::Error>;

  /// The speaker row alone; `tools` is left empty.
  fn get_speaker(&self, id: &SpeakerId) -> Result<Option<Speaker>, Self::Error>;

  fn speaker_tools(&self, id: &SpeakerId) -> Result<BTreeSet<String>, Self::Error>;
}
