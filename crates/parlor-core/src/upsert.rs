//! Transactional upsert of turns and speakers.
//!
//! Referential checks run inside the caller's transaction before the write,
//! in a fixed order, so the first missing reference decides the error.

use chrono::Utc;

use crate::{Error, conversation::Turn, port::StoreTx, speaker::Speaker};

/// Check a turn's references, then insert or overwrite it.
pub fn save_turn<T: StoreTx>(tx: &T, turn: &Turn) -> Result<Turn, T::Error> {
  if !tx.conversation_exists(&turn.conversation_id)? {
    return Err(Error::ConversationNotFound.into());
  }
  if !tx.speaker_exists(&turn.speaker_id)? {
    return Err(Error::SpeakerNotFound.into());
  }

  let now = Utc::now();
  if turn.id.is_empty() {
    tx.insert_turn(turn, now)
  } else {
    tx.upsert_turn(turn, now)
  }
}

/// Check a speaker's model, then insert or overwrite it.
///
/// `speaker.tools` is never written. The returned speaker carries the tools
/// already associated with the stored row.
pub fn save_speaker<T: StoreTx>(tx: &T, speaker: &Speaker) -> Result<Speaker, T::Error> {
  if !tx.model_exists(&speaker.model_id)? {
    return Err(Error::ModelNotFound.into());
  }

  let now = Utc::now();
  let mut saved = if speaker.id.is_empty() {
    tx.insert_speaker(speaker, now)?
  } else {
    tx.upsert_speaker(speaker, now)?
  };
  saved.tools = tx.speaker_tools(&saved.id)?;
  Ok(saved)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MemTx;

  #[test]
  fn new_turn_gets_prefixed_id_and_timestamps() {
    let tx = MemTx::seeded();
    let saved = save_turn(&tx, &Turn::new("co_1", "sp_1", "Hello")).unwrap();

    assert!(saved.id.has_prefix());
    assert_eq!(saved.content, "Hello");
    assert!(saved.created.timestamp() > 0);
    assert_eq!(saved.created, saved.updated);
  }

  #[test]
  fn existing_turn_is_overwritten_in_place() {
    let tx = MemTx::seeded();
    let mut saved = save_turn(&tx, &Turn::new("co_1", "sp_1", "first")).unwrap();
    let created = saved.created;

    saved.content = "second".into();
    let again = save_turn(&tx, &saved).unwrap();

    assert_eq!(again.id, saved.id);
    assert_eq!(again.content, "second");
    assert_eq!(again.created, created);
    assert_eq!(tx.turn_count(), 1);
  }

  #[test]
  fn missing_conversation_is_reported_before_missing_speaker() {
    let tx = MemTx::seeded();
    let err = save_turn(&tx, &Turn::new("co_missing", "sp_missing", "x")).unwrap_err();
    assert_eq!(err, Error::ConversationNotFound);
    assert_eq!(tx.calls(), ["conversation_exists"]);
    assert_eq!(tx.turn_count(), 0);
  }

  #[test]
  fn missing_speaker() {
    let tx = MemTx::seeded();
    let err = save_turn(&tx, &Turn::new("co_1", "sp_missing", "x")).unwrap_err();
    assert_eq!(err, Error::SpeakerNotFound);
    assert_eq!(tx.turn_count(), 0);
  }

  #[test]
  fn missing_model() {
    let tx = MemTx::seeded();
    let err = save_speaker(&tx, &Speaker::new("mo_missing", "Ghost", "", "{}")).unwrap_err();
    assert_eq!(err, Error::ModelNotFound);
    assert_eq!(tx.calls(), ["model_exists"]);
  }

  #[test]
  fn saved_speaker_ignores_input_tools_and_reports_stored_ones() {
    let tx = MemTx::seeded();
    let mut input = Speaker::new("mo_1", "Helper", "Be brief.", "{}");
    input.tools.insert("rm_rf".into());

    let saved = save_speaker(&tx, &input).unwrap();
    assert!(saved.tools.is_empty());

    tx.assign_tool(&saved.id, "save_name");
    let again = save_speaker(&tx, &saved).unwrap();
    assert_eq!(again.tools.iter().collect::<Vec<_>>(), ["save_name"]);
  }
}
