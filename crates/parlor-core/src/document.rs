//! Conversation document assembly.

use std::collections::HashMap;

use crate::{
  Error,
  conversation::ConversationDocument,
  id::ConversationId,
  port::StoreTx,
};

/// Read a conversation, its turns oldest first, and every speaker those turns
/// reference.
///
/// Each distinct speaker is fetched once; later turns by the same speaker hit
/// the map instead of the store. Run inside one transaction for a consistent
/// snapshot.
pub fn assemble<T: StoreTx>(
  tx: &T,
  id: &ConversationId,
) -> Result<ConversationDocument, T::Error> {
  let conversation = tx.get_conversation(id)?.ok_or(Error::ConversationNotFound)?;
  let turns = tx.list_turns(id)?;

  let mut speakers = HashMap::new();
  for turn in &turns {
    if speakers.contains_key(&turn.speaker_id) {
      continue;
    }
    let mut speaker = tx
      .get_speaker(&turn.speaker_id)?
      .ok_or(Error::SpeakerNotFound)?;
    speaker.tools = tx.speaker_tools(&speaker.id)?;
    speakers.insert(speaker.id.clone(), speaker);
  }

  Ok(ConversationDocument { conversation, turns, speakers })
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;
  use crate::{conversation::Turn, id::SpeakerId, testing::MemTx, upsert::save_turn};

  #[test]
  fn unknown_conversation() {
    let tx = MemTx::seeded();
    let err = assemble(&tx, &ConversationId::from("co_missing")).unwrap_err();
    assert_eq!(err, Error::ConversationNotFound);
  }

  #[test]
  fn empty_conversation_has_no_speakers() {
    let tx = MemTx::seeded();
    let doc = assemble(&tx, &ConversationId::from("co_1")).unwrap();
    assert!(doc.turns.is_empty());
    assert!(doc.speakers.is_empty());
  }

  #[test]
  fn speakers_are_fetched_once_and_match_turns_exactly() {
    let tx = MemTx::seeded();
    for (speaker, content) in [("sp_1", "a"), ("sp_2", "b"), ("sp_1", "c"), ("sp_1", "d")] {
      save_turn(&tx, &Turn::new("co_1", speaker, content)).unwrap();
    }
    tx.assign_tool(&"sp_2".into(), "save_name");
    tx.clear_calls();

    let doc = assemble(&tx, &ConversationId::from("co_1")).unwrap();

    let contents: Vec<_> = doc.turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["a", "b", "c", "d"]);

    let keys: HashSet<_> = doc.speakers.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, HashSet::from(["sp_1", "sp_2"]));
    assert!(doc.speakers[&SpeakerId::from("sp_2")].tools.contains("save_name"));

    let fetches = tx.calls().iter().filter(|c| **c == "get_speaker").count();
    assert_eq!(fetches, 2);
  }
}
