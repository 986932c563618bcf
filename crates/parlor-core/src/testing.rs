//! In-memory [`StoreTx`] used by the algorithm tests.

use std::{
  cell::{Cell, RefCell},
  collections::{BTreeMap, BTreeSet, HashSet},
};

use chrono::{DateTime, Utc};

use crate::{
  Error,
  conversation::{Conversation, Turn},
  id::{ConversationId, ModelId, SpeakerId, TurnId},
  port::StoreTx,
  speaker::Speaker,
};

#[derive(Default)]
pub struct MemTx {
  models:        HashSet<ModelId>,
  conversations: RefCell<BTreeMap<ConversationId, Conversation>>,
  speakers:      RefCell<BTreeMap<SpeakerId, Speaker>>,
  turns:         RefCell<Vec<Turn>>,
  tools:         RefCell<BTreeMap<SpeakerId, BTreeSet<String>>>,
  next_id:       Cell<u32>,
  calls:         RefCell<Vec<&'static str>>,
}

impl MemTx {
  /// One model `mo_1`, one conversation `co_1`, speakers `sp_1` and `sp_2`.
  pub fn seeded() -> Self {
    let tx = Self::default();
    let mut models = HashSet::new();
    models.insert(ModelId::from("mo_1"));
    let tx = Self { models, ..tx };

    tx.conversations.borrow_mut().insert(
      "co_1".into(),
      Conversation { id: "co_1".into(), topic: "Demo".into(), ..Default::default() },
    );
    for id in ["sp_1", "sp_2"] {
      let mut speaker = Speaker::new("mo_1", id, "", "{}");
      speaker.id = id.into();
      tx.speakers.borrow_mut().insert(id.into(), speaker);
    }
    tx
  }

  pub fn assign_tool(&self, speaker: &SpeakerId, tool: &str) {
    self
      .tools
      .borrow_mut()
      .entry(speaker.clone())
      .or_default()
      .insert(tool.to_owned());
  }

  pub fn turn_count(&self) -> usize { self.turns.borrow().len() }

  pub fn calls(&self) -> Vec<&'static str> { self.calls.borrow().clone() }

  pub fn clear_calls(&self) { self.calls.borrow_mut().clear() }

  fn record(&self, call: &'static str) { self.calls.borrow_mut().push(call) }

  fn fresh_id(&self, prefix: &str) -> String {
    let n = self.next_id.get() + 1;
    self.next_id.set(n);
    format!("{prefix}{n:032x}")
  }
}

impl StoreTx for MemTx {
  type Error = Error;

  fn conversation_exists(&self, id: &ConversationId) -> Result<bool, Error> {
    self.record("conversation_exists");
    Ok(self.conversations.borrow().contains_key(id))
  }

  fn speaker_exists(&self, id: &SpeakerId) -> Result<bool, Error> {
    self.record("speaker_exists");
    Ok(self.speakers.borrow().contains_key(id))
  }

  fn model_exists(&self, id: &ModelId) -> Result<bool, Error> {
    self.record("model_exists");
    Ok(self.models.contains(id))
  }

  fn insert_turn(&self, turn: &Turn, now: DateTime<Utc>) -> Result<Turn, Error> {
    self.record("insert_turn");
    let stored = Turn {
      id: TurnId::from(self.fresh_id(TurnId::PREFIX)),
      created: now,
      updated: now,
      ..turn.clone()
    };
    self.turns.borrow_mut().push(stored.clone());
    Ok(stored)
  }

  fn upsert_turn(&self, turn: &Turn, now: DateTime<Utc>) -> Result<Turn, Error> {
    self.record("upsert_turn");
    let mut turns = self.turns.borrow_mut();
    if let Some(existing) = turns.iter_mut().find(|t| t.id == turn.id) {
      *existing = Turn { created: existing.created, updated: now, ..turn.clone() };
      return Ok(existing.clone());
    }
    let stored = Turn { created: now, updated: now, ..turn.clone() };
    turns.push(stored.clone());
    Ok(stored)
  }

  fn insert_speaker(&self, speaker: &Speaker, now: DateTime<Utc>) -> Result<Speaker, Error> {
    self.record("insert_speaker");
    let stored = Speaker {
      id: SpeakerId::from(self.fresh_id(SpeakerId::PREFIX)),
      created: now,
      updated: now,
      tools: BTreeSet::new(),
      ..speaker.clone()
    };
    self.speakers.borrow_mut().insert(stored.id.clone(), stored.clone());
    Ok(stored)
  }

  fn upsert_speaker(&self, speaker: &Speaker, now: DateTime<Utc>) -> Result<Speaker, Error> {
    self.record("upsert_speaker");
    let mut speakers = self.speakers.borrow_mut();
    let created = speakers.get(&speaker.id).map_or(now, |s| s.created);
    let stored = Speaker {
      created,
      updated: now,
      tools: BTreeSet::new(),
      ..speaker.clone()
    };
    speakers.insert(stored.id.clone(), stored.clone());
    Ok(stored)
  }

  fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, Error> {
    self.record("get_conversation");
    Ok(self.conversations.borrow().get(id).cloned())
  }

  fn list_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>, Error> {
    self.record("list_turns");
    Ok(
      self
        .turns
        .borrow()
        .iter()
        .filter(|t| &t.conversation_id == conversation_id)
        .cloned()
        .collect(),
    )
  }

  fn get_speaker(&self, id: &SpeakerId) -> Result<Option<Speaker>, Error> {
    self.record("get_speaker");
    Ok(self.speakers.borrow().get(id).cloned())
  }

  fn speaker_tools(&self, id: &SpeakerId) -> Result<BTreeSet<String>, Error> {
    self.record("speaker_tools");
    Ok(self.tools.borrow().get(id).cloned().unwrap_or_default())
  }
}
