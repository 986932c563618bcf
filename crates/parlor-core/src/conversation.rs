//! Conversations, turns, and the assembled conversation document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  id::{ConversationId, SpeakerId, TurnId},
  speaker::Speaker,
};

/// Conversations are created outside this crate; the store only reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
  pub id:      ConversationId,
  pub created: DateTime<Utc>,
  pub updated: DateTime<Utc>,
  pub topic:   String,
}

/// One message by one speaker in one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Turn {
  pub id:              TurnId,
  pub created:         DateTime<Utc>,
  pub updated:         DateTime<Utc>,
  pub conversation_id: ConversationId,
  pub speaker_id:      SpeakerId,
  pub content:         String,
}

impl Turn {
  /// A turn that does not exist yet; the store assigns the id.
  pub fn new(
    conversation_id: impl Into<ConversationId>,
    speaker_id: impl Into<SpeakerId>,
    content: impl Into<String>,
  ) -> Self {
    Self {
      conversation_id: conversation_id.into(),
      speaker_id: speaker_id.into(),
      content: content.into(),
      ..Self::default()
    }
  }
}

/// A conversation with its turns in creation order and exactly the speakers
/// those turns reference.
///
/// Never stored; always read as one consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDocument {
  pub conversation: Conversation,
  pub turns:        Vec<Turn>,
  pub speakers:     HashMap<SpeakerId, Speaker>,
}

impl ConversationDocument {
  pub fn speaker_of(&self, turn: &Turn) -> Option<&Speaker> {
    self.speakers.get(&turn.speaker_id)
  }
}
