//! Speakers: the participants of a conversation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  id::{ModelId, SpeakerId},
  model::Json,
};

/// A participant backed by a [`Model`](crate::model::Model).
///
/// `tools` is derived from the `speakers_tools` association at read time. It
/// is never part of the persisted row and upserts ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Speaker {
  pub id:       SpeakerId,
  pub created:  DateTime<Utc>,
  pub updated:  DateTime<Utc>,
  pub model_id: ModelId,
  pub name:     String,
  pub system:   String,
  pub config:   Json,
  /// Tool names, kept sorted.
  pub tools:    BTreeSet<String>,
}

impl Speaker {
  /// A speaker that does not exist yet; the store assigns the id.
  pub fn new(
    model_id: impl Into<ModelId>,
    name: impl Into<String>,
    system: impl Into<String>,
    config: impl Into<Json>,
  ) -> Self {
    Self {
      model_id: model_id.into(),
      name: name.into(),
      system: system.into(),
      config: config.into(),
      ..Self::default()
    }
  }
}
