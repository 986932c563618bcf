//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC with
//! microsecond precision. Config columns hold raw JSON text.

use chrono::{DateTime, SecondsFormat, Utc};
use parlor_core::{
  conversation::{Conversation, Turn},
  model::{Json, Model, Provider},
  speaker::Speaker,
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── Column lists ────────────────────────────────────────────────────────────

pub const MODEL_COLUMNS: &str = "id, created, updated, provider, name, config";

pub const SPEAKER_COLUMNS: &str = "id, created, updated, model_id, name, system, config";

pub const CONVERSATION_COLUMNS: &str = "id, created, updated, topic";

pub const TURN_COLUMNS: &str = "id, created, updated, conversation_id, speaker_id, content";

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

// ─── Provider ────────────────────────────────────────────────────────────────

pub fn decode_provider(s: &str) -> Result<Provider> {
  s.parse().map_err(|e| Error::Decode(format!("{e}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `models` row.
pub struct RawModel {
  pub id:       String,
  pub created:  String,
  pub updated:  String,
  pub provider: String,
  pub name:     String,
  pub config:   String,
}

impl RawModel {
  /// Expects the columns in [`MODEL_COLUMNS`] order.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:       row.get(0)?,
      created:  row.get(1)?,
      updated:  row.get(2)?,
      provider: row.get(3)?,
      name:     row.get(4)?,
      config:   row.get(5)?,
    })
  }

  pub fn into_model(self) -> Result<Model> {
    Ok(Model {
      id:       self.id.into(),
      created:  decode_dt(&self.created)?,
      updated:  decode_dt(&self.updated)?,
      provider: decode_provider(&self.provider)?,
      name:     self.name,
      config:   Json::new(self.config),
    })
  }
}

/// Raw strings read directly from a `speakers` row. Tools come separately.
pub struct RawSpeaker {
  pub id:       String,
  pub created:  String,
  pub updated:  String,
  pub model_id: String,
  pub name:     String,
  pub system:   String,
  pub config:   String,
}

impl RawSpeaker {
  /// Expects the columns in [`SPEAKER_COLUMNS`] order.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:       row.get(0)?,
      created:  row.get(1)?,
      updated:  row.get(2)?,
      model_id: row.get(3)?,
      name:     row.get(4)?,
      system:   row.get(5)?,
      config:   row.get(6)?,
    })
  }

  pub fn into_speaker(self) -> Result<Speaker> {
    Ok(Speaker {
      id:       self.id.into(),
      created:  decode_dt(&self.created)?,
      updated:  decode_dt(&self.updated)?,
      model_id: self.model_id.into(),
      name:     self.name,
      system:   self.system,
      config:   Json::new(self.config),
      tools:    Default::default(),
    })
  }
}

/// Raw strings read directly from a `conversations` row.
pub struct RawConversation {
  pub id:      String,
  pub created: String,
  pub updated: String,
  pub topic:   String,
}

impl RawConversation {
  /// Expects the columns in [`CONVERSATION_COLUMNS`] order.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:      row.get(0)?,
      created: row.get(1)?,
      updated: row.get(2)?,
      topic:   row.get(3)?,
    })
  }

  pub fn into_conversation(self) -> Result<Conversation> {
    Ok(Conversation {
      id:      self.id.into(),
      created: decode_dt(&self.created)?,
      updated: decode_dt(&self.updated)?,
      topic:   self.topic,
    })
  }
}

/// Raw strings read directly from a `turns` row.
pub struct RawTurn {
  pub id:              String,
  pub created:         String,
  pub updated:         String,
  pub conversation_id: String,
  pub speaker_id:      String,
  pub content:         String,
}

impl RawTurn {
  /// Expects the columns in [`TURN_COLUMNS`] order.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      created:         row.get(1)?,
      updated:         row.get(2)?,
      conversation_id: row.get(3)?,
      speaker_id:      row.get(4)?,
      content:         row.get(5)?,
    })
  }

  pub fn into_turn(self) -> Result<Turn> {
    Ok(Turn {
      id:              self.id.into(),
      created:         decode_dt(&self.created)?,
      updated:         decode_dt(&self.updated)?,
      conversation_id: self.conversation_id.into(),
      speaker_id:      self.speaker_id.into(),
      content:         self.content,
    })
  }
}
