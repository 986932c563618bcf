//! Prefixed identifiers.
//!
//! Every row id is an opaque string starting with a short tag naming its
//! table (`mo_`, `sp_`, `co_`, `tu_`). Ids are assigned by the storage schema
//! when a row is inserted with an empty id and never change afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! prefixed_id {
  ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      /// Tag that every id of this kind starts with.
      pub const PREFIX: &'static str = $prefix;

      pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

      /// An empty id asks the store to assign one on insert.
      pub fn is_empty(&self) -> bool { self.0.is_empty() }

      pub fn has_prefix(&self) -> bool { self.0.starts_with(Self::PREFIX) }

      pub fn as_str(&self) -> &str { &self.0 }

      pub fn into_inner(self) -> String { self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<String> for $name {
      fn from(s: String) -> Self { Self(s) }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self { Self(s.to_owned()) }
    }

    impl AsRef<str> for $name {
      fn as_ref(&self) -> &str { &self.0 }
    }
  };
}

prefixed_id!(
  /// Identifies a row in `models`.
  ModelId,
  "mo_"
);

prefixed_id!(
  /// Identifies a row in `speakers`.
  SpeakerId,
  "sp_"
);

prefixed_id!(
  /// Identifies a row in `conversations`.
  ConversationId,
  "co_"
);

prefixed_id!(
  /// Identifies a row in `turns`.
  TurnId,
  "tu_"
);
