//! Language models and their opaque configuration.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::ModelId;

// ─── Opaque JSON ─────────────────────────────────────────────────────────────

/// A JSON document stored verbatim.
///
/// The store never interprets the text; it only checks that it is valid JSON
/// when a row is written. Readers call [`Json::parse`] when they need the
/// contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json(String);

impl Json {
  pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Parse the document as a JSON object.
  ///
  /// # Panics
  ///
  /// If the text is not a JSON object. Config values are only written by
  /// trusted code through a `json_valid` check, so a failure here means the
  /// row is corrupt and there is nothing sensible to recover to.
  pub fn parse(&self) -> Map<String, Value> {
    match serde_json::from_str(&self.0) {
      Ok(map) => map,
      Err(e) => panic!("corrupt config JSON {:?}: {e}", self.0),
    }
  }
}

impl Default for Json {
  fn default() -> Self { Self("{}".to_owned()) }
}

impl From<&str> for Json {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for Json {
  fn from(s: String) -> Self { Self(s) }
}

// ─── Provider ────────────────────────────────────────────────────────────────

/// Who serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
  Anthropic,
  /// A human at the keyboard.
  Brain,
  Fireworks,
  Google,
  LlamaCpp,
  OpenAi,
}

impl Provider {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Anthropic => "anthropic",
      Self::Brain => "brain",
      Self::Fireworks => "fireworks",
      Self::Google => "google",
      Self::LlamaCpp => "llamacpp",
      Self::OpenAi => "openai",
    }
  }
}

impl fmt::Display for Provider {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0:?}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
  type Err = UnknownProvider;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "anthropic" => Ok(Self::Anthropic),
      "brain" => Ok(Self::Brain),
      "fireworks" => Ok(Self::Fireworks),
      "google" => Ok(Self::Google),
      "llamacpp" => Ok(Self::LlamaCpp),
      "openai" => Ok(Self::OpenAi),
      other => Err(UnknownProvider(other.to_owned())),
    }
  }
}

// ─── Model ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
  pub id:       ModelId,
  pub created:  DateTime<Utc>,
  pub updated:  DateTime<Utc>,
  pub provider: Provider,
  pub name:     String,
  pub config:   Json,
}

const FIREWORKS_URL: &str = "https://api.fireworks.ai/inference/v1";

impl Model {
  /// Base URL of an OpenAI-compatible endpoint serving this model.
  ///
  /// `None` means the provider's client library already knows where to go
  /// (or, for [`Provider::Brain`], that there is no endpoint at all).
  ///
  /// # Panics
  ///
  /// If a `llamacpp` model's config is corrupt or lacks an `address`.
  pub fn url(&self) -> Option<String> {
    match self.provider {
      Provider::Anthropic | Provider::Brain | Provider::Google | Provider::OpenAi => None,
      Provider::Fireworks => Some(FIREWORKS_URL.to_owned()),
      Provider::LlamaCpp => {
        let config = self.config.parse();
        let address = match config.get("address") {
          Some(Value::String(s)) => s.clone(),
          Some(other) => other.to_string(),
          None => panic!("llamacpp model {} has no address in its config", self.id),
        };
        Some(format!("http://{address}/v1"))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn model(provider: Provider, config: &str) -> Model {
    Model {
      id: ModelId::from("mo_test"),
      created: DateTime::default(),
      updated: DateTime::default(),
      provider,
      name: "test".into(),
      config: config.into(),
    }
  }

  #[test]
  fn hosted_providers_have_no_url() {
    for p in [Provider::Anthropic, Provider::Google, Provider::OpenAi, Provider::Brain] {
      assert_eq!(model(p, "{}").url(), None);
    }
  }

  #[test]
  fn fireworks_url() {
    assert_eq!(
      model(Provider::Fireworks, "{}").url().as_deref(),
      Some("https://api.fireworks.ai/inference/v1")
    );
  }

  #[test]
  fn llamacpp_url_uses_configured_address() {
    let m = model(Provider::LlamaCpp, r#"{"address": "localhost:8090"}"#);
    assert_eq!(m.url().as_deref(), Some("http://localhost:8090/v1"));
  }

  #[test]
  #[should_panic(expected = "corrupt config JSON")]
  fn corrupt_config_panics() {
    model(Provider::LlamaCpp, "{not json").url();
  }

  #[test]
  fn provider_round_trips_through_str() {
    for p in [
      Provider::Anthropic,
      Provider::Brain,
      Provider::Fireworks,
      Provider::Google,
      Provider::LlamaCpp,
      Provider::OpenAi,
    ] {
      assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
    }
    assert!("mystery".parse::<Provider>().is_err());
  }

  #[test]
  fn default_json_is_empty_object() {
    assert!(Json::default().parse().is_empty());
  }
}
