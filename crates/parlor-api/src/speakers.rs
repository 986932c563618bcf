//! Handlers for `/speakers` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/speakers` | Ordered by name, with tools |
//! | `POST` | `/speakers` | Body: [`SpeakerBody`]; 201 when created, 200 when updated |
//! | `GET`  | `/speakers/:id` | 404 if not found |
//! | `GET`  | `/speakers/named/:name` | Oldest speaker with that name |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use parlor_core::{
  id::{ModelId, SpeakerId},
  speaker::Speaker,
  store::{ConversationStore, GetSpeakerFilter},
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /speakers`
pub async fn list<S>(State(store): State<Arc<S>>) -> Result<Json<Vec<Speaker>>, ApiError>
where
  S: ConversationStore,
{
  let speakers = store.get_speakers().await.map_err(ApiError::from_store)?;
  Ok(Json(speakers))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /speakers/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<SpeakerId>,
) -> Result<Json<Speaker>, ApiError>
where
  S: ConversationStore,
{
  let speaker = store
    .get_speaker(GetSpeakerFilter::by_id(id))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(speaker))
}

/// `GET /speakers/named/:name`
pub async fn get_named<S>(
  State(store): State<Arc<S>>,
  Path(name): Path<String>,
) -> Result<Json<Speaker>, ApiError>
where
  S: ConversationStore,
{
  let speaker = store
    .get_speaker(GetSpeakerFilter::by_name(name))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(speaker))
}

// ─── Save ─────────────────────────────────────────────────────────────────────

/// Request body for `POST /speakers`. Tools cannot be set through this
/// endpoint.
#[derive(Debug, Deserialize)]
pub struct SpeakerBody {
  /// Omit to create a new speaker.
  #[serde(default)]
  pub id:       SpeakerId,
  pub model_id: ModelId,
  pub name:     String,
  #[serde(default)]
  pub system:   String,
  /// A JSON object; defaults to `{}`.
  #[serde(default)]
  pub config:   Option<Value>,
}

impl SpeakerBody {
  fn into_speaker(self) -> Result<Speaker, ApiError> {
    if !self.id.is_empty() && !self.id.has_prefix() {
      return Err(ApiError::BadRequest(format!(
        "speaker id must start with {:?}",
        SpeakerId::PREFIX
      )));
    }
    let config = match self.config {
      None => "{}".to_string(),
      Some(config @ Value::Object(_)) => config.to_string(),
      Some(_) => return Err(ApiError::BadRequest("config must be a JSON object".into())),
    };

    let mut speaker = Speaker::new(self.model_id, self.name, self.system, config);
    speaker.id = self.id;
    Ok(speaker)
  }
}

/// `POST /speakers`
pub async fn save<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<SpeakerBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ConversationStore,
{
  let speaker = body.into_speaker()?;
  let status = if speaker.id.is_empty() { StatusCode::CREATED } else { StatusCode::OK };

  let saved = store
    .save_speaker(speaker)
    .await
    .map_err(ApiError::from_store)?;
  tracing::debug!(speaker_id = %saved.id, "speaker saved");
  Ok((status, Json(saved)))
}
