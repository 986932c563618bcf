//! Handlers for `/turns` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/turns` | Body: [`TurnBody`]; 201 when created, 200 when updated |
//!
//! Turns are read back through `GET /conversations/:id`.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use parlor_core::{
  conversation::Turn,
  id::{ConversationId, SpeakerId, TurnId},
  store::ConversationStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TurnBody {
  /// Omit to create a new turn.
  #[serde(default)]
  pub id:              TurnId,
  pub conversation_id: ConversationId,
  pub speaker_id:      SpeakerId,
  #[serde(default)]
  pub content:         String,
}

/// `POST /turns`
pub async fn save<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<TurnBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ConversationStore,
{
  if !body.id.is_empty() && !body.id.has_prefix() {
    return Err(ApiError::BadRequest(format!(
      "turn id must start with {:?}",
      TurnId::PREFIX
    )));
  }
  let status = if body.id.is_empty() { StatusCode::CREATED } else { StatusCode::OK };

  let mut turn = Turn::new(body.conversation_id, body.speaker_id, body.content);
  turn.id = body.id;

  let saved = store.save_turn(turn).await.map_err(ApiError::from_store)?;
  tracing::debug!(turn_id = %saved.id, conversation_id = %saved.conversation_id, "turn saved");
  Ok((status, Json(saved)))
}
