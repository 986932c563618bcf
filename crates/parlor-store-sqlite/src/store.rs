//! [`SqliteStore`], the SQLite implementation of [`ConversationStore`].

use std::{collections::HashMap, path::Path, time::Duration};

use parlor_core::{
  conversation::{Conversation, ConversationDocument, Turn},
  document,
  id::{ConversationId, ModelId},
  model::Model,
  port::StoreTx as _,
  speaker::Speaker,
  store::{ConversationStore, GetSpeakerFilter},
  upsert,
};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use crate::{
  Error, Result,
  encode::{MODEL_COLUMNS, RawModel},
  schema,
  tx::{Budget, Deadline, SqliteTx, run_in_tx},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Tunables applied when the store is opened.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
  /// Deadline given to each operation unless the handle carries its own.
  pub op_timeout:   Duration,
  /// How long SQLite waits on a locked database before giving up.
  pub busy_timeout: Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      op_timeout:   Duration::from_secs(30),
      busy_timeout: Duration::from_secs(5),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Parlor conversation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All clones
/// share one connection thread, so writes are serialised.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  options:  StoreOptions,
  deadline: Option<Deadline>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and apply pending migrations.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, StoreOptions::default()).await
  }

  pub async fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, options).await
  }

  /// Open an in-memory store. Useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, StoreOptions::default()).await
  }

  async fn init(conn: tokio_rusqlite::Connection, options: StoreOptions) -> Result<Self> {
    let busy_timeout = options.busy_timeout;
    conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(schema::PRAGMAS)?;
        Ok(schema::apply_migrations(conn))
      })
      .await??;
    Ok(Self { conn, options, deadline: None })
  }

  /// A handle whose operations each get `timeout` instead of the configured
  /// default.
  pub fn with_timeout(&self, timeout: Duration) -> Self {
    Self {
      options: StoreOptions { op_timeout: timeout, ..self.options },
      deadline: None,
      ..self.clone()
    }
  }

  /// A handle whose operations all run under `deadline`. Cancelling it
  /// aborts whatever is in flight and everything issued afterwards.
  pub fn with_deadline(&self, deadline: Deadline) -> Self {
    Self { deadline: Some(deadline), ..self.clone() }
  }

  pub async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn schema_version(&self) -> Result<u32> {
    self.conn.call(|conn| Ok(schema::current_version(conn))).await?
  }

  pub async fn get_model(&self, id: &ModelId) -> Result<Model> {
    let id = id.clone();
    self
      .read("get_model", move |tx| {
        let raw = tx
          .connection()
          .prepare_cached(&format!("SELECT {MODEL_COLUMNS} FROM models WHERE id = ?1"))?
          .query_row([id.as_str()], RawModel::from_row)
          .optional()?
          .ok_or(parlor_core::Error::ModelNotFound)?;
        raw.into_model()
      })
      .await
  }

  /// All models ordered by name.
  pub async fn get_models(&self) -> Result<Vec<Model>> {
    self
      .read("get_models", |tx| {
        let mut stmt = tx
          .connection()
          .prepare_cached(&format!("SELECT {MODEL_COLUMNS} FROM models ORDER BY name"))?;
        let raws = stmt
          .query_map([], RawModel::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawModel::into_model).collect()
      })
      .await
  }

  /// Run `f` directly on the connection, outside the coordinator. Used by
  /// tests to play the collaborators that create conversations and assign
  /// tools.
  #[cfg(test)]
  pub(crate) async fn with_conn<T, F>(&self, f: F) -> T
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| Ok(f(conn)?))
      .await
      .expect("test connection call")
  }

  // ─── Coordinator entry points ──────────────────────────────────────────────

  /// Run `f` in an exclusive write transaction.
  async fn write<T, F>(&self, op: &'static str, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteTx<'_>) -> Result<T> + Send + 'static,
  {
    self.run(op, TransactionBehavior::Immediate, f).await
  }

  /// Run `f` in a read transaction, which still sees one consistent snapshot.
  async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteTx<'_>) -> Result<T> + Send + 'static,
  {
    self.run(op, TransactionBehavior::Deferred, f).await
  }

  async fn run<T, F>(&self, op: &'static str, behavior: TransactionBehavior, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteTx<'_>) -> Result<T> + Send + 'static,
  {
    let deadline = self
      .deadline
      .clone()
      .unwrap_or_else(|| Deadline::after(self.options.op_timeout));
    let give_up_at = deadline.instant();
    let busy_timeout = self.options.busy_timeout;
    // Dropping this future before the closure commits makes it roll back.
    let (budget, _abandon) = Budget::new(deadline);

    let call = self
      .conn
      .call(move |conn| Ok(run_in_tx(conn, &budget, busy_timeout, behavior, op, f)));

    let Some(at) = give_up_at else {
      return call.await?;
    };
    match tokio::time::timeout_at(at.into(), call).await {
      Ok(result) => result?,
      // Still queued or running; `_abandon` drops on return so the
      // connection thread rolls it back at its next checkpoint.
      Err(_) => {
        tracing::warn!(op, "deadline passed before the operation finished");
        Err(Error::DeadlineExceeded)
      }
    }
  }
}

// ─── ConversationStore impl ──────────────────────────────────────────────────

impl ConversationStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn save_turn(&self, turn: Turn) -> Result<Turn> {
    self
      .write("save_turn", move |tx| upsert::save_turn(tx, &turn))
      .await
  }

  async fn save_speaker(&self, speaker: Speaker) -> Result<Speaker> {
    self
      .write("save_speaker", move |tx| upsert::save_speaker(tx, &speaker))
      .await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_conversation_document<'a>(
    &'a self,
    id: &'a ConversationId,
  ) -> Result<ConversationDocument> {
    let id = id.clone();
    self
      .write("get_conversation_document", move |tx| document::assemble(tx, &id))
      .await
  }

  async fn get_conversations(&self) -> Result<Vec<Conversation>> {
    self
      .read("get_conversations", |tx| tx.list_conversations(None))
      .await
  }

  async fn get_latest_conversation(&self) -> Result<Conversation> {
    self
      .read("get_latest_conversation", |tx| {
        tx.list_conversations(Some(1))?
          .into_iter()
          .next()
          .ok_or(Error::Core(parlor_core::Error::ConversationNotFound))
      })
      .await
  }

  async fn get_speakers(&self) -> Result<Vec<Speaker>> {
    self
      .read("get_speakers", |tx| {
        let mut speakers = tx.list_speakers()?;
        let mut tools: HashMap<String, Vec<String>> = HashMap::new();
        for (speaker_id, tool) in tx.all_speaker_tools()? {
          tools.entry(speaker_id).or_default().push(tool);
        }
        for speaker in &mut speakers {
          if let Some(names) = tools.remove(speaker.id.as_str()) {
            speaker.tools = names.into_iter().collect();
          }
        }
        Ok(speakers)
      })
      .await
  }

  async fn get_speaker(&self, filter: GetSpeakerFilter) -> Result<Speaker> {
    if filter.id.is_empty() && filter.name.is_empty() {
      panic!("either ID or name must be set to get speaker");
    }

    self
      .read("get_speaker", move |tx| {
        let found = if filter.id.is_empty() {
          tx.get_speaker_by_name(&filter.name)?
        } else {
          tx.get_speaker(&filter.id)?
        };
        let mut speaker = found.ok_or(parlor_core::Error::SpeakerNotFound)?;
        speaker.tools = tx.speaker_tools(&speaker.id)?;
        Ok(speaker)
      })
      .await
  }
}
