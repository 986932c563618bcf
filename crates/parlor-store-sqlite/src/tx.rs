//! Transaction coordinator.
//!
//! Every logical operation runs as one SQLite transaction on the
//! `tokio-rusqlite` connection thread. The transaction commits only if the
//! operation succeeded and is still within its [`Deadline`]; any other exit
//! drops the [`rusqlite::Transaction`], which rolls it back.

use std::{
  collections::BTreeSet,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use parlor_core::{
  conversation::{Conversation, Turn},
  id::{ConversationId, ModelId, SpeakerId},
  port::StoreTx,
  speaker::Speaker,
};
use rusqlite::{
  Connection, ErrorCode, OptionalExtension as _, Transaction, TransactionBehavior,
};

use crate::{
  Error, Result,
  encode::{
    CONVERSATION_COLUMNS, RawConversation, RawSpeaker, RawTurn, SPEAKER_COLUMNS,
    TURN_COLUMNS, encode_dt,
  },
};

// ─── Deadline ────────────────────────────────────────────────────────────────

/// When an operation must give up, plus a flag the caller can raise to give
/// up early.
///
/// Clones share the cancellation flag. A caller waiting on an operation that
/// is still queued behind others gets `DeadlineExceeded` when the time runs
/// out; cancellation only takes effect at the operation's next checkpoint.
/// Lock waits inside SQLite are bounded by the time left, not interrupted by
/// [`Deadline::cancel`].
#[derive(Debug, Clone, Default)]
pub struct Deadline {
  at:        Option<Instant>,
  cancelled: Arc<AtomicBool>,
}

impl Deadline {
  /// No time limit; only [`Deadline::cancel`] stops the operation.
  pub fn none() -> Self { Self::default() }

  /// A timeout too large to represent means no time limit.
  pub fn after(timeout: Duration) -> Self {
    Self { at: Instant::now().checked_add(timeout), cancelled: Arc::default() }
  }

  pub fn at(instant: Instant) -> Self {
    Self { at: Some(instant), cancelled: Arc::default() }
  }

  /// Abort any operation running under this deadline (or a clone of it) at
  /// its next checkpoint.
  pub fn cancel(&self) { self.cancelled.store(true, Ordering::Release) }

  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }

  /// The instant the operation must give up by, if any.
  pub fn instant(&self) -> Option<Instant> { self.at }

  /// Time left before the deadline; `None` means unbounded.
  pub fn remaining(&self) -> Option<Duration> {
    self.at.map(|at| at.saturating_duration_since(Instant::now()))
  }

  pub fn check(&self) -> Result<()> {
    if self.is_cancelled() {
      return Err(Error::Cancelled);
    }
    match self.at {
      Some(at) if Instant::now() >= at => Err(Error::DeadlineExceeded),
      _ => Ok(()),
    }
  }
}

// ─── Budget ──────────────────────────────────────────────────────────────────

/// What the connection thread checks between statements: the caller's
/// deadline, and whether the awaiting future has been dropped.
#[derive(Clone)]
pub(crate) struct Budget {
  deadline:  Deadline,
  abandoned: Arc<AtomicBool>,
}

/// Marks its [`Budget`] abandoned when dropped. Held by the awaiting future.
pub(crate) struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
  fn drop(&mut self) { self.0.store(true, Ordering::Release) }
}

impl Budget {
  pub fn new(deadline: Deadline) -> (Self, AbandonOnDrop) {
    let abandoned = Arc::new(AtomicBool::new(false));
    let guard = AbandonOnDrop(abandoned.clone());
    (Self { deadline, abandoned }, guard)
  }

  pub fn check(&self) -> Result<()> {
    if self.abandoned.load(Ordering::Acquire) {
      return Err(Error::Cancelled);
    }
    self.deadline.check()
  }

  /// How long SQLite may wait on a lock: the configured busy timeout, or the
  /// time left if that is shorter. The flag reports the latter.
  fn lock_wait(&self, busy_timeout: Duration) -> (Duration, bool) {
    match self.deadline.remaining() {
      // Round up so the wait does not end just short of the deadline.
      Some(left) if left < busy_timeout => (left + Duration::from_millis(1), true),
      _ => (busy_timeout, false),
    }
  }

  /// A lock wait that ran out is a timeout when the deadline bounded it.
  fn classify(&self, e: Error, wait_bounded: bool) -> Error {
    if !is_busy(&e) {
      return e;
    }
    match self.check() {
      Err(budget) => budget,
      Ok(()) if wait_bounded => Error::DeadlineExceeded,
      Ok(()) => e,
    }
  }
}

fn is_busy(e: &Error) -> bool {
  matches!(
    e,
    Error::Sqlite(rusqlite::Error::SqliteFailure(f, _))
      if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

/// Run `f` inside one transaction. Commits on success, rolls back otherwise.
///
/// The budget is checked before `BEGIN`, before every statement issued
/// through the port, and once more right before `COMMIT`. Lock waits in
/// between are capped at the time left, and `busy_timeout` is restored
/// afterwards.
pub(crate) fn run_in_tx<T>(
  conn: &mut Connection,
  budget: &Budget,
  busy_timeout: Duration,
  behavior: TransactionBehavior,
  op: &'static str,
  f: impl FnOnce(&SqliteTx<'_>) -> Result<T>,
) -> Result<T> {
  if let Err(e) = budget.check() {
    tracing::warn!(op, error = %e, "operation not started");
    return Err(e);
  }

  let (wait, wait_bounded) = budget.lock_wait(busy_timeout);
  conn.busy_timeout(wait)?;
  let result = transact(conn, budget, behavior, f)
    .map_err(|e| budget.classify(e, wait_bounded));
  if wait_bounded && let Err(e) = conn.busy_timeout(busy_timeout) {
    tracing::warn!(op, error = %e, "failed to restore busy timeout");
  }

  if let Err(e) = &result {
    match e {
      Error::DeadlineExceeded | Error::Cancelled => {
        tracing::warn!(op, error = %e, "transaction rolled back");
      }
      _ => tracing::debug!(op, error = %e, "transaction rolled back"),
    }
  }
  result
}

fn transact<T>(
  conn: &mut Connection,
  budget: &Budget,
  behavior: TransactionBehavior,
  f: impl FnOnce(&SqliteTx<'_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(behavior)?;
  let port = SqliteTx { tx, budget: budget.clone() };

  // Any early return drops `port`, rolling the transaction back.
  let value = f(&port)?;
  budget.check()?;
  port.tx.commit()?;
  Ok(value)
}

// ─── Port ────────────────────────────────────────────────────────────────────

/// [`StoreTx`] over an open SQLite transaction.
pub(crate) struct SqliteTx<'c> {
  tx:     Transaction<'c>,
  budget: Budget,
}

impl SqliteTx<'_> {
  fn exists(&self, sql: &str, id: &str) -> Result<bool> {
    self.budget.check()?;
    Ok(self.tx.prepare_cached(sql)?.query_row([id], |row| row.get(0))?)
  }

  fn speaker_row(&self, sql: &str, param: &str) -> Result<Option<Speaker>> {
    self.budget.check()?;
    let raw = self
      .tx
      .prepare_cached(sql)?
      .query_row([param], RawSpeaker::from_row)
      .optional()?;
    raw.map(RawSpeaker::into_speaker).transpose()
  }

  fn turn_row(&self, sql: &str, params: impl rusqlite::Params) -> Result<Turn> {
    self.budget.check()?;
    let raw = self.tx.prepare_cached(sql)?.query_row(params, RawTurn::from_row)?;
    raw.into_turn()
  }

  pub fn get_speaker_by_name(&self, name: &str) -> Result<Option<Speaker>> {
    self.speaker_row(
      &format!(
        "SELECT {SPEAKER_COLUMNS} FROM speakers WHERE name = ?1 ORDER BY created, rowid LIMIT 1"
      ),
      name,
    )
  }

  pub fn list_speakers(&self) -> Result<Vec<Speaker>> {
    self.budget.check()?;
    let mut stmt = self
      .tx
      .prepare_cached(&format!("SELECT {SPEAKER_COLUMNS} FROM speakers ORDER BY name, rowid"))?;
    let raws = stmt
      .query_map([], RawSpeaker::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawSpeaker::into_speaker).collect()
  }

  /// Every `(speaker_id, tool_name)` pair, sorted by tool name.
  pub fn all_speaker_tools(&self) -> Result<Vec<(String, String)>> {
    self.budget.check()?;
    let mut stmt = self.tx.prepare_cached(
      "SELECT speaker_id, tool_name FROM speakers_tools ORDER BY tool_name",
    )?;
    let pairs = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pairs)
  }

  pub fn list_conversations(&self, limit: Option<u32>) -> Result<Vec<Conversation>> {
    self.budget.check()?;
    let mut stmt = self.tx.prepare_cached(&format!(
      "SELECT {CONVERSATION_COLUMNS} FROM conversations
       ORDER BY created DESC, rowid DESC
       LIMIT ?1"
    ))?;
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, i64::from);
    let raws = stmt
      .query_map([limit], RawConversation::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawConversation::into_conversation).collect()
  }

  pub fn connection(&self) -> &Connection { &self.tx }
}

impl StoreTx for SqliteTx<'_> {
  type Error = Error;

  // ── Existence predicates ──────────────────────────────────────────────

  fn conversation_exists(&self, id: &ConversationId) -> Result<bool> {
    self.exists(
      "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = ?1)",
      id.as_str(),
    )
  }

  fn speaker_exists(&self, id: &SpeakerId) -> Result<bool> {
    self.exists("SELECT EXISTS (SELECT 1 FROM speakers WHERE id = ?1)", id.as_str())
  }

  fn model_exists(&self, id: &ModelId) -> Result<bool> {
    self.exists("SELECT EXISTS (SELECT 1 FROM models WHERE id = ?1)", id.as_str())
  }

  // ── Writes ────────────────────────────────────────────────────────────

  fn insert_turn(&self, turn: &Turn, now: DateTime<Utc>) -> Result<Turn> {
    self.turn_row(
      &format!(
        "INSERT INTO turns (created, updated, conversation_id, speaker_id, content)
         VALUES (?1, ?1, ?2, ?3, ?4)
         RETURNING {TURN_COLUMNS}"
      ),
      rusqlite::params![
        encode_dt(now),
        turn.conversation_id.as_str(),
        turn.speaker_id.as_str(),
        turn.content,
      ],
    )
  }

  fn upsert_turn(&self, turn: &Turn, now: DateTime<Utc>) -> Result<Turn> {
    self.turn_row(
      &format!(
        "INSERT INTO turns (id, created, updated, conversation_id, speaker_id, content)
         VALUES (?1, ?2, ?2, ?3, ?4, ?5)
         ON CONFLICT (id) DO UPDATE SET
           updated         = excluded.updated,
           conversation_id = excluded.conversation_id,
           speaker_id      = excluded.speaker_id,
           content         = excluded.content
         RETURNING {TURN_COLUMNS}"
      ),
      rusqlite::params![
        turn.id.as_str(),
        encode_dt(now),
        turn.conversation_id.as_str(),
        turn.speaker_id.as_str(),
        turn.content,
      ],
    )
  }

  fn insert_speaker(&self, speaker: &Speaker, now: DateTime<Utc>) -> Result<Speaker> {
    self.budget.check()?;
    let raw = self
      .tx
      .prepare_cached(&format!(
        "INSERT INTO speakers (created, updated, model_id, name, system, config)
         VALUES (?1, ?1, ?2, ?3, ?4, ?5)
         RETURNING {SPEAKER_COLUMNS}"
      ))?
      .query_row(
        rusqlite::params![
          encode_dt(now),
          speaker.model_id.as_str(),
          speaker.name,
          speaker.system,
          speaker.config.as_str(),
        ],
        RawSpeaker::from_row,
      )?;
    raw.into_speaker()
  }

  fn upsert_speaker(&self, speaker: &Speaker, now: DateTime<Utc>) -> Result<Speaker> {
    self.budget.check()?;
    let raw = self
      .tx
      .prepare_cached(&format!(
        "INSERT INTO speakers (id, created, updated, model_id, name, system, config)
         VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (id) DO UPDATE SET
           updated  = excluded.updated,
           model_id = excluded.model_id,
           name     = excluded.name,
           system   = excluded.system,
           config   = excluded.config
         RETURNING {SPEAKER_COLUMNS}"
      ))?
      .query_row(
        rusqlite::params![
          speaker.id.as_str(),
          encode_dt(now),
          speaker.model_id.as_str(),
          speaker.name,
          speaker.system,
          speaker.config.as_str(),
        ],
        RawSpeaker::from_row,
      )?;
    raw.into_speaker()
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
    self.budget.check()?;
    let raw = self
      .tx
      .prepare_cached(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
      ))?
      .query_row([id.as_str()], RawConversation::from_row)
      .optional()?;
    raw.map(RawConversation::into_conversation).transpose()
  }

  fn list_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>> {
    self.budget.check()?;
    let mut stmt = self.tx.prepare_cached(&format!(
      "SELECT {TURN_COLUMNS} FROM turns
       WHERE conversation_id = ?1
       ORDER BY created, rowid"
    ))?;
    let raws = stmt
      .query_map([conversation_id.as_str()], RawTurn::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawTurn::into_turn).collect()
  }

  fn get_speaker(&self, id: &SpeakerId) -> Result<Option<Speaker>> {
    self.speaker_row(
      &format!("SELECT {SPEAKER_COLUMNS} FROM speakers WHERE id = ?1"),
      id.as_str(),
    )
  }

  fn speaker_tools(&self, id: &SpeakerId) -> Result<BTreeSet<String>> {
    self.budget.check()?;
    let mut stmt = self.tx.prepare_cached(
      "SELECT tool_name FROM speakers_tools WHERE speaker_id = ?1",
    )?;
    let tools = stmt
      .query_map([id.as_str()], |row| row.get(0))?
      .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(tools)
  }
}

#[cfg(test)]
mod tests {
  use parlor_core::upsert;

  use super::*;
  use crate::schema;

  const SPEAKER_ME: &str = "sp_5a0b1c2d3e4f50617283940a1b2c3d4e";
  const BUSY: Duration = Duration::from_secs(5);

  /// A migrated in-memory database with one conversation.
  fn migrated() -> (Connection, ConversationId) {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(schema::PRAGMAS).unwrap();
    schema::apply_migrations(&mut conn).unwrap();
    let id: String = conn
      .query_row(
        "INSERT INTO conversations (topic) VALUES ('Rollback') RETURNING id",
        [],
        |row| row.get(0),
      )
      .unwrap();
    (conn, id.into())
  }

  fn turn_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT count(*) FROM turns", [], |row| row.get(0)).unwrap()
  }

  #[test]
  fn open_deadline_passes() {
    assert!(Deadline::none().check().is_ok());
    assert!(Deadline::after(Duration::from_secs(60)).check().is_ok());
  }

  #[test]
  fn past_deadline_fails() {
    let d = Deadline::at(Instant::now());
    assert!(matches!(d.check(), Err(Error::DeadlineExceeded)));
  }

  #[test]
  fn cancel_is_shared_between_clones() {
    let d = Deadline::none();
    let clone = d.clone();
    clone.cancel();
    assert!(matches!(d.check(), Err(Error::Cancelled)));
  }

  #[test]
  fn dropping_the_guard_abandons_the_budget() {
    let (budget, guard) = Budget::new(Deadline::none());
    assert!(budget.check().is_ok());
    drop(guard);
    assert!(matches!(budget.check(), Err(Error::Cancelled)));
  }

  #[test]
  fn lock_wait_is_capped_by_the_deadline() {
    let (budget, _guard) = Budget::new(Deadline::after(Duration::from_millis(100)));
    let (wait, bounded) = budget.lock_wait(BUSY);
    assert!(bounded);
    assert!(wait <= Duration::from_millis(101));

    let (budget, _guard) = Budget::new(Deadline::none());
    assert_eq!(budget.lock_wait(BUSY), (BUSY, false));
  }

  // ── Coordinator ────────────────────────────────────────────────────────

  #[test]
  fn commits_every_statement_on_success() {
    let (mut conn, co) = migrated();
    let (budget, _guard) = Budget::new(Deadline::none());

    run_in_tx(&mut conn, &budget, BUSY, TransactionBehavior::Immediate, "test", |tx| {
      upsert::save_turn(tx, &Turn::new(co.clone(), SPEAKER_ME, "one"))?;
      upsert::save_turn(tx, &Turn::new(co.clone(), SPEAKER_ME, "two"))
    })
    .unwrap();

    assert_eq!(turn_count(&conn), 2);
  }

  #[test]
  fn cancel_after_a_write_rolls_it_back() {
    let (mut conn, co) = migrated();
    let deadline = Deadline::none();
    let (budget, _guard) = Budget::new(deadline.clone());

    let err = run_in_tx(&mut conn, &budget, BUSY, TransactionBehavior::Immediate, "test", |tx| {
      upsert::save_turn(tx, &Turn::new(co.clone(), SPEAKER_ME, "written"))?;
      deadline.cancel();
      Ok(())
    })
    .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "{err:?}");
    assert_eq!(turn_count(&conn), 0);
  }

  #[test]
  fn error_after_a_write_rolls_it_back() {
    let (mut conn, co) = migrated();
    let (budget, _guard) = Budget::new(Deadline::none());

    let err = run_in_tx(&mut conn, &budget, BUSY, TransactionBehavior::Immediate, "test", |tx| {
      upsert::save_turn(tx, &Turn::new(co.clone(), SPEAKER_ME, "written"))?;
      upsert::save_turn(tx, &Turn::new(co.clone(), "sp_missing", "rejected"))
    })
    .unwrap_err();

    assert!(matches!(err, Error::Core(parlor_core::Error::SpeakerNotFound)), "{err:?}");
    assert_eq!(turn_count(&conn), 0);
  }

  #[test]
  fn busy_timeout_is_restored_after_a_capped_wait() {
    let (mut conn, co) = migrated();
    let (budget, _guard) = Budget::new(Deadline::after(Duration::from_secs(1)));

    run_in_tx(&mut conn, &budget, BUSY, TransactionBehavior::Immediate, "test", |tx| {
      upsert::save_turn(tx, &Turn::new(co.clone(), SPEAKER_ME, "one"))
    })
    .unwrap();

    let ms: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap();
    assert_eq!(ms, 5000);
  }
}
