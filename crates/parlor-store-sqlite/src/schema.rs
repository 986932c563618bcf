//! SQL schema and migrations for the Parlor SQLite store.
//!
//! Migrations are applied in version order inside one transaction; the
//! applied version is mirrored to `PRAGMA user_version`.
//!
//! Ids and timestamps have column defaults so rows inserted by other writers
//! (conversations are created outside this crate) get them too. Timestamps
//! are fixed-width RFC 3339 with microseconds so text order is time order.

use rusqlite::Connection;

use crate::{Error, Result};

/// Connection-level settings. Cannot run inside a transaction.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

const V1_TABLES: &str = "
CREATE TABLE models (
    id        TEXT PRIMARY KEY
              DEFAULT ('mo_' || lower(hex(randomblob(16))))
              CHECK (substr(id, 1, 3) = 'mo_'),
    created   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    updated   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    provider  TEXT NOT NULL
              CHECK (provider IN ('anthropic', 'brain', 'fireworks', 'google', 'llamacpp', 'openai')),
    name      TEXT NOT NULL,
    config    TEXT NOT NULL DEFAULT '{}'
              CHECK (json_valid(config) AND json_type(config) = 'object')
);

CREATE TABLE speakers (
    id        TEXT PRIMARY KEY
              DEFAULT ('sp_' || lower(hex(randomblob(16))))
              CHECK (substr(id, 1, 3) = 'sp_'),
    created   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    updated   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    model_id  TEXT NOT NULL REFERENCES models(id),
    name      TEXT NOT NULL,
    system    TEXT NOT NULL DEFAULT '',
    config    TEXT NOT NULL DEFAULT '{}'
              CHECK (json_valid(config) AND json_type(config) = 'object')
);

CREATE TABLE tools (
    name      TEXT PRIMARY KEY,
    created   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z')
);

-- Which tools a speaker may call. Read-only from the store's point of view.
CREATE TABLE speakers_tools (
    speaker_id TEXT NOT NULL REFERENCES speakers(id),
    tool_name  TEXT NOT NULL REFERENCES tools(name),
    created    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    PRIMARY KEY (speaker_id, tool_name)
);

CREATE TABLE conversations (
    id        TEXT PRIMARY KEY
              DEFAULT ('co_' || lower(hex(randomblob(16))))
              CHECK (substr(id, 1, 3) = 'co_'),
    created   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    updated   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    topic     TEXT NOT NULL DEFAULT ''
);

CREATE TABLE turns (
    id              TEXT PRIMARY KEY
                    DEFAULT ('tu_' || lower(hex(randomblob(16))))
                    CHECK (substr(id, 1, 3) = 'tu_'),
    created         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    updated         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z'),
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    speaker_id      TEXT NOT NULL REFERENCES speakers(id),
    content         TEXT NOT NULL DEFAULT ''
);

CREATE INDEX speakers_name_idx        ON speakers(name);
CREATE INDEX conversations_created_idx ON conversations(created);
CREATE INDEX turns_conversation_idx   ON turns(conversation_id, created);
";

const V2_SEED: &str = "
INSERT INTO models (id, provider, name, config) VALUES
    ('mo_8b74dab2a7f360570be6e4898f944be3', 'openai',    'gpt-5',           '{}'),
    ('mo_8cc34e092637b06b9a61c3c254ef2133', 'anthropic', 'claude-opus-4-1', '{}'),
    ('mo_748b19edaa66505f81aa7725dfcd3e53', 'google',    'gemini-2.5-pro',  '{}'),
    ('mo_0e5f2a7f5a1c4b0fb7f1e9f2d3c4b5a6', 'brain',     'brain',           '{}');

INSERT INTO speakers (id, model_id, name, system) VALUES
    ('sp_5a0b1c2d3e4f50617283940a1b2c3d4e', 'mo_0e5f2a7f5a1c4b0fb7f1e9f2d3c4b5a6', 'Me', ''),
    ('sp_c7d8e9f0a1b2c3d4e5f60718293a4b5c', 'mo_8cc34e092637b06b9a61c3c254ef2133', 'The Caretaker',
     'You are The Caretaker. You look after the people you talk to.');

INSERT INTO tools (name) VALUES ('save_name');
";

#[derive(Debug, Clone, Copy)]
struct Migration {
  version: u32,
  sql:     &'static str,
}

const MIGRATIONS: &[Migration] = &[
  Migration { version: 1, sql: V1_TABLES },
  Migration { version: 2, sql: V2_SEED },
];

/// The latest migration version known to this build.
pub fn latest_version() -> u32 {
  MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Read the schema version recorded in the database.
pub fn current_version(conn: &Connection) -> Result<u32> {
  Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Apply all pending migrations. Returns the resulting version.
pub fn apply_migrations(conn: &mut Connection) -> Result<u32> {
  let current = current_version(conn)?;
  let latest = latest_version();

  if current > latest {
    return Err(Error::UnsupportedSchemaVersion {
      db_version:       current,
      latest_supported: latest,
    });
  }
  if current == latest {
    return Ok(current);
  }

  let tx = conn.transaction()?;
  for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
    tx.execute_batch(migration.sql)?;
    tx.execute_batch(&format!("PRAGMA user_version = {}", migration.version))?;
    tracing::info!(version = migration.version, "applied migration");
  }
  tx.commit()?;

  Ok(latest)
}
