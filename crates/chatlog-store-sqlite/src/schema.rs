//! SQL schema for the chatlog SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Rows are never deleted; `deleted_at` marks them hidden.
CREATE TABLE IF NOT EXISTS scrape_runs (
    id             TEXT PRIMARY KEY,
    started_at     TEXT NOT NULL,
    completed_at   TEXT,
    profile        TEXT NOT NULL,    -- 'small' | 'medium' | 'large'
    headless       INTEGER NOT NULL DEFAULT 0,
    status         TEXT NOT NULL DEFAULT 'running'
                   CHECK (status IN ('running', 'success', 'failed')),
    message_count  INTEGER NOT NULL DEFAULT 0,
    error_message  TEXT,
    log_path       TEXT,
    video_path     TEXT,
    trace_path     TEXT,
    log_text       TEXT,
    deleted_at     TEXT
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    sender         TEXT NOT NULL,
    message_text   TEXT NOT NULL,
    timestamp      TEXT NOT NULL,   -- fixed-width RFC 3339 UTC, millis
    channel_name   TEXT NOT NULL,
    thread_id      TEXT,
    scrape_run_id  TEXT REFERENCES scrape_runs(id),
    raw_json       TEXT,
    deleted_at     TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (channel_name, timestamp, sender, message_text)
);

CREATE TABLE IF NOT EXISTS target_chats (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_name        TEXT NOT NULL,
    chat_type        TEXT NOT NULL DEFAULT 'channel'
                     CHECK (chat_type IN ('channel', 'user', 'group')),
    profile          TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1,
    priority         INTEGER NOT NULL DEFAULT 0,
    notes            TEXT,
    last_scraped_at  TEXT,
    message_count    INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    deleted_at       TEXT
);

-- Names are unique among live targets only; a deleted name can be reused.
CREATE UNIQUE INDEX IF NOT EXISTS target_chats_live_name_idx
    ON target_chats(chat_name) WHERE deleted_at IS NULL;

CREATE INDEX IF NOT EXISTS chat_messages_channel_ts_idx
    ON chat_messages(channel_name, timestamp);
CREATE INDEX IF NOT EXISTS chat_messages_ts_idx     ON chat_messages(timestamp);
CREATE INDEX IF NOT EXISTS scrape_runs_started_idx  ON scrape_runs(started_at);

PRAGMA user_version = 1;
";
