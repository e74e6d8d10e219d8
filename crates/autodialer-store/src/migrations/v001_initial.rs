//! v001 -- Initial schema creation.
//!
//! Creates the four mirrored tables: `devices`, `call_lists`,
//! `call_history` and `sessions`. Timestamps are RFC-3339 text.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Devices
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS devices (
    id              TEXT PRIMARY KEY NOT NULL,  -- session / device id
    name            TEXT NOT NULL,              -- reported device type
    status          TEXT NOT NULL DEFAULT 'disconnected',
    transport       TEXT NOT NULL DEFAULT 'http',
    user_agent      TEXT,
    current_list    TEXT,
    calls_active    INTEGER NOT NULL DEFAULT 0,
    calls_completed INTEGER NOT NULL DEFAULT 0,
    connected_at    TEXT NOT NULL,
    last_seen       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_devices_status ON devices(status);

-- ----------------------------------------------------------------
-- Call lists
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS call_lists (
    id               TEXT PRIMARY KEY NOT NULL,
    name             TEXT NOT NULL,
    numbers          TEXT NOT NULL,             -- JSON array
    original_numbers TEXT,                      -- JSON array
    ddd              TEXT,
    status           TEXT NOT NULL DEFAULT 'paused',
    progress         INTEGER NOT NULL DEFAULT 0,
    total_numbers    INTEGER NOT NULL DEFAULT 0,
    completed_calls  INTEGER NOT NULL DEFAULT 0,
    current_group    INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_call_lists_status ON call_lists(status);

-- ----------------------------------------------------------------
-- Call history (no FKs: lists and devices come and go independently)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS call_history (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id    TEXT NOT NULL,
    list_id      TEXT NOT NULL,
    phone_number TEXT NOT NULL,
    status       TEXT NOT NULL,                 -- completed, failed, busy, ...
    duration     INTEGER,                       -- seconds
    timestamp    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_call_history_device ON call_history(device_id);
CREATE INDEX IF NOT EXISTS idx_call_history_list ON call_history(list_id);

-- ----------------------------------------------------------------
-- WebSocket sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY NOT NULL,
    device_id     TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'active',
    created_at    TEXT NOT NULL,
    last_activity TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
