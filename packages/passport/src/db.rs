//! SQLite connection setup for the passport ledger.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::LedgerError;

/// Opens (or creates) the ledger database at `path`.
pub(crate) fn open(path: &Path) -> Result<Connection, LedgerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    init(&conn)?;
    Ok(conn)
}

/// Opens a fresh in-memory ledger (tests and ephemeral deployments).
pub(crate) fn open_in_memory() -> Result<Connection, LedgerError> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<(), LedgerError> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_schema(conn)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS profiles (
            user_key TEXT PRIMARY KEY,
            nickname TEXT,
            home_city TEXT,
            points INTEGER NOT NULL DEFAULT 0,
            streak INTEGER NOT NULL DEFAULT 0,
            best_streak INTEGER NOT NULL DEFAULT 0,
            last_active_date TEXT
        );
        CREATE TABLE IF NOT EXISTS exposure_events (
            id TEXT PRIMARY KEY,
            user_key TEXT NOT NULL REFERENCES profiles(user_key) ON DELETE CASCADE,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            location_name TEXT NOT NULL,
            pm25 REAL,
            no2 REAL,
            co REAL,
            mode TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            score REAL NOT NULL,
            risk_level TEXT NOT NULL,
            tips TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_exposure_events_user_time
            ON exposure_events (user_key, recorded_at DESC);",
    )?;
    Ok(())
}
