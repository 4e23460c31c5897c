use bo_core::types::fold_case;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Result};
use std::path::Path;

pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

/// Opens a connection with the busy timeout installed before the journal
/// mode switch, so concurrent openers wait instead of failing on WAL setup.
pub fn open(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn, busy_timeout_ms)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout_ms: u32) -> Result<()> {
    conn.pragma_update(None, "busy_timeout", busy_timeout_ms)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // SQLite's own lower() folds ASCII only.
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: String = ctx.get(0)?;
            Ok(fold_case(&value))
        },
    )?;
    Ok(())
}

pub fn migrate(conn: &Connection) -> Result<()> {
    let sql = include_str!("../migrations/0001_init.sql");
    conn.execute_batch(sql)?;
    Ok(())
}

pub fn open_and_migrate(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Result<Connection> {
    let conn = open(path, busy_timeout_ms)?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn with_test_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, DEFAULT_BUSY_TIMEOUT_MS)?;
    migrate(&conn)?;
    Ok(conn)
}
