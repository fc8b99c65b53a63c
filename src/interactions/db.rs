// MIT License
// Copyright (c) 2024 Graham King

use std::fs;
use std::path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use super::{SqliteStore, StoreError};

// Several request tasks can hit the file at once, each on its own pooled connection
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
pub const POOL_SIZE: u32 = 8;

// No uniqueness: the same user liking the same post twice counts twice
pub const CREATE_LIKES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS likes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    user TEXT
)
"#;

pub const CREATE_COMMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    user TEXT,
    email TEXT,
    comment TEXT
)
"#;

/// Open (or create) the database file and make sure both tables exist.
/// Safe to run against a database that already has data in it.
pub fn initialize(db_path: &path::Path) -> Result<SqliteStore, StoreError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let db_conn = open(db_path)?;
    // WAL so a long read doesn't hold up an insert
    db_conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    })?;
    db_conn.execute(CREATE_LIKES_TABLE, ())?;
    db_conn.execute(CREATE_COMMENTS_TABLE, ())?;
    drop(db_conn);

    Ok(SqliteStore::new(pool(db_path)?))
}

/// Connections for request handling. They never create the file, that's
/// [initialize]'s job, so a vanished database is an error and not a fresh empty one.
pub fn pool(db_path: &path::Path) -> Result<Pool<SqliteConnectionManager>, StoreError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .with_init(|db_conn| db_conn.busy_timeout(BUSY_TIMEOUT));
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .connection_timeout(BUSY_TIMEOUT)
        .build(manager)?;
    Ok(pool)
}

pub fn open(db_path: &path::Path) -> rusqlite::Result<rusqlite::Connection> {
    let db_conn = rusqlite::Connection::open(db_path)?;
    db_conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(db_conn)
}
