// MIT License
// Copyright (c) 2024 Graham King

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub mod db;

pub use db::initialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

// Body of POST /api/interactions/add-like
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewLike {
    pub title: String,
    pub user: String,
}

// Body of POST /api/interactions/add-comment
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub title: String,
    pub user: String,
    pub email: String,
    pub comment: String,
}

/// A comment as shown next to a post. The email stays private.
#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub user: String,
    pub comment: String,
}

/// Everything readers did to one post, built fresh on every read.
#[derive(serde::Serialize, Debug, Default, PartialEq, Eq)]
pub struct Interactions {
    pub like_count: u64,
    pub comments: Vec<CommentView>,
}

/// Durable home for likes and comments.
///
/// Titles are matched exactly, no case folding or trimming. Records are never
/// updated or removed.
pub trait Store: Send + Sync {
    fn add_like(&self, like: &NewLike) -> Result<(), StoreError>;
    fn add_comment(&self, comment: &NewComment) -> Result<(), StoreError>;
    fn interactions(&self, title: &str) -> Result<Interactions, StoreError>;
}

/// [Store] backed by a sqlite file. Build it with [initialize].
///
/// Owns the connection pool. Each call borrows a connection; sqlite's file
/// locking orders concurrent writers.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        SqliteStore { pool }
    }
}

impl Store for SqliteStore {
    fn add_like(&self, like: &NewLike) -> Result<(), StoreError> {
        let db_conn = self.pool.get()?;
        let mut stmt = db_conn.prepare("INSERT INTO likes (title, user) VALUES (?1, ?2)")?;
        stmt.execute((&like.title, &like.user))?;
        Ok(())
    }

    fn add_comment(&self, comment: &NewComment) -> Result<(), StoreError> {
        let db_conn = self.pool.get()?;
        let mut stmt = db_conn.prepare(
            "INSERT INTO comments (title, user, email, comment) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute((
            &comment.title,
            &comment.user,
            &comment.email,
            &comment.comment,
        ))?;
        Ok(())
    }

    fn interactions(&self, title: &str) -> Result<Interactions, StoreError> {
        let db_conn = self.pool.get()?;
        let like_count: u64 = db_conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE title = ?1",
            [title],
            |row| row.get(0),
        )?;

        // Callers must not rely on the order, id just keeps it stable
        let mut stmt =
            db_conn.prepare("SELECT user, comment FROM comments WHERE title = ?1 ORDER BY id")?;
        let mut rows = stmt.query([title])?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(CommentView {
                user: row.get(0)?,
                comment: row.get(1)?,
            });
        }

        Ok(Interactions {
            like_count,
            comments,
        })
    }
}
