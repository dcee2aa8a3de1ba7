use crate::models::db_operations::posts_db_operations::{
    CATEGORY_INDEX, CHRONOLOGICAL_INDEX, GUID_INDEX, LINK_INDEX, POSTS, REVISIONS, REVISION_BY_POST, SCHEDULE_INDEX,
    TITLE_INDEX,
};
use redb::{CommitError, Database, DatabaseError, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb database error: {0}")]
    RedbDatabase(#[from] DatabaseError),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const NEWSROOM_SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'superadmin')),
            crud_access INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_at TEXT,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "settings",
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ),
    (
        "categories",
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            description TEXT,
            created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "activities",
        "CREATE TABLE IF NOT EXISTS activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            activity_type TEXT NOT NULL,
            actor_id INTEGER,
            actor_name TEXT NOT NULL,
            title TEXT NOT NULL,
            post_id TEXT,
            revision_id TEXT,
            event TEXT NOT NULL,
            severity TEXT NOT NULL CHECK(severity IN ('info', 'warning', 'critical')),
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
    ),
    (
        "rss_feed_configs",
        "CREATE TABLE IF NOT EXISTS rss_feed_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            brand_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            fetch_interval_minutes INTEGER NOT NULL,
            default_status TEXT NOT NULL CHECK(default_status IN ('published', 'draft')),
            last_fetched_at TEXT,
            last_fetch_status TEXT NOT NULL DEFAULT 'never',
            last_error_message TEXT,
            last_item_count INTEGER NOT NULL DEFAULT 0,
            created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "rss_fetch_runs",
        "CREATE TABLE IF NOT EXISTS rss_fetch_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            feed_id INTEGER REFERENCES rss_feed_configs(id) ON DELETE SET NULL,
            feed_url TEXT NOT NULL,
            status TEXT NOT NULL,
            items_found INTEGER NOT NULL DEFAULT 0,
            saved INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            triggered_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "rss_subscriptions",
        "CREATE TABLE IF NOT EXISTS rss_subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            subscription_type TEXT NOT NULL CHECK(subscription_type IN ('all', 'feed', 'category')),
            feed_id INTEGER REFERENCES rss_feed_configs(id) ON DELETE CASCADE,
            category_id INTEGER REFERENCES categories(id) ON DELETE CASCADE,
            in_app INTEGER NOT NULL DEFAULT 1,
            web_push INTEGER NOT NULL DEFAULT 0,
            email INTEGER NOT NULL DEFAULT 0,
            max_per_hour INTEGER NOT NULL,
            max_per_day INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "notifications",
        "CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            post_id TEXT,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            link TEXT,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            read_at TEXT
        )",
    ),
    (
        "notification_deliveries",
        "CREATE TABLE IF NOT EXISTS notification_deliveries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            post_id TEXT,
            delivered_at TEXT NOT NULL
        )",
    ),
    (
        "push_subscriptions",
        "CREATE TABLE IF NOT EXISTS push_subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            endpoint TEXT NOT NULL UNIQUE,
            p256dh TEXT NOT NULL,
            auth TEXT NOT NULL,
            user_agent TEXT,
            created_at TEXT NOT NULL,
            last_used_at TEXT
        )",
    ),
];

const NEWSROOM_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_activities_created ON activities(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_activities_expires ON activities(expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_activities_actor ON activities(actor_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_fetch_runs_feed ON rss_fetch_runs(feed_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON rss_subscriptions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_deliveries_user ON notification_deliveries(user_id, delivered_at)",
    "CREATE INDEX IF NOT EXISTS idx_push_user ON push_subscriptions(user_id)",
];

/// Creates every relational table. Safe to re-run.
pub fn setup_newsroom_db(conn: &mut Connection) -> Result<(), SetupError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let tx = conn.transaction()?;
    for (name, sql) in NEWSROOM_SCHEMA {
        log::debug!("Creating '{}' table", name);
        tx.execute(sql, [])?;
    }
    for sql in NEWSROOM_INDEXES {
        tx.execute(sql, [])?;
    }
    tx.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('display_timezone', ?1)",
        [r#"{"label":"UTC","offsetMinutes":0}"#],
    )?;
    tx.commit()?;
    Ok(())
}

/// Creates the content store file and every table and index in it.
pub fn setup_content_db(path: &Path) -> Result<Database, SetupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::create(path)?;
    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(POSTS)?;
        write_txn.open_table(REVISIONS)?;
        write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        write_txn.open_table(SCHEDULE_INDEX)?;
        write_txn.open_table(CATEGORY_INDEX)?;
        write_txn.open_table(GUID_INDEX)?;
        write_txn.open_table(LINK_INDEX)?;
        write_txn.open_table(TITLE_INDEX)?;
        write_txn.open_table(REVISION_BY_POST)?;
    }
    write_txn.commit()?;
    Ok(db)
}

/// Opens (creating if needed) the relational store with its schema in place.
pub fn open_newsroom_db(path: &Path) -> Result<Connection, SetupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    setup_newsroom_db(&mut conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newsroom_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsroom").join("newsroom.db");
        let conn = open_newsroom_db(&path).unwrap();
        drop(conn);
        let conn = open_newsroom_db(&path).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables as usize, NEWSROOM_SCHEMA.len());
    }

    #[test]
    fn content_store_opens_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = setup_content_db(&dir.path().join("content").join("content.db")).unwrap();
        let read = db.begin_read().unwrap();
        assert!(read.open_table(POSTS).is_ok());
        assert!(read.open_table(REVISION_BY_POST).is_ok());
    }
}
