use crate::models::db_operations::{invalid_column, opt_time_column, time_column, to_db_time};
use crate::models::rss_models::{FeedConfig, FetchRun, FetchStatus};
use crate::models::PostStatus;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const FEED_COLUMNS: &str = "id, url, brand_name, is_active, fetch_interval_minutes, default_status, last_fetched_at, \
     last_fetch_status, last_error_message, last_item_count, created_by, created_at, updated_at";

const RUN_COLUMNS: &str = "id, feed_id, feed_url, status, items_found, saved, errors, error_message, triggered_by, created_at";

fn feed_from_row(row: &Row) -> rusqlite::Result<FeedConfig> {
    let status_raw: String = row.get(5)?;
    let default_status = PostStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(5, format!("unknown post status '{}'", status_raw)))?;
    let fetch_raw: String = row.get(7)?;
    let last_fetch_status = FetchStatus::parse(&fetch_raw)
        .ok_or_else(|| invalid_column(7, format!("unknown fetch status '{}'", fetch_raw)))?;
    Ok(FeedConfig {
        id: row.get(0)?,
        url: row.get(1)?,
        brand_name: row.get(2)?,
        is_active: row.get(3)?,
        fetch_interval_minutes: row.get(4)?,
        default_status,
        last_fetched_at: opt_time_column(row, 6)?,
        last_fetch_status,
        last_error_message: row.get(8)?,
        last_item_count: row.get(9)?,
        created_by: row.get(10)?,
        created_at: time_column(row, 11)?,
        updated_at: time_column(row, 12)?,
    })
}

fn run_from_row(row: &Row) -> rusqlite::Result<FetchRun> {
    let status_raw: String = row.get(3)?;
    let status = FetchStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(3, format!("unknown fetch status '{}'", status_raw)))?;
    Ok(FetchRun {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        feed_url: row.get(2)?,
        status,
        items_found: row.get(4)?,
        saved: row.get(5)?,
        errors: row.get(6)?,
        error_message: row.get(7)?,
        triggered_by: row.get(8)?,
        created_at: time_column(row, 9)?,
    })
}

// --- Feed configurations ---

pub fn create_feed(
    conn: &Connection,
    url: &str,
    brand_name: &str,
    is_active: bool,
    fetch_interval_minutes: u32,
    default_status: PostStatus,
    created_by: Option<i64>,
) -> Result<FeedConfig, RusqliteError> {
    let now = to_db_time(&Utc::now());
    conn.execute(
        "INSERT INTO rss_feed_configs (url, brand_name, is_active, fetch_interval_minutes, default_status, last_fetch_status, last_item_count, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'never', 0, ?6, ?7, ?7)",
        params![url, brand_name, is_active, fetch_interval_minutes, default_status.as_str(), created_by, now],
    )?;
    let id = conn.last_insert_rowid();
    read_feed(conn, id)?.ok_or(RusqliteError::QueryReturnedNoRows)
}

pub fn read_feed(conn: &Connection, id: i64) -> Result<Option<FeedConfig>, RusqliteError> {
    let sql = format!("SELECT {} FROM rss_feed_configs WHERE id = ?1", FEED_COLUMNS);
    conn.query_row(&sql, [id], feed_from_row).optional()
}

pub fn read_feed_by_url(conn: &Connection, url: &str) -> Result<Option<FeedConfig>, RusqliteError> {
    let sql = format!("SELECT {} FROM rss_feed_configs WHERE url = ?1", FEED_COLUMNS);
    conn.query_row(&sql, [url], feed_from_row).optional()
}

pub fn list_feeds(conn: &Connection) -> Result<Vec<FeedConfig>, RusqliteError> {
    let sql = format!("SELECT {} FROM rss_feed_configs ORDER BY brand_name COLLATE NOCASE", FEED_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], feed_from_row)?;
    rows.collect()
}

/// Active feeds whose interval has elapsed, least recently fetched first.
pub fn due_feeds(conn: &Connection, now: DateTime<Utc>, limit: usize) -> Result<Vec<FeedConfig>, RusqliteError> {
    let sql = format!(
        "SELECT {} FROM rss_feed_configs WHERE is_active = 1 ORDER BY last_fetched_at IS NOT NULL, last_fetched_at",
        FEED_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], feed_from_row)?;
    let mut due = Vec::new();
    for feed in rows {
        let feed = feed?;
        if feed.is_due(now) {
            due.push(feed);
            if due.len() >= limit {
                break;
            }
        }
    }
    Ok(due)
}

pub fn update_feed(
    conn: &Connection,
    id: i64,
    url: &str,
    brand_name: &str,
    is_active: bool,
    fetch_interval_minutes: u32,
    default_status: PostStatus,
) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE rss_feed_configs SET url = ?1, brand_name = ?2, is_active = ?3, fetch_interval_minutes = ?4, default_status = ?5, updated_at = ?6 WHERE id = ?7",
        params![url, brand_name, is_active, fetch_interval_minutes, default_status.as_str(), to_db_time(&Utc::now()), id],
    )
}

pub fn delete_feed(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM rss_feed_configs WHERE id = ?1", [id])
}

pub fn record_fetch_success(conn: &Connection, id: i64, item_count: u32, at: DateTime<Utc>) -> Result<(), RusqliteError> {
    conn.execute(
        "UPDATE rss_feed_configs SET last_fetched_at = ?1, last_fetch_status = 'success', last_error_message = NULL, last_item_count = ?2 WHERE id = ?3",
        params![to_db_time(&at), item_count, id],
    )?;
    Ok(())
}

/// A failed fetch still stamps `last_fetched_at` so the feed waits for its next interval.
pub fn record_fetch_error(conn: &Connection, id: i64, message: &str, at: DateTime<Utc>) -> Result<(), RusqliteError> {
    conn.execute(
        "UPDATE rss_feed_configs SET last_fetched_at = ?1, last_fetch_status = 'error', last_error_message = ?2 WHERE id = ?3",
        params![to_db_time(&at), message, id],
    )?;
    Ok(())
}

// --- Fetch history ---

pub struct NewFetchRun<'a> {
    pub feed_id: Option<i64>,
    pub feed_url: &'a str,
    pub status: FetchStatus,
    pub items_found: u32,
    pub saved: u32,
    pub errors: u32,
    pub error_message: Option<&'a str>,
    pub triggered_by: &'a str,
}

pub fn insert_fetch_run(conn: &Connection, run: &NewFetchRun) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO rss_fetch_runs (feed_id, feed_url, status, items_found, saved, errors, error_message, triggered_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.feed_id,
            run.feed_url,
            run.status.as_str(),
            run.items_found,
            run.saved,
            run.errors,
            run.error_message,
            run.triggered_by,
            to_db_time(&Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_fetch_runs(conn: &Connection, feed_id: Option<i64>) -> Result<u64, RusqliteError> {
    conn.query_row(
        "SELECT COUNT(*) FROM rss_fetch_runs WHERE (?1 IS NULL OR feed_id = ?1)",
        params![feed_id],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

pub fn list_fetch_runs(
    conn: &Connection,
    feed_id: Option<i64>,
    limit: u32,
    offset: u32,
) -> Result<Vec<FetchRun>, RusqliteError> {
    let sql = format!(
        "SELECT {} FROM rss_fetch_runs WHERE (?1 IS NULL OR feed_id = ?1) ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        RUN_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![feed_id, limit, offset], run_from_row)?;
    rows.collect()
}

pub fn clear_fetch_runs(conn: &Connection) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM rss_fetch_runs", [])
}
