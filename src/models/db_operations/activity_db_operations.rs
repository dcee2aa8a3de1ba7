use crate::models::activity_models::{Activity, ActivityEvent, NewActivity, Severity};
use crate::models::db_operations::{invalid_column, time_column, to_db_time};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Error as RusqliteError, Row};
use uuid::Uuid;

const ACTIVITY_COLUMNS: &str =
    "id, activity_type, actor_id, actor_name, title, post_id, revision_id, event, severity, created_at, expires_at";

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub activity_type: Option<String>,
    pub actor_id: Option<i64>,
    pub post_id: Option<Uuid>,
}

fn opt_uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| invalid_column(idx, e.to_string())))
        .transpose()
}

fn activity_from_row(row: &Row) -> rusqlite::Result<Activity> {
    let event_raw: String = row.get(7)?;
    let event: ActivityEvent = serde_json::from_str(&event_raw).map_err(|e| invalid_column(7, e.to_string()))?;
    let severity_raw: String = row.get(8)?;
    let severity = Severity::parse(&severity_raw)
        .ok_or_else(|| invalid_column(8, format!("unknown severity '{}'", severity_raw)))?;
    Ok(Activity {
        id: row.get(0)?,
        activity_type: row.get(1)?,
        actor_id: row.get(2)?,
        actor_name: row.get(3)?,
        title: row.get(4)?,
        post_id: opt_uuid_column(row, 5)?,
        revision_id: opt_uuid_column(row, 6)?,
        event,
        severity,
        created_at: time_column(row, 9)?,
        expires_at: time_column(row, 10)?,
    })
}

/// Appends an entry; `ttl` is how long entries of this severity are retained.
pub fn insert_activity(conn: &Connection, activity: &NewActivity, ttl: Duration) -> Result<i64, RusqliteError> {
    let now = Utc::now();
    let event_json =
        serde_json::to_string(&activity.event).map_err(|e| RusqliteError::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO activities (activity_type, actor_id, actor_name, title, post_id, revision_id, event, severity, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            activity.event.activity_type(),
            activity.actor.id,
            activity.actor.name,
            activity.title,
            activity.post_id.map(|id| id.to_string()),
            activity.revision_id.map(|id| id.to_string()),
            event_json,
            activity.event.severity().as_str(),
            to_db_time(&now),
            to_db_time(&(now + ttl)),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const FILTER_CLAUSE: &str = "(?1 IS NULL OR activity_type = ?1) AND (?2 IS NULL OR actor_id = ?2) AND (?3 IS NULL OR post_id = ?3)";

pub fn count_activities(conn: &Connection, filter: &ActivityFilter) -> Result<u64, RusqliteError> {
    let sql = format!("SELECT COUNT(*) FROM activities WHERE {}", FILTER_CLAUSE);
    conn.query_row(
        &sql,
        params![filter.activity_type, filter.actor_id, filter.post_id.map(|id| id.to_string())],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

pub fn list_activities(
    conn: &Connection,
    filter: &ActivityFilter,
    limit: u32,
    offset: u32,
) -> Result<Vec<Activity>, RusqliteError> {
    let sql = format!(
        "SELECT {} FROM activities WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?4 OFFSET ?5",
        ACTIVITY_COLUMNS, FILTER_CLAUSE
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            filter.activity_type,
            filter.actor_id,
            filter.post_id.map(|id| id.to_string()),
            limit,
            offset
        ],
        activity_from_row,
    )?;
    rows.collect()
}

/// Removes entries whose retention period has elapsed.
pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM activities WHERE expires_at <= ?1", [to_db_time(&now)])
}
