use crate::models::db_operations::{invalid_column, opt_time_column, time_column, to_db_time};
use crate::models::notification_models::{Channels, Notification, PushSubscription, Subscription, SubscriptionType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, subscription_type, feed_id, category_id, in_app, web_push, email, \
     max_per_hour, max_per_day, is_active, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, post_id, title, message, link, is_read, created_at, read_at";

const PUSH_COLUMNS: &str = "id, user_id, endpoint, p256dh, auth, user_agent, created_at, last_used_at";

fn subscription_from_row(row: &Row) -> rusqlite::Result<Subscription> {
    let type_raw: String = row.get(2)?;
    let subscription_type = SubscriptionType::parse(&type_raw)
        .ok_or_else(|| invalid_column(2, format!("unknown subscription type '{}'", type_raw)))?;
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subscription_type,
        feed_id: row.get(3)?,
        category_id: row.get(4)?,
        channels: Channels { in_app: row.get(5)?, web_push: row.get(6)?, email: row.get(7)? },
        max_per_hour: row.get(8)?,
        max_per_day: row.get(9)?,
        is_active: row.get(10)?,
        created_at: time_column(row, 11)?,
        updated_at: time_column(row, 12)?,
    })
}

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    let post_raw: Option<String> = row.get(2)?;
    let post_id = post_raw
        .map(|s| Uuid::parse_str(&s).map_err(|e| invalid_column(2, e.to_string())))
        .transpose()?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_id,
        title: row.get(3)?,
        message: row.get(4)?,
        link: row.get(5)?,
        is_read: row.get(6)?,
        created_at: time_column(row, 7)?,
        read_at: opt_time_column(row, 8)?,
    })
}

fn push_from_row(row: &Row) -> rusqlite::Result<PushSubscription> {
    Ok(PushSubscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        endpoint: row.get(2)?,
        p256dh: row.get(3)?,
        auth: row.get(4)?,
        user_agent: row.get(5)?,
        created_at: time_column(row, 6)?,
        last_used_at: opt_time_column(row, 7)?,
    })
}

// --- Subscriptions ---

pub struct SubscriptionRecord {
    pub subscription_type: SubscriptionType,
    pub feed_id: Option<i64>,
    pub category_id: Option<i64>,
    pub channels: Channels,
    pub max_per_hour: u32,
    pub max_per_day: u32,
    pub is_active: bool,
}

pub fn create_subscription(
    conn: &Connection,
    user_id: i64,
    record: &SubscriptionRecord,
) -> Result<Subscription, RusqliteError> {
    let now = to_db_time(&Utc::now());
    conn.execute(
        "INSERT INTO rss_subscriptions (user_id, subscription_type, feed_id, category_id, in_app, web_push, email, max_per_hour, max_per_day, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            user_id,
            record.subscription_type.as_str(),
            record.feed_id,
            record.category_id,
            record.channels.in_app,
            record.channels.web_push,
            record.channels.email,
            record.max_per_hour,
            record.max_per_day,
            record.is_active,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    read_subscription(conn, id)?.ok_or(RusqliteError::QueryReturnedNoRows)
}

pub fn read_subscription(conn: &Connection, id: i64) -> Result<Option<Subscription>, RusqliteError> {
    let sql = format!("SELECT {} FROM rss_subscriptions WHERE id = ?1", SUBSCRIPTION_COLUMNS);
    conn.query_row(&sql, [id], subscription_from_row).optional()
}

pub fn list_subscriptions_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Subscription>, RusqliteError> {
    let sql = format!("SELECT {} FROM rss_subscriptions WHERE user_id = ?1 ORDER BY id", SUBSCRIPTION_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id], subscription_from_row)?;
    rows.collect()
}

pub fn update_subscription(conn: &Connection, id: i64, record: &SubscriptionRecord) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE rss_subscriptions SET subscription_type = ?1, feed_id = ?2, category_id = ?3, in_app = ?4, web_push = ?5, email = ?6,
             max_per_hour = ?7, max_per_day = ?8, is_active = ?9, updated_at = ?10 WHERE id = ?11",
        params![
            record.subscription_type.as_str(),
            record.feed_id,
            record.category_id,
            record.channels.in_app,
            record.channels.web_push,
            record.channels.email,
            record.max_per_hour,
            record.max_per_day,
            record.is_active,
            to_db_time(&Utc::now()),
            id,
        ],
    )
}

pub fn delete_subscription(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM rss_subscriptions WHERE id = ?1", [id])
}

/// Active subscriptions of active users that match an event from `feed_id` in `category_id`.
pub fn matching_subscriptions(
    conn: &Connection,
    feed_id: Option<i64>,
    category_id: i64,
) -> Result<Vec<Subscription>, RusqliteError> {
    let sql = format!(
        "SELECT {} FROM rss_subscriptions s
         WHERE s.is_active = 1
           AND EXISTS (SELECT 1 FROM users u WHERE u.id = s.user_id AND u.is_active = 1)
           AND (s.subscription_type = 'all'
                OR (s.subscription_type = 'feed' AND ?1 IS NOT NULL AND s.feed_id = ?1)
                OR (s.subscription_type = 'category' AND s.category_id = ?2))
         ORDER BY s.user_id, s.id",
        SUBSCRIPTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![feed_id, category_id], subscription_from_row)?;
    rows.collect()
}

// --- In-app notifications ---

pub fn insert_notification(
    conn: &Connection,
    user_id: i64,
    post_id: Option<Uuid>,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO notifications (user_id, post_id, title, message, link, is_read, created_at) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![user_id, post_id.map(|id| id.to_string()), title, message, link, to_db_time(&Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_notifications(conn: &Connection, user_id: i64, unread_only: bool) -> Result<u64, RusqliteError> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)",
        params![user_id, unread_only],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

pub fn list_notifications(
    conn: &Connection,
    user_id: i64,
    unread_only: bool,
    limit: u32,
    offset: u32,
) -> Result<Vec<Notification>, RusqliteError> {
    let sql = format!(
        "SELECT {} FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0) ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
        NOTIFICATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, unread_only, limit, offset], notification_from_row)?;
    rows.collect()
}

/// Scoped to the owner; returns 0 when the notification belongs to someone else.
pub fn mark_read(conn: &Connection, user_id: i64, id: i64) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?1) WHERE id = ?2 AND user_id = ?3",
        params![to_db_time(&Utc::now()), id, user_id],
    )
}

pub fn mark_all_read(conn: &Connection, user_id: i64) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE notifications SET is_read = 1, read_at = ?1 WHERE user_id = ?2 AND is_read = 0",
        params![to_db_time(&Utc::now()), user_id],
    )
}

pub fn delete_notification(conn: &Connection, user_id: i64, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM notifications WHERE id = ?1 AND user_id = ?2", params![id, user_id])
}

// --- Delivery ledger used for throttling ---

pub fn record_delivery(conn: &Connection, user_id: i64, post_id: Option<Uuid>, at: DateTime<Utc>) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT INTO notification_deliveries (user_id, post_id, delivered_at) VALUES (?1, ?2, ?3)",
        params![user_id, post_id.map(|id| id.to_string()), to_db_time(&at)],
    )?;
    Ok(())
}

pub fn count_deliveries_since(conn: &Connection, user_id: i64, since: DateTime<Utc>) -> Result<u32, RusqliteError> {
    conn.query_row(
        "SELECT COUNT(*) FROM notification_deliveries WHERE user_id = ?1 AND delivered_at > ?2",
        params![user_id, to_db_time(&since)],
        |row| row.get::<_, u32>(0),
    )
}

pub fn purge_deliveries_before(conn: &Connection, before: DateTime<Utc>) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM notification_deliveries WHERE delivered_at <= ?1", [to_db_time(&before)])
}

// --- Web push endpoints ---

/// Registers an endpoint, moving it to `user_id` if another account had it.
pub fn upsert_push_subscription(
    conn: &Connection,
    user_id: i64,
    endpoint: &str,
    p256dh: &str,
    auth: &str,
    user_agent: Option<&str>,
) -> Result<PushSubscription, RusqliteError> {
    conn.execute(
        "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth, user_agent, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(endpoint) DO UPDATE SET user_id = excluded.user_id, p256dh = excluded.p256dh, auth = excluded.auth, user_agent = excluded.user_agent",
        params![user_id, endpoint, p256dh, auth, user_agent, to_db_time(&Utc::now())],
    )?;
    let sql = format!("SELECT {} FROM push_subscriptions WHERE endpoint = ?1", PUSH_COLUMNS);
    conn.query_row(&sql, [endpoint], push_from_row)
}

pub fn push_subscriptions_for_user(conn: &Connection, user_id: i64) -> Result<Vec<PushSubscription>, RusqliteError> {
    let sql = format!("SELECT {} FROM push_subscriptions WHERE user_id = ?1 ORDER BY id", PUSH_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id], push_from_row)?;
    rows.collect()
}

pub fn delete_push_subscription(conn: &Connection, user_id: i64, endpoint: &str) -> Result<usize, RusqliteError> {
    conn.execute(
        "DELETE FROM push_subscriptions WHERE user_id = ?1 AND endpoint = ?2",
        params![user_id, endpoint],
    )
}

/// Drops an endpoint the push service reported as gone.
pub fn prune_push_endpoint(conn: &Connection, endpoint: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM push_subscriptions WHERE endpoint = ?1", [endpoint])
}

pub fn touch_push_subscription(conn: &Connection, id: i64) -> Result<(), RusqliteError> {
    conn.execute(
        "UPDATE push_subscriptions SET last_used_at = ?1 WHERE id = ?2",
        params![to_db_time(&Utc::now()), id],
    )?;
    Ok(())
}
