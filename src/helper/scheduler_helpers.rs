use crate::config::Config;
use crate::error::ApiError;
use crate::helper::activity_helpers;
use crate::helper::notification_helpers::{self, PushGateway};
use crate::helper::workflow;
use crate::middleware::require_superadmin;
use crate::models::activity_models::{ActivityEvent, Actor, NewActivity};
use crate::models::db_operations::{activity_db_operations, notifications_db_operations, posts_db_operations, users_db_operations};
use crate::models::notification_models::FanOutReport;
use crate::models::{Post, PostStatus, User};
use crate::DbPool;
use chrono::{DateTime, Duration, Utc};
use redb::Database;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const TIMEZONE_KEY: &str = "display_timezone";
// Deliveries older than the widest throttle window are no longer counted.
const DELIVERY_RETENTION_DAYS: i64 = 2;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
    pub notifications: FanOutReport,
    pub purged_activities: usize,
    pub purged_deliveries: usize,
}

/// Re-reads the post so a schedule cancelled since the scan is not published.
fn still_due(db: &Database, post: &Post, now: DateTime<Utc>) -> Result<Option<Post>, ApiError> {
    let current = posts_db_operations::read_post(db, &post.id)?;
    Ok(current.filter(|p| {
        p.status == PostStatus::Scheduled
            && p.is_scheduled
            && p.schedule_approved
            && p.publish_date_time.map_or(false, |t| t <= now)
    }))
}

async fn publish_due(
    db: &Database,
    pool: &DbPool,
    config: &Config,
    gateway: &dyn PushGateway,
    post: &Post,
    now: DateTime<Utc>,
    report: &mut TickReport,
) -> Result<(), ApiError> {
    let Some(mut post) = still_due(db, post, now)? else {
        log::debug!("Post {} is no longer due; skipping", post.id);
        return Ok(());
    };
    let due_at = post.publish_date_time;
    workflow::publish_now(&mut post, Actor::SYSTEM_NAME, now);
    posts_db_operations::save_post(db, &post)?;
    report.published += 1;

    let fan_out = notification_helpers::fan_out(pool, gateway, &post, now).await;
    let recipients = fan_out.recipients;
    report.notifications.absorb(fan_out);

    let conn = pool.get()?;
    activity_helpers::record(
        &conn,
        config,
        NewActivity::new(Actor::system(), post.title.clone(), ActivityEvent::ScheduledPublish { due_at, recipients })
            .for_post(post.id),
    );
    log::info!("Auto-published post {} ('{}')", post.id, post.title);
    Ok(())
}

fn housekeeping(conn: &Connection, now: DateTime<Utc>, report: &mut TickReport) {
    match activity_db_operations::purge_expired(conn, now) {
        Ok(n) => report.purged_activities = n,
        Err(e) => log::error!("Failed to purge expired activities: {}", e),
    }
    match notifications_db_operations::purge_deliveries_before(conn, now - Duration::days(DELIVERY_RETENTION_DAYS)) {
        Ok(n) => report.purged_deliveries = n,
        Err(e) => log::error!("Failed to purge old notification deliveries: {}", e),
    }
}

/// One scheduler pass: publishes approved posts due within the lookback window.
/// A failing post is logged and does not stop the batch.
pub async fn run_tick(
    db: &Database,
    pool: &DbPool,
    config: &Config,
    gateway: &dyn PushGateway,
    now: DateTime<Utc>,
) -> Result<TickReport, ApiError> {
    let from = now - Duration::minutes(config.scheduler.lookback_minutes);
    let due = posts_db_operations::due_scheduled_posts(db, from, now)?;
    let mut report = TickReport { due: due.len(), ..TickReport::default() };

    for post in &due {
        if let Err(e) = publish_due(db, pool, config, gateway, post, now, &mut report).await {
            report.failed += 1;
            log::error!("Failed to auto-publish post {}: {}", post.id, e);
        }
    }

    let conn = pool.get()?;
    housekeeping(&conn, now, &mut report);

    if report.due > 0 {
        log::info!(
            "Scheduler tick: {} due, {} published, {} failed",
            report.due,
            report.published,
            report.failed
        );
    }
    Ok(report)
}

// ====================================================================
// ============================= TIMEZONE =============================
// ====================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneSetting {
    pub label: String,
    pub offset_minutes: i32,
}

impl Default for TimezoneSetting {
    fn default() -> Self {
        TimezoneSetting { label: "UTC".to_string(), offset_minutes: 0 }
    }
}

impl TimezoneSetting {
    fn validate(&self) -> Result<(), ApiError> {
        if self.label.trim().is_empty() {
            return Err(ApiError::Validation("Timezone label is required.".to_string()));
        }
        if !(-12 * 60..=14 * 60).contains(&self.offset_minutes) {
            return Err(ApiError::Validation("offsetMinutes must be between -720 and 840.".to_string()));
        }
        Ok(())
    }
}

pub fn get_timezone(conn: &Connection) -> TimezoneSetting {
    users_db_operations::read_setting(conn, TIMEZONE_KEY)
        .and_then(|raw| match serde_json::from_str(&raw) {
            Ok(setting) => Some(setting),
            Err(e) => {
                log::warn!("Ignoring malformed timezone setting: {}", e);
                None
            }
        })
        .unwrap_or_default()
}

pub fn set_timezone(conn: &Connection, actor: &User, setting: TimezoneSetting) -> Result<TimezoneSetting, ApiError> {
    require_superadmin(actor)?;
    let setting = TimezoneSetting { label: setting.label.trim().to_string(), ..setting };
    setting.validate()?;
    let raw = serde_json::to_string(&setting).map_err(|e| ApiError::Internal(e.to_string()))?;
    users_db_operations::update_setting(conn, TIMEZONE_KEY, &raw)?;
    Ok(setting)
}
