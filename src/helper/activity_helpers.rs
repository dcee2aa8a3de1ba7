use crate::config::Config;
use crate::models::activity_models::{Activity, NewActivity};
use crate::models::db_operations::activity_db_operations::{self, ActivityFilter};
use crate::models::{Page, PageRequest, User};
use rusqlite::Connection;

/// Appends an audit entry. A failed write is logged and never fails the caller's transition.
pub fn record(conn: &Connection, config: &Config, activity: NewActivity) {
    let ttl = config.activity_ttl(activity.event.severity());
    if let Err(e) = activity_db_operations::insert_activity(conn, &activity, ttl) {
        log::error!(
            "Failed to record '{}' activity for '{}': {}",
            activity.event.activity_type(),
            activity.actor.name,
            e
        );
    }
}

/// Superadmins see every entry; admins only their own.
pub fn list_for(
    conn: &Connection,
    viewer: &User,
    activity_type: Option<String>,
    page: PageRequest,
) -> Result<Page<Activity>, rusqlite::Error> {
    let filter = ActivityFilter {
        activity_type: activity_type.filter(|t| !t.trim().is_empty()),
        actor_id: if viewer.is_superadmin() { None } else { Some(viewer.id) },
        post_id: None,
    };
    let total = activity_db_operations::count_activities(conn, &filter)?;
    let items = activity_db_operations::list_activities(conn, &filter, page.limit, page.offset())?;
    Ok(Page::new(items, total, page))
}
