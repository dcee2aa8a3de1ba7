use crate::error::{ok_json, ok_message, paginated, ApiError};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::notifications_db_operations;
use crate::models::{Page, PageRequest};
use crate::DbPool;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/notifications/in-app", web::get().to(list_notifications))
        .route("/notifications/in-app/count", web::get().to(unread_count))
        .route("/notifications/in-app/read-all", web::post().to(mark_all_read))
        .route("/notifications/in-app/{id}/read", web::post().to(mark_read))
        .route("/notifications/in-app/{id}", web::delete().to(delete_notification));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_notifications(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, ApiError> {
    let request = PageRequest::new(query.page, query.limit);
    let conn = pool.get()?;
    let total = notifications_db_operations::count_notifications(&conn, user.id, query.unread_only)?;
    let items = notifications_db_operations::list_notifications(&conn, user.id, query.unread_only, request.limit, request.offset())?;
    Ok(paginated("Notifications retrieved.", Page::new(items, total, request)))
}

async fn unread_count(user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let unread = notifications_db_operations::count_notifications(&conn, user.id, true)?;
    Ok(ok_json("Unread count retrieved.", json!({ "unread": unread })))
}

async fn mark_read(user: AuthenticatedUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    if notifications_db_operations::mark_read(&conn, user.id, *id)? == 0 {
        return Err(ApiError::not_found(format!("Notification {}", id)));
    }
    Ok(ok_message("Notification marked as read."))
}

async fn mark_all_read(user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let updated = notifications_db_operations::mark_all_read(&conn, user.id)?;
    Ok(ok_json("All notifications marked as read.", json!({ "updated": updated })))
}

async fn delete_notification(user: AuthenticatedUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    if notifications_db_operations::delete_notification(&conn, user.id, *id)? == 0 {
        return Err(ApiError::not_found(format!("Notification {}", id)));
    }
    Ok(ok_message("Notification deleted."))
}
