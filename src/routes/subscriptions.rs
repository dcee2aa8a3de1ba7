use crate::config::Config;
use crate::error::{created_json, ok_json, ok_message, ApiError};
use crate::helper::notification_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::notifications_db_operations;
use crate::models::notification_models::SubscriptionInput;
use crate::DbPool;
use actix_web::{web, HttpResponse};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/rss-subscriptions", web::get().to(list_subscriptions))
        .route("/rss-subscriptions", web::post().to(create_subscription))
        .route("/rss-subscriptions/{id}", web::get().to(get_subscription))
        .route("/rss-subscriptions/{id}", web::put().to(update_subscription))
        .route("/rss-subscriptions/{id}", web::delete().to(delete_subscription));
}

async fn list_subscriptions(user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let subscriptions = notifications_db_operations::list_subscriptions_for_user(&conn, user.id)?;
    Ok(ok_json("Subscriptions retrieved.", subscriptions))
}

async fn get_subscription(user: AuthenticatedUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(ok_json("Subscription retrieved.", notification_helpers::load_own_subscription(&conn, &user, *id)?))
}

async fn create_subscription(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<SubscriptionInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let record = notification_helpers::validate_subscription(&conn, &config, &body)?;
    let subscription = notifications_db_operations::create_subscription(&conn, user.id, &record)?;
    Ok(created_json("Subscription created.", subscription))
}

async fn update_subscription(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
    body: web::Json<SubscriptionInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let existing = notification_helpers::load_own_subscription(&conn, &user, *id)?;
    let record = notification_helpers::validate_subscription(&conn, &config, &body)?;
    notifications_db_operations::update_subscription(&conn, existing.id, &record)?;
    let updated = notification_helpers::load_own_subscription(&conn, &user, existing.id)?;
    Ok(ok_json("Subscription updated.", updated))
}

async fn delete_subscription(user: AuthenticatedUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let existing = notification_helpers::load_own_subscription(&conn, &user, *id)?;
    notifications_db_operations::delete_subscription(&conn, existing.id)?;
    Ok(ok_message("Subscription deleted."))
}
