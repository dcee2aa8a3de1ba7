use crate::error::{created_json, ok_json, ok_message, ApiError};
use crate::helper::notification_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::notifications_db_operations;
use crate::{AppState, DbPool};
use actix_web::{http::header::USER_AGENT, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/push/subscribe", web::post().to(subscribe))
        .route("/push/unsubscribe", web::post().to(unsubscribe))
        .route("/push/vapid-public-key", web::get().to(vapid_public_key))
        .route("/push/test", web::post().to(test_push));
}

#[derive(Debug, Deserialize)]
struct PushKeys {
    p256dh: String,
    auth: String,
}

/// The browser's `PushSubscription.toJSON()` shape.
#[derive(Debug, Deserialize)]
struct SubscribeBody {
    endpoint: String,
    keys: PushKeys,
}

#[derive(Debug, Deserialize)]
struct UnsubscribeBody {
    endpoint: String,
}

fn require_field<'a>(value: &'a str, name: &str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} is required.", name)));
    }
    Ok(value)
}

async fn subscribe(
    user: AuthenticatedUser,
    req: HttpRequest,
    pool: web::Data<DbPool>,
    body: web::Json<SubscribeBody>,
) -> Result<HttpResponse, ApiError> {
    let endpoint = require_field(&body.endpoint, "endpoint")?;
    if url::Url::parse(endpoint).map(|u| u.scheme() != "https").unwrap_or(true) {
        return Err(ApiError::Validation("endpoint must be an https URL.".to_string()));
    }
    let p256dh = require_field(&body.keys.p256dh, "keys.p256dh")?;
    let auth = require_field(&body.keys.auth, "keys.auth")?;
    let user_agent = req.headers().get(USER_AGENT).and_then(|v| v.to_str().ok());

    let conn = pool.get()?;
    let subscription = notifications_db_operations::upsert_push_subscription(&conn, user.id, endpoint, p256dh, auth, user_agent)?;
    Ok(created_json("Push subscription saved.", subscription))
}

async fn unsubscribe(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    body: web::Json<UnsubscribeBody>,
) -> Result<HttpResponse, ApiError> {
    let endpoint = require_field(&body.endpoint, "endpoint")?;
    let conn = pool.get()?;
    if notifications_db_operations::delete_push_subscription(&conn, user.id, endpoint)? == 0 {
        return Err(ApiError::not_found("Push subscription"));
    }
    Ok(ok_message("Push subscription removed."))
}

async fn vapid_public_key(_user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    match state.push_gateway.public_key() {
        Some(key) => Ok(ok_json("VAPID public key.", json!({ "publicKey": key }))),
        None => Err(ApiError::NotFound("Web push is not configured on this server.".to_string())),
    }
}

async fn test_push(user: AuthenticatedUser, pool: web::Data<DbPool>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let report = notification_helpers::send_test_push(&pool, state.push_gateway.as_ref(), &user).await?;
    Ok(ok_json("Test notification sent.", report))
}
