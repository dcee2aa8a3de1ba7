use crate::error::ApiError;
use crate::helper::notification_helpers;
use crate::helper::post_helpers::Transition;
use crate::{AppState, DbPool};
use actix_web::{error, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

pub mod activities;
pub mod approval;
pub mod auth;
pub mod categories;
pub mod notifications;
pub mod posts;
pub mod push;
pub mod rss;
pub mod scheduler;
pub mod subscriptions;
pub mod users;

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .route("/health", web::get().to(health))
            .configure(auth::config)
            .configure(posts::config)
            .configure(approval::config)
            .configure(categories::config)
            .configure(scheduler::config)
            .configure(rss::config)
            .configure(subscriptions::config)
            .configure(notifications::config)
            .configure(push::config)
            .configure(activities::config)
            .configure(users::config),
    );
}

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::Validation(format!("Invalid request body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::Validation(format!("Invalid query string: {}", err)).into()
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "success": true, "message": "active" }))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Validation(format!("'{}' is not a valid id.", raw)))
}

/// Notifies subscribers when a transition took a post live.
pub(crate) async fn announce(pool: &DbPool, state: &AppState, transition: &Transition) {
    if transition.newly_published {
        notification_helpers::fan_out(pool, state.push_gateway.as_ref(), &transition.post, Utc::now()).await;
    }
}

/// Human summary of where a transition left the post.
pub(crate) fn transition_message(transition: &Transition) -> &'static str {
    use crate::models::PostStatus;
    match (&transition.revision, transition.post.status) {
        (Some(r), _) if r.approval_status.is_outstanding() => "Submitted for approval.",
        (_, PostStatus::Published) => "Post published.",
        (_, PostStatus::Scheduled) => "Post scheduled.",
        (_, PostStatus::Draft) => "Post moved to draft.",
        (_, PostStatus::Archived) => "Post archived.",
        (_, PostStatus::PendingApproval) => "Post is awaiting approval.",
    }
}
