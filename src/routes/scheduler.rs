use crate::config::Config;
use crate::error::{ok_json, paginated, ApiError, PageQuery};
use crate::helper::post_helpers;
use crate::helper::scheduler_helpers::{self, TimezoneSetting};
use crate::middleware::{require_superadmin, AuthenticatedUser};
use crate::models::Page;
use crate::tasks;
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse};
use redb::Database;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/scheduler/posts", web::get().to(scheduled_posts))
        .route("/scheduler/timezone", web::get().to(get_timezone))
        .route("/scheduler/timezone", web::put().to(set_timezone))
        .route("/scheduler/trigger-auto-publish", web::post().to(trigger_auto_publish));
}

async fn scheduled_posts(_user: AuthenticatedUser, db: web::Data<Database>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let posts = post_helpers::scheduled_posts(&db)?;
    Ok(paginated("Scheduled posts retrieved.", Page::from_vec(posts, query.request())))
}

async fn get_timezone(_user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(ok_json("Timezone retrieved.", scheduler_helpers::get_timezone(&conn)))
}

async fn set_timezone(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    body: web::Json<TimezoneSetting>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let setting = scheduler_helpers::set_timezone(&conn, &user, body.into_inner())?;
    Ok(ok_json("Timezone updated.", setting))
}

async fn trigger_auto_publish(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_superadmin(&user)?;
    match tasks::scheduler_pass(&db, &pool, &config, &state).await {
        Some(report) => Ok(ok_json("Auto-publish run completed.", report?)),
        None => Err(ApiError::Conflict("Auto-publish is already running.".to_string())),
    }
}
