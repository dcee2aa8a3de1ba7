use crate::config::Config;
use crate::error::{created_json, ok_json, paginated, ApiError};
use crate::helper::approval_helpers;
use crate::helper::post_helpers::{PostInput, Transition};
use crate::middleware::AuthenticatedUser;
use crate::models::{ApprovalStatus, PageRequest, User};
use crate::routes::{announce, parse_uuid, transition_message};
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use redb::Database;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/approval/posts", web::get().to(list_revisions))
        .route("/approval/posts", web::post().to(submit_new))
        .route("/approval/my-posts", web::get().to(my_revisions))
        .route("/approval/posts/{id}", web::get().to(get_revision))
        .route("/approval/posts/{id}", web::put().to(resubmit))
        .route("/approval/posts/{id}/approve", web::post().to(approve))
        .route("/approval/posts/{id}/reject", web::post().to(reject))
        .route("/approval/posts/{id}/request-changes", web::post().to(request_changes))
        .route("/approval/posts/{id}/approve-schedule", web::post().to(approve_schedule))
        .route("/approval/posts/{id}/reject-schedule", web::post().to(reject_schedule));
}

#[derive(Debug, Deserialize)]
struct RevisionListQuery {
    status: Option<ApprovalStatus>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ReasonBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize, Default)]
struct NotesBody {
    #[serde(default)]
    notes: String,
}

async fn list_revisions(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    query: web::Query<RevisionListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = approval_helpers::list_revisions(&db, &user, query.status, PageRequest::new(query.page, query.limit))?;
    Ok(paginated("Revisions retrieved.", page))
}

async fn my_revisions(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    query: web::Query<RevisionListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = approval_helpers::my_revisions(&db, &user, query.status, PageRequest::new(query.page, query.limit))?;
    Ok(paginated("Your submissions retrieved.", page))
}

async fn get_revision(user: AuthenticatedUser, db: web::Data<Database>, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let view = approval_helpers::get_revision(&db, &user, &parse_uuid(&id)?)?;
    Ok(ok_json("Revision retrieved.", view))
}

async fn submit_new(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<PostInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let transition = approval_helpers::submit_new(&db, &conn, &config, &user, &body, Utc::now())?;
    Ok(created_json("Submitted for approval.", transition))
}

async fn resubmit(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<String>,
    body: web::Json<PostInput>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let conn = pool.get()?;
    let transition = approval_helpers::resubmit(&db, &conn, &config, &user, &id, &body, Utc::now())?;
    Ok(ok_json("Resubmitted for approval.", transition))
}

type Resolution<'a> =
    Box<dyn FnOnce(&Database, &Connection, &Config, &User, &Uuid, DateTime<Utc>) -> Result<Transition, ApiError> + 'a>;

/// Runs a superadmin resolution and fans out if it made the post live.
async fn resolve(
    user: &User,
    db: &Database,
    pool: &DbPool,
    config: &Config,
    state: &AppState,
    raw_id: &str,
    resolution: Resolution<'_>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(raw_id)?;
    let transition = {
        let conn = pool.get()?;
        resolution(db, &conn, config, user, &id, Utc::now())?
    };
    announce(pool, state, &transition).await;
    Ok(ok_json(transition_message(&transition), transition))
}

async fn approve(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    resolve(&user, &db, &pool, &config, &state, &id, Box::new(approval_helpers::approve)).await
}

async fn approve_schedule(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    resolve(&user, &db, &pool, &config, &state, &id, Box::new(approval_helpers::approve_schedule)).await
}

async fn reject(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: Option<web::Json<ReasonBody>>,
) -> Result<HttpResponse, ApiError> {
    let reason = body.map(|b| b.into_inner().reason).unwrap_or_default();
    resolve(
        &user,
        &db,
        &pool,
        &config,
        &state,
        &id,
        Box::new(|db, conn, config, user, id, now| approval_helpers::reject(db, conn, config, user, id, &reason, now)),
    )
    .await
}

async fn reject_schedule(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: Option<web::Json<ReasonBody>>,
) -> Result<HttpResponse, ApiError> {
    let reason = body.map(|b| b.into_inner().reason).unwrap_or_default();
    resolve(
        &user,
        &db,
        &pool,
        &config,
        &state,
        &id,
        Box::new(|db, conn, config, user, id, now| approval_helpers::reject_schedule(db, conn, config, user, id, &reason, now)),
    )
    .await
}

async fn request_changes(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: Option<web::Json<NotesBody>>,
) -> Result<HttpResponse, ApiError> {
    let notes = body.map(|b| b.into_inner().notes).unwrap_or_default();
    resolve(
        &user,
        &db,
        &pool,
        &config,
        &state,
        &id,
        Box::new(|db, conn, config, user, id, now| approval_helpers::request_changes(db, conn, config, user, id, &notes, now)),
    )
    .await
}
