use crate::config::Config;
use crate::error::{created_json, ok_json, ok_message, paginated, ApiError, PageQuery};
use crate::helper::{approval_helpers, post_helpers, post_helpers::PostInput};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::posts_db_operations::PostFilter;
use crate::models::{Page, PageRequest, PostStatus};
use crate::routes::{announce, parse_uuid, transition_message};
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use redb::Database;
use serde::Deserialize;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(list_posts))
        .route("/posts", web::post().to(create_post))
        .route("/posts/draft", web::post().to(save_draft))
        .route("/posts/scheduled", web::get().to(scheduled_posts))
        .route("/posts/pending-schedule-approvals", web::get().to(pending_schedule_approvals))
        .route("/posts/{id}", web::get().to(get_post))
        .route("/posts/{id}", web::put().to(update_post))
        .route("/posts/{id}", web::delete().to(delete_post))
        .route("/posts/{id}/publish", web::post().to(publish_post))
        .route("/posts/{id}/request-update", web::post().to(request_update))
        .route("/posts/{id}/submit-for-approval", web::post().to(submit_for_approval))
        .route("/posts/{id}/cancel-schedule", web::post().to(cancel_schedule))
        .route("/posts/{id}/archive", web::post().to(archive_post));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostListQuery {
    status: Option<PostStatus>,
    category_id: Option<i64>,
    author_id: Option<i64>,
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_posts(_user: AuthenticatedUser, db: web::Data<Database>, query: web::Query<PostListQuery>) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let filter = PostFilter {
        status: query.status,
        category_id: query.category_id,
        author_id: query.author_id,
        search: query.search,
    };
    let page = post_helpers::list_posts(&db, &filter, PageRequest::new(query.page, query.limit))?;
    Ok(paginated("Posts retrieved.", page))
}

async fn create_post(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    body: web::Json<PostInput>,
) -> Result<HttpResponse, ApiError> {
    let transition = {
        let conn = pool.get()?;
        post_helpers::create_post(&db, &conn, &config, &user, &body, Utc::now())?
    };
    announce(&pool, &state, &transition).await;
    Ok(created_json(transition_message(&transition), transition))
}

async fn save_draft(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<PostInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let post = post_helpers::save_draft(&db, &conn, &config, &user, &body, Utc::now())?;
    Ok(created_json("Draft saved.", post))
}

async fn get_post(_user: AuthenticatedUser, db: web::Data<Database>, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let post = post_helpers::load_post(&db, &parse_uuid(&id)?)?;
    Ok(ok_json("Post retrieved.", post))
}

async fn update_post(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<PostInput>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let transition = {
        let conn = pool.get()?;
        post_helpers::update_post(&db, &conn, &config, &user, &id, &body, Utc::now())?
    };
    announce(&pool, &state, &transition).await;
    let message = if transition.revision.is_some() { "Update submitted for approval." } else { "Post updated." };
    Ok(ok_json(message, transition))
}

async fn delete_post(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let conn = pool.get()?;
    post_helpers::delete_post(&db, &conn, &config, &user, &id)?;
    Ok(ok_message("Post deleted."))
}

async fn publish_post(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let transition = {
        let conn = pool.get()?;
        post_helpers::publish_post(&db, &conn, &config, &user, &id, Utc::now())?
    };
    announce(&pool, &state, &transition).await;
    Ok(ok_json(transition_message(&transition), transition))
}

async fn request_update(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<String>,
    body: web::Json<PostInput>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let conn = pool.get()?;
    let transition = post_helpers::request_update(&db, &conn, &config, &user, &id, &body, Utc::now())?;
    Ok(ok_json("Update submitted for approval.", transition))
}

async fn submit_for_approval(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let transition = {
        let conn = pool.get()?;
        post_helpers::submit_for_approval(&db, &conn, &config, &user, &id, Utc::now())?
    };
    announce(&pool, &state, &transition).await;
    Ok(ok_json(transition_message(&transition), transition))
}

async fn cancel_schedule(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let conn = pool.get()?;
    let transition = post_helpers::cancel_schedule(&db, &conn, &config, &user, &id, Utc::now())?;
    Ok(ok_json("Schedule cancelled.", transition))
}

async fn archive_post(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_uuid(&id)?;
    let conn = pool.get()?;
    let post = post_helpers::archive_post(&db, &conn, &config, &user, &id, Utc::now())?;
    Ok(ok_json("Post archived.", post))
}

async fn scheduled_posts(_user: AuthenticatedUser, db: web::Data<Database>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let posts = post_helpers::scheduled_posts(&db)?;
    Ok(paginated("Scheduled posts retrieved.", Page::from_vec(posts, query.request())))
}

async fn pending_schedule_approvals(user: AuthenticatedUser, db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let revisions = approval_helpers::pending_schedule_approvals(&db, &user)?;
    Ok(ok_json("Pending schedule approvals retrieved.", revisions))
}
