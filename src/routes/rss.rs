use crate::config::Config;
use crate::error::{created_json, ok_json, ok_message, paginated, ApiError};
use crate::helper::rss_helpers::{self, RssContext};
use crate::middleware::{require_superadmin, AuthenticatedUser};
use crate::models::activity_models::Actor;
use crate::models::db_operations::rss_db_operations;
use crate::models::rss_models::{FeedConfigInput, IngestOptions};
use crate::models::{PageRequest, PostStatus};
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use redb::Database;
use serde::Deserialize;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/rss/parse", web::post().to(parse_feed))
        .route("/rss/save", web::post().to(save_feed))
        .route("/rss/history", web::get().to(history))
        .route("/rss/clear-history", web::delete().to(clear_history))
        .route("/rss/configs", web::get().to(list_configs))
        .route("/rss/configs", web::post().to(create_config))
        .route("/rss/configs/{id}", web::get().to(get_config))
        .route("/rss/configs/{id}", web::put().to(update_config))
        .route("/rss/configs/{id}", web::delete().to(delete_config))
        .route("/rss/configs/{id}/run", web::post().to(run_config));
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveBody {
    url: String,
    brand_name: String,
    #[serde(default)]
    force: bool,
    status: Option<PostStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    feed_id: Option<i64>,
    page: Option<u32>,
    limit: Option<u32>,
}

fn context<'a>(db: &'a Database, pool: &'a DbPool, config: &'a Config, state: &'a AppState) -> RssContext<'a> {
    RssContext {
        db,
        pool,
        config,
        client: &state.http_client,
        gateway: state.push_gateway.as_ref(),
    }
}

/// Fetches and previews a feed without writing anything.
async fn parse_feed(
    _user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: web::Json<ParseBody>,
) -> Result<HttpResponse, ApiError> {
    let url = rss_helpers::validate_feed_url(&body.url)?;
    let parsed = rss_helpers::fetch_feed(&state.http_client, &url).await?;
    Ok(ok_json(&format!("Parsed {} item(s).", parsed.items.len()), parsed))
}

async fn save_feed(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    body: web::Json<SaveBody>,
) -> Result<HttpResponse, ApiError> {
    require_superadmin(&user)?;
    let body = body.into_inner();
    let url = rss_helpers::validate_feed_url(&body.url)?;
    let brand_name = body.brand_name.trim().to_string();
    if brand_name.is_empty() {
        return Err(ApiError::Validation("brandName is required.".to_string()));
    }
    let status = match body.status {
        None | Some(PostStatus::Published) => PostStatus::Published,
        Some(PostStatus::Draft) => PostStatus::Draft,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "status must be 'published' or 'draft', got '{}'.",
                other.as_str()
            )))
        }
    };
    let options = IngestOptions {
        feed_id: None,
        brand_name,
        status,
        force: body.force,
        default_category: config.rss.default_category.clone(),
    };
    let ctx = context(&db, &pool, &config, &state);
    let report = rss_helpers::save_from_url(&ctx, &url, options, Actor::from(&*user)).await?;
    let message = format!("Saved {} of {} item(s).", report.saved, report.found);
    Ok(ok_json(&message, report))
}

async fn history(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let page = rss_helpers::fetch_history(&conn, query.feed_id, PageRequest::new(query.page, query.limit))?;
    Ok(paginated("Fetch history retrieved.", page))
}

async fn clear_history(user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    require_superadmin(&user)?;
    let conn = pool.get()?;
    let removed = rss_db_operations::clear_fetch_runs(&conn)?;
    log::info!("'{}' cleared {} RSS fetch run(s)", user.username, removed);
    Ok(ok_message(&format!("Cleared {} history entries.", removed)))
}

async fn list_configs(_user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(ok_json("Feed configurations retrieved.", rss_db_operations::list_feeds(&conn)?))
}

async fn get_config(_user: AuthenticatedUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(ok_json("Feed configuration retrieved.", rss_helpers::load_feed(&conn, *id)?))
}

async fn create_config(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<FeedConfigInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let feed = rss_helpers::create_feed_config(&conn, &config, &user, &body)?;
    Ok(created_json("Feed configuration created.", feed))
}

async fn update_config(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
    body: web::Json<FeedConfigInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let feed = rss_helpers::update_feed_config(&conn, &config, &user, *id, &body)?;
    Ok(ok_json("Feed configuration updated.", feed))
}

async fn delete_config(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    rss_helpers::delete_feed_config(&conn, &config, &user, *id)?;
    Ok(ok_message("Feed configuration deleted."))
}

/// Runs one feed now, regardless of its interval.
async fn run_config(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_superadmin(&user)?;
    let feed = {
        let conn = pool.get()?;
        rss_helpers::load_feed(&conn, *id)?
    };
    let ctx = context(&db, &pool, &config, &state);
    let started = Utc::now();
    let report = rss_helpers::run_feed(&ctx, &feed, Actor::from(&*user), false).await?;
    log::info!(
        "Manual run of feed {} by '{}' took {} ms",
        feed.id,
        user.username,
        (Utc::now() - started).num_milliseconds()
    );
    Ok(ok_json(&format!("Saved {} of {} item(s).", report.saved, report.found), report))
}
