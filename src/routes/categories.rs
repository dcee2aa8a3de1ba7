use crate::config::Config;
use crate::error::{created_json, ok_json, ok_message, paginated, ApiError};
use crate::helper::category_helpers::{self, CategoryInput};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::categories_db_operations;
use crate::models::PageRequest;
use crate::DbPool;
use actix_web::{web, HttpResponse};
use redb::Database;
use serde::Deserialize;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/categories", web::get().to(list_categories))
        .route("/categories", web::post().to(create_category))
        .route("/categories/dropdown", web::get().to(dropdown))
        .route("/categories/{id}", web::get().to(get_category))
        .route("/categories/{id}", web::put().to(update_category))
        .route("/categories/{id}", web::delete().to(delete_category));
}

#[derive(Debug, Deserialize)]
struct CategoryListQuery {
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_categories(
    _user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    query: web::Query<CategoryListQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let page = category_helpers::list(&conn, query.search.as_deref(), PageRequest::new(query.page, query.limit))?;
    Ok(paginated("Categories retrieved.", page))
}

async fn dropdown(_user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let options = categories_db_operations::dropdown(&conn)?;
    Ok(ok_json("Categories retrieved.", options))
}

async fn get_category(_user: AuthenticatedUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(ok_json("Category retrieved.", category_helpers::load_category(&conn, *id)?))
}

async fn create_category(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<CategoryInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let category = category_helpers::create(&conn, &config, &user, &body)?;
    Ok(created_json("Category created.", category))
}

async fn update_category(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
    body: web::Json<CategoryInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let category = category_helpers::update(&conn, &config, &user, *id, &body)?;
    Ok(ok_json("Category updated.", category))
}

async fn delete_category(
    user: AuthenticatedUser,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    category_helpers::delete(&db, &conn, &config, &user, *id)?;
    Ok(ok_message("Category deleted."))
}
