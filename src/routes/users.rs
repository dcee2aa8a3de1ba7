use crate::config::Config;
use crate::error::{created_json, ok_json, ok_message, ApiError};
use crate::helper::user_helpers::{self, AdminUpdateInput, NewAdminInput};
use crate::middleware::AuthenticatedUser;
use crate::DbPool;
use actix_web::{web, HttpResponse};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/users/admins", web::get().to(list_admins))
        .route("/users/admins", web::post().to(create_admin))
        .route("/users/admins/{id}", web::put().to(update_admin))
        .route("/users/admins/{id}", web::delete().to(delete_admin));
}

async fn list_admins(user: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(ok_json("Admins retrieved.", user_helpers::list_admins(&conn, &user)?))
}

async fn create_admin(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<NewAdminInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let admin = user_helpers::create_admin(&conn, &config, &user, &body)?;
    Ok(created_json("Admin created.", admin))
}

async fn update_admin(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
    body: web::Json<AdminUpdateInput>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let admin = user_helpers::update_admin(&conn, &config, &user, *id, &body)?;
    Ok(ok_json("Admin updated.", admin))
}

async fn delete_admin(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    user_helpers::delete_admin(&conn, &config, &user, *id)?;
    Ok(ok_message("Admin deleted."))
}
