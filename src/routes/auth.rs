use crate::config::Config;
use crate::error::{ok_json, ApiError};
use crate::helper::user_helpers::{self, LoginInput};
use crate::middleware::AuthenticatedUser;
use crate::DbPool;
use actix_web::{web, HttpResponse};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/login", web::post().to(login)).route("/auth/me", web::get().to(me));
}

async fn login(pool: web::Data<DbPool>, config: web::Data<Config>, body: web::Json<LoginInput>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let response = user_helpers::login(&conn, &config, &body)?;
    Ok(ok_json("Login successful.", response))
}

async fn me(user: AuthenticatedUser) -> Result<HttpResponse, ApiError> {
    Ok(ok_json("Current user.", user.0))
}
