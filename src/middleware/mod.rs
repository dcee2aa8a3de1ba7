use crate::config::Config;
use crate::error::ApiError;
use crate::helper::auth_helpers;
use crate::models::db_operations::users_db_operations;
use crate::models::User;
use crate::DbPool;
use actix_web::{dev, http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

/// The caller behind a valid bearer token, re-read from the store on every request
/// so role, CRUD access and deactivation take effect immediately.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl std::ops::Deref for AuthenticatedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header.".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format. Expected: Bearer <token>".to_string()))
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| ApiError::Internal("Config not registered".to_string()))?;
    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| ApiError::Internal("Database pool not registered".to_string()))?;

    let token = bearer_token(req)?;
    let claims = auth_helpers::validate_token(token, &config.jwt_secret)
        .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::Unauthorized("Invalid token subject.".to_string()))?;

    let conn = pool.get()?;
    match users_db_operations::read_user_by_id(&conn, user_id)? {
        Some(user) if user.is_active => Ok(AuthenticatedUser(user)),
        Some(_) => Err(ApiError::Unauthorized("Account is deactivated.".to_string())),
        None => Err(ApiError::Unauthorized("Account no longer exists.".to_string())),
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

pub fn require_superadmin(user: &User) -> Result<(), ApiError> {
    if user.is_superadmin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Superadmin access required.".to_string()))
    }
}

pub fn require_crud_access(user: &User) -> Result<(), ApiError> {
    if user.has_crud_access() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("CRUD access required.".to_string()))
    }
}
