use crate::config::Config;
use crate::error::ApiError;
use crate::helper::activity_helpers;
use crate::helper::auth_helpers;
use crate::middleware::require_superadmin;
use crate::models::activity_models::{ActivityEvent, NewActivity};
use crate::models::db_operations::users_db_operations;
use crate::models::{Role, User};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_hours: i64,
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdminInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub crud_access: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateInput {
    pub crud_access: Option<bool>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

pub fn validate_username(username: &str) -> Result<String, ApiError> {
    let username = username.trim();
    let valid_chars = username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if username.len() < 3 || username.len() > 50 || !valid_chars {
        return Err(ApiError::Validation(
            "Username must be 3-50 characters of letters, digits, '.', '_' or '-'.".to_string(),
        ));
    }
    Ok(username.to_string())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Verifies credentials and issues a token. Unknown users, wrong passwords
/// and deactivated accounts all get the same answer.
pub fn login(conn: &Connection, config: &Config, input: &LoginInput) -> Result<LoginResponse, ApiError> {
    let user = users_db_operations::verify_credentials(conn, input.username.trim(), &input.password)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password.".to_string()))?;
    if let Err(e) = users_db_operations::update_last_login_time(conn, user.id) {
        log::warn!("Failed to update last login for user {}: {}", user.id, e);
    }
    let token = auth_helpers::generate_token(&user, &config.jwt_secret, config.token_expiry_hours)?;
    activity_helpers::record(conn, config, NewActivity::new((&user).into(), user.username.clone(), ActivityEvent::UserLogin));
    log::info!("User '{}' logged in", user.username);
    Ok(LoginResponse { token, expires_in_hours: config.token_expiry_hours, user })
}

fn load_admin(conn: &Connection, id: i64) -> Result<User, ApiError> {
    match users_db_operations::read_user_by_id(conn, id)? {
        Some(user) if user.role == Role::Admin => Ok(user),
        Some(_) => Err(ApiError::Forbidden("Superadmin accounts are managed with setup_cli.".to_string())),
        None => Err(ApiError::not_found(format!("Admin {}", id))),
    }
}

pub fn list_admins(conn: &Connection, actor: &User) -> Result<Vec<User>, ApiError> {
    require_superadmin(actor)?;
    Ok(users_db_operations::read_all_users(conn, Some(Role::Admin))?)
}

pub fn create_admin(conn: &Connection, config: &Config, actor: &User, input: &NewAdminInput) -> Result<User, ApiError> {
    require_superadmin(actor)?;
    let username = validate_username(&input.username)?;
    validate_password(&input.password)?;
    if users_db_operations::read_user_by_username(conn, &username)?.is_some() {
        return Err(ApiError::Conflict(format!("Username '{}' is already taken.", username)));
    }
    let id = users_db_operations::create_user(conn, &username, &input.password, Role::Admin, input.crud_access)?;
    let user = users_db_operations::read_user_by_id(conn, id)?
        .ok_or_else(|| ApiError::Internal(format!("Admin {} vanished after insert", id)))?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(
            actor.into(),
            user.username.clone(),
            ActivityEvent::AdminCreated { username: user.username.clone(), crud_access: user.crud_access },
        ),
    );
    Ok(user)
}

pub fn update_admin(
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: i64,
    input: &AdminUpdateInput,
) -> Result<User, ApiError> {
    require_superadmin(actor)?;
    let current = load_admin(conn, id)?;
    let password = input.password.as_deref().filter(|p| !p.is_empty());
    if let Some(password) = password {
        validate_password(password)?;
    }
    let crud_access = input.crud_access.unwrap_or(current.crud_access);
    let is_active = input.is_active.unwrap_or(current.is_active);
    users_db_operations::update_user(conn, id, crud_access, is_active, password)?;
    let user = load_admin(conn, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(
            actor.into(),
            user.username.clone(),
            ActivityEvent::AdminUpdated { username: user.username.clone(), crud_access, is_active },
        ),
    );
    Ok(user)
}

pub fn delete_admin(conn: &Connection, config: &Config, actor: &User, id: i64) -> Result<(), ApiError> {
    require_superadmin(actor)?;
    if actor.id == id {
        return Err(ApiError::Validation("You cannot delete your own account.".to_string()));
    }
    let user = load_admin(conn, id)?;
    users_db_operations::delete_user(conn, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), user.username.clone(), ActivityEvent::AdminDeleted { username: user.username }),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert_eq!(validate_username("  desk_editor ").unwrap(), "desk_editor");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("emoji🙂").is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }
}
