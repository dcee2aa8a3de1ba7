use crate::models::db_operations::{invalid_column, opt_time_column, time_column, to_db_time};
use crate::models::{Role, User};
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, username, role, crud_access, is_active, last_login_at, created_at";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let role_raw: String = row.get(2)?;
    let role = Role::parse(&role_raw).ok_or_else(|| invalid_column(2, format!("unknown role '{}'", role_raw)))?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role,
        crud_access: row.get(3)?,
        is_active: row.get(4)?,
        last_login_at: opt_time_column(row, 5)?,
        created_at: time_column(row, 6)?,
    })
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    role: Role,
    crud_access: bool,
) -> Result<i64, RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO users (username, password_hash, role, crud_access, is_active, created_at) VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![username, hashed_password, role.as_str(), crud_access, to_db_time(&Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_all_users(conn: &Connection, role: Option<Role>) -> Result<Vec<User>, RusqliteError> {
    let sql = format!(
        "SELECT {} FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY id",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![role.map(|r| r.as_str())], user_from_row)?;
    rows.collect()
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>, RusqliteError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [user_id], user_from_row).optional()
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, RusqliteError> {
    let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
    conn.query_row(&sql, [username], user_from_row).optional()
}

pub fn update_user(
    conn: &Connection,
    user_id: i64,
    crud_access: bool,
    is_active: bool,
    new_password: Option<&str>,
) -> Result<usize, RusqliteError> {
    if let Some(password) = new_password.filter(|p| !p.is_empty()) {
        let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
        return conn.execute(
            "UPDATE users SET crud_access = ?1, is_active = ?2, password_hash = ?3 WHERE id = ?4",
            params![crud_access, is_active, hashed_password, user_id],
        );
    }

    conn.execute(
        "UPDATE users SET crud_access = ?1, is_active = ?2 WHERE id = ?3",
        params![crud_access, is_active, user_id],
    )
}

pub fn change_password(conn: &Connection, username: &str, new_password: &str) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        params![hashed_password, username],
    )
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM users WHERE id = ?1", [user_id])
}

/// Returns the user when the password matches and the account is active.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> Result<Option<User>, RusqliteError> {
    let res: Option<(i64, String, bool)> = conn
        .query_row(
            "SELECT id, password_hash, is_active FROM users WHERE username = ?1",
            [username],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match res {
        Some((id, hash, true)) if verify(password, &hash).unwrap_or(false) => read_user_by_id(conn, id),
        _ => Ok(None),
    }
}

pub fn update_last_login_time(conn: &Connection, user_id: i64) -> Result<(), RusqliteError> {
    conn.execute(
        "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
        params![to_db_time(&Utc::now()), user_id],
    )?;
    Ok(())
}

pub fn read_setting(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()
        .unwrap_or(None)
}

pub fn update_setting(conn: &Connection, key: &str, value: &str) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}
