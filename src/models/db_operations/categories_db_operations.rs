use crate::models::db_operations::{time_column, to_db_time};
use crate::models::{Category, CategoryOption};
use chrono::Utc;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const CATEGORY_COLUMNS: &str = "id, name, description, created_by, created_at, updated_at";

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        created_at: time_column(row, 4)?,
        updated_at: time_column(row, 5)?,
    })
}

pub fn create_category(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    created_by: Option<i64>,
) -> Result<Category, RusqliteError> {
    let now = to_db_time(&Utc::now());
    conn.execute(
        "INSERT INTO categories (name, description, created_by, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![name, description, created_by, now],
    )?;
    let id = conn.last_insert_rowid();
    read_category(conn, id)?.ok_or(RusqliteError::QueryReturnedNoRows)
}

pub fn read_category(conn: &Connection, id: i64) -> Result<Option<Category>, RusqliteError> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS);
    conn.query_row(&sql, [id], category_from_row).optional()
}

/// Case-insensitive lookup; the column is declared `COLLATE NOCASE`.
pub fn read_category_by_name(conn: &Connection, name: &str) -> Result<Option<Category>, RusqliteError> {
    let sql = format!("SELECT {} FROM categories WHERE name = ?1", CATEGORY_COLUMNS);
    conn.query_row(&sql, [name.trim()], category_from_row).optional()
}

pub fn count_categories(conn: &Connection, search: Option<&str>) -> Result<u64, RusqliteError> {
    let pattern = search.map(|s| format!("%{}%", s.trim()));
    conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE (?1 IS NULL OR name LIKE ?1)",
        params![pattern],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

pub fn list_categories(
    conn: &Connection,
    search: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Category>, RusqliteError> {
    let pattern = search.map(|s| format!("%{}%", s.trim()));
    let sql = format!(
        "SELECT {} FROM categories WHERE (?1 IS NULL OR name LIKE ?1) ORDER BY name COLLATE NOCASE LIMIT ?2 OFFSET ?3",
        CATEGORY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pattern, limit, offset], category_from_row)?;
    rows.collect()
}

pub fn dropdown(conn: &Connection) -> Result<Vec<CategoryOption>, RusqliteError> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name COLLATE NOCASE")?;
    let rows = stmt.query_map([], |row| Ok(CategoryOption { id: row.get(0)?, name: row.get(1)? }))?;
    rows.collect()
}

pub fn update_category(
    conn: &Connection,
    id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE categories SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, description, to_db_time(&Utc::now()), id],
    )
}

pub fn delete_category(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM categories WHERE id = ?1", [id])
}

/// Finds a category by name, creating it when absent.
pub fn resolve_or_create(conn: &Connection, name: &str, created_by: Option<i64>) -> Result<Category, RusqliteError> {
    if let Some(existing) = read_category_by_name(conn, name)? {
        return Ok(existing);
    }
    // Another ingestion may create the same name concurrently.
    let now = to_db_time(&Utc::now());
    conn.execute(
        "INSERT OR IGNORE INTO categories (name, description, created_by, created_at, updated_at) VALUES (?1, NULL, ?2, ?3, ?3)",
        params![name.trim(), created_by, now],
    )?;
    read_category_by_name(conn, name)?.ok_or(RusqliteError::QueryReturnedNoRows)
}
