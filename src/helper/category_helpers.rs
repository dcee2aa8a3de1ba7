use crate::config::Config;
use crate::error::ApiError;
use crate::helper::activity_helpers;
use crate::helper::sanitization_helpers::{clean_optional, strip_all_html};
use crate::middleware::require_crud_access;
use crate::models::activity_models::{ActivityEvent, NewActivity};
use crate::models::db_operations::categories_db_operations;
use crate::models::db_operations::posts_db_operations;
use crate::models::{Category, Page, PageRequest, User};
use redb::Database;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

fn clean_name(name: &str) -> Result<String, ApiError> {
    let name = strip_all_html(name.trim());
    if name.is_empty() {
        return Err(ApiError::Validation("Category name is required.".to_string()));
    }
    if name.chars().count() > 100 {
        return Err(ApiError::Validation("Category name must be at most 100 characters.".to_string()));
    }
    Ok(name)
}

fn ensure_name_free(conn: &Connection, name: &str, except_id: Option<i64>) -> Result<(), ApiError> {
    match categories_db_operations::read_category_by_name(conn, name)? {
        Some(existing) if Some(existing.id) != except_id => {
            Err(ApiError::Conflict(format!("Category '{}' already exists.", existing.name)))
        }
        _ => Ok(()),
    }
}

pub fn load_category(conn: &Connection, id: i64) -> Result<Category, ApiError> {
    categories_db_operations::read_category(conn, id)?.ok_or_else(|| ApiError::not_found(format!("Category {}", id)))
}

pub fn list(conn: &Connection, search: Option<&str>, page: PageRequest) -> Result<Page<Category>, ApiError> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    let total = categories_db_operations::count_categories(conn, search)?;
    let items = categories_db_operations::list_categories(conn, search, page.limit, page.offset())?;
    Ok(Page::new(items, total, page))
}

pub fn create(conn: &Connection, config: &Config, actor: &User, input: &CategoryInput) -> Result<Category, ApiError> {
    require_crud_access(actor)?;
    let name = clean_name(&input.name)?;
    ensure_name_free(conn, &name, None)?;
    let category =
        categories_db_operations::create_category(conn, &name, clean_optional(input.description.as_deref()).as_deref(), Some(actor.id))?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), category.name.clone(), ActivityEvent::CategoryCreated { name: category.name.clone() }),
    );
    Ok(category)
}

pub fn update(conn: &Connection, config: &Config, actor: &User, id: i64, input: &CategoryInput) -> Result<Category, ApiError> {
    require_crud_access(actor)?;
    load_category(conn, id)?;
    let name = clean_name(&input.name)?;
    ensure_name_free(conn, &name, Some(id))?;
    categories_db_operations::update_category(conn, id, &name, clean_optional(input.description.as_deref()).as_deref())?;
    let category = load_category(conn, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), category.name.clone(), ActivityEvent::CategoryUpdated { name: category.name.clone() }),
    );
    Ok(category)
}

/// Refuses while any post or outstanding revision references the category; nothing is changed in that case.
pub fn delete(db: &Database, conn: &Connection, config: &Config, actor: &User, id: i64) -> Result<(), ApiError> {
    require_crud_access(actor)?;
    let category = load_category(conn, id)?;
    let references = posts_db_operations::count_posts_in_category(db, id)?;
    if references > 0 {
        return Err(ApiError::Conflict(format!(
            "Category '{}' is used by {} post(s) and cannot be deleted.",
            category.name, references
        )));
    }
    let staged = posts_db_operations::count_outstanding_revisions_in_category(db, id)?;
    if staged > 0 {
        return Err(ApiError::Conflict(format!(
            "Category '{}' is proposed by {} revision(s) awaiting review and cannot be deleted.",
            category.name, staged
        )));
    }
    categories_db_operations::delete_category(conn, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), category.name.clone(), ActivityEvent::CategoryDeleted { name: category.name }),
    );
    Ok(())
}
