use crate::models::{ApprovalStatus, Post, PostStatus, Revision};
use chrono::{DateTime, Utc};
use redb::{CommitError, Database, ReadableTable, StorageError, TableDefinition, TableError, TransactionError, WriteTransaction};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
}

// --- Documents ---
pub const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");
pub const REVISIONS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("revisions");

// --- Indices ---
// Keyed by negated creation time so a forward scan yields newest first.
pub const CHRONOLOGICAL_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("chronological_index");
// Only posts currently in the `scheduled` state, keyed by publish time.
pub const SCHEDULE_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("schedule_index");
pub const CATEGORY_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("category_index");
pub const GUID_INDEX: TableDefinition<(&str, &[u8; 16]), ()> = TableDefinition::new("guid_index");
pub const LINK_INDEX: TableDefinition<(&str, &[u8; 16]), ()> = TableDefinition::new("link_index");
pub const TITLE_INDEX: TableDefinition<(&str, &[u8; 16]), ()> = TableDefinition::new("title_index");
pub const REVISION_BY_POST: TableDefinition<(&[u8; 16], &[u8; 16]), ()> = TableDefinition::new("revision_by_post");

const MIN_ID: [u8; 16] = [0u8; 16];
const MAX_ID: [u8; 16] = [255u8; 16];

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub search: Option<String>,
}

impl PostFilter {
    fn matches(&self, post: &Post) -> bool {
        if self.status.map_or(false, |s| s != post.status) {
            return false;
        }
        if self.category_id.map_or(false, |c| c != post.category_id) {
            return false;
        }
        if self.author_id.is_some() && self.author_id != post.author_id {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(q) => post.title.to_lowercase().contains(&q.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RevisionFilter {
    pub status: Option<ApprovalStatus>,
    pub submitted_by: Option<i64>,
}

/// Lowercased, whitespace-collapsed title used for duplicate detection.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn decode_post(json: &str) -> Result<Post, DbError> {
    Ok(serde_json::from_str(json)?)
}

fn decode_revision(json: &str) -> Result<Revision, DbError> {
    Ok(serde_json::from_str(json)?)
}

// ====================================================================
// ========================= INDEX MAINTENANCE ========================
// ====================================================================

fn add_indexes(txn: &WriteTransaction, post: &Post) -> Result<(), DbError> {
    let key = post.id.into_bytes();

    let mut chrono_index = txn.open_table(CHRONOLOGICAL_INDEX)?;
    chrono_index.insert((-post.created_at.timestamp_millis(), &key), ())?;

    let mut category_index = txn.open_table(CATEGORY_INDEX)?;
    category_index.insert((post.category_id, &key), ())?;

    if post.status == PostStatus::Scheduled && post.is_scheduled {
        if let Some(publish_at) = post.publish_date_time {
            let mut schedule_index = txn.open_table(SCHEDULE_INDEX)?;
            schedule_index.insert((publish_at.timestamp_millis(), &key), ())?;
        }
    }

    let title = normalize_title(&post.title);
    let mut title_index = txn.open_table(TITLE_INDEX)?;
    title_index.insert((title.as_str(), &key), ())?;

    if let Some(guid) = post.rss_guid() {
        let mut guid_index = txn.open_table(GUID_INDEX)?;
        guid_index.insert((guid, &key), ())?;
    }
    if let Some(link) = post.rss_link() {
        let mut link_index = txn.open_table(LINK_INDEX)?;
        link_index.insert((link, &key), ())?;
    }
    Ok(())
}

fn remove_indexes(txn: &WriteTransaction, post: &Post) -> Result<(), DbError> {
    let key = post.id.into_bytes();

    let mut chrono_index = txn.open_table(CHRONOLOGICAL_INDEX)?;
    chrono_index.remove((-post.created_at.timestamp_millis(), &key))?;

    let mut category_index = txn.open_table(CATEGORY_INDEX)?;
    category_index.remove((post.category_id, &key))?;

    if let Some(publish_at) = post.publish_date_time {
        let mut schedule_index = txn.open_table(SCHEDULE_INDEX)?;
        schedule_index.remove((publish_at.timestamp_millis(), &key))?;
    }

    let title = normalize_title(&post.title);
    let mut title_index = txn.open_table(TITLE_INDEX)?;
    title_index.remove((title.as_str(), &key))?;

    if let Some(guid) = post.rss_guid() {
        let mut guid_index = txn.open_table(GUID_INDEX)?;
        guid_index.remove((guid, &key))?;
    }
    if let Some(link) = post.rss_link() {
        let mut link_index = txn.open_table(LINK_INDEX)?;
        link_index.remove((link, &key))?;
    }
    Ok(())
}

// ====================================================================
// ========================== WRITE HELPERS ===========================
// ====================================================================

fn put_post(txn: &WriteTransaction, post: &Post) -> Result<(), DbError> {
    let key = post.id.into_bytes();
    let previous = {
        let mut posts_table = txn.open_table(POSTS)?;
        let previous = match posts_table.get(&key)? {
            Some(guard) => Some(decode_post(guard.value())?),
            None => None,
        };
        let json = serde_json::to_string(post)?;
        posts_table.insert(&key, json.as_str())?;
        previous
    };

    if let Some(old) = &previous {
        remove_indexes(txn, old)?;
    }
    add_indexes(txn, post)
}

fn put_revision(txn: &WriteTransaction, revision: &Revision) -> Result<(), DbError> {
    let key = revision.id.into_bytes();
    let post_key = revision.post_id.into_bytes();
    let json = serde_json::to_string(revision)?;

    let mut revisions_table = txn.open_table(REVISIONS)?;
    revisions_table.insert(&key, json.as_str())?;

    let mut by_post = txn.open_table(REVISION_BY_POST)?;
    by_post.insert((&post_key, &key), ())?;
    Ok(())
}

fn revisions_in_txn(txn: &WriteTransaction, post_id: &Uuid) -> Result<Vec<Revision>, DbError> {
    let post_key = post_id.into_bytes();
    let ids: Vec<[u8; 16]> = {
        let by_post = txn.open_table(REVISION_BY_POST)?;
        let mut ids = Vec::new();
        for item in by_post.range((&post_key, &MIN_ID)..=(&post_key, &MAX_ID))? {
            let (key, _) = item?;
            ids.push(*key.value().1);
        }
        ids
    };

    let revisions_table = txn.open_table(REVISIONS)?;
    let mut revisions = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(guard) = revisions_table.get(id)? {
            revisions.push(decode_revision(guard.value())?);
        }
    }
    Ok(revisions)
}

// ====================================================================
// ============================ POST WRITES ===========================
// ====================================================================

/// Inserts or replaces a post, keeping every index in step.
pub fn save_post(db: &Database, post: &Post) -> Result<(), DbError> {
    save_transition(db, post, None)
}

/// Writes a post and (optionally) its revision in a single transaction.
pub fn save_transition(db: &Database, post: &Post, revision: Option<&Revision>) -> Result<(), DbError> {
    let write_txn = db.begin_write()?;
    put_post(&write_txn, post)?;
    if let Some(revision) = revision {
        put_revision(&write_txn, revision)?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Stores a new staged revision together with its post. Fails with `Conflict`
/// if the post already has another revision awaiting review.
pub fn stage_revision(db: &Database, post: &Post, revision: &Revision) -> Result<(), DbError> {
    let write_txn = db.begin_write()?;
    let existing = revisions_in_txn(&write_txn, &post.id)?;
    if existing
        .iter()
        .any(|r| r.id != revision.id && r.approval_status.is_outstanding())
    {
        // Dropping the transaction without commit aborts it.
        return Err(DbError::Conflict(format!(
            "Post {} already has a revision awaiting review",
            post.id
        )));
    }
    put_post(&write_txn, post)?;
    put_revision(&write_txn, revision)?;
    write_txn.commit()?;
    Ok(())
}

/// Deletes a post and every revision staged against it. Returns the number of revisions removed.
pub fn delete_post(db: &Database, post_id: &Uuid) -> Result<usize, DbError> {
    let key = post_id.into_bytes();
    let write_txn = db.begin_write()?;

    let post = {
        let mut posts_table = write_txn.open_table(POSTS)?;
        let post = match posts_table.get(&key)? {
            Some(guard) => decode_post(guard.value())?,
            None => return Err(DbError::NotFound(format!("Post {}", post_id))),
        };
        posts_table.remove(&key)?;
        post
    };
    remove_indexes(&write_txn, &post)?;

    let revisions = revisions_in_txn(&write_txn, post_id)?;
    {
        let mut revisions_table = write_txn.open_table(REVISIONS)?;
        let mut by_post = write_txn.open_table(REVISION_BY_POST)?;
        for revision in &revisions {
            let rev_key = revision.id.into_bytes();
            revisions_table.remove(&rev_key)?;
            by_post.remove((&key, &rev_key))?;
        }
    }

    write_txn.commit()?;
    Ok(revisions.len())
}

// ====================================================================
// ============================ POST READS ============================
// ====================================================================

pub fn read_post(db: &Database, post_id: &Uuid) -> Result<Option<Post>, DbError> {
    let read_txn = db.begin_read()?;
    let posts_table = read_txn.open_table(POSTS)?;
    let post = match posts_table.get(&post_id.into_bytes())? {
        Some(guard) => Some(decode_post(guard.value())?),
        None => None,
    };
    Ok(post)
}

/// All posts matching `filter`, newest first.
pub fn list_posts(db: &Database, filter: &PostFilter) -> Result<Vec<Post>, DbError> {
    let read_txn = db.begin_read()?;
    let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
    let posts_table = read_txn.open_table(POSTS)?;

    let mut posts = Vec::new();
    for item in chrono_index.iter()? {
        let (key, _) = item?;
        let post_id_bytes = key.value().1;
        if let Some(guard) = posts_table.get(post_id_bytes)? {
            let post = decode_post(guard.value())?;
            if filter.matches(&post) {
                posts.push(post);
            }
        }
    }
    Ok(posts)
}

/// Approved scheduled posts whose publish time lies within `[from, to]`, oldest first.
pub fn due_scheduled_posts(db: &Database, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Post>, DbError> {
    let read_txn = db.begin_read()?;
    let schedule_index = read_txn.open_table(SCHEDULE_INDEX)?;
    let posts_table = read_txn.open_table(POSTS)?;

    let start_key = (from.timestamp_millis(), &MIN_ID);
    let end_key = (to.timestamp_millis(), &MAX_ID);

    let mut due = Vec::new();
    for item in schedule_index.range(start_key..=end_key)? {
        let (key, _) = item?;
        let post_id_bytes = key.value().1;
        if let Some(guard) = posts_table.get(post_id_bytes)? {
            let post = decode_post(guard.value())?;
            let within = post.publish_date_time.map_or(false, |t| t >= from && t <= to);
            if within && post.status == PostStatus::Scheduled && post.is_scheduled && post.schedule_approved {
                due.push(post);
            }
        }
    }
    Ok(due)
}

pub fn count_posts_in_category(db: &Database, category_id: i64) -> Result<u64, DbError> {
    let read_txn = db.begin_read()?;
    let category_index = read_txn.open_table(CATEGORY_INDEX)?;
    let mut count = 0u64;
    for item in category_index.range((category_id, &MIN_ID)..=(category_id, &MAX_ID))? {
        item?;
        count += 1;
    }
    Ok(count)
}

fn first_in_string_index(
    db: &Database,
    definition: TableDefinition<(&str, &[u8; 16]), ()>,
    value: &str,
) -> Result<Option<Uuid>, DbError> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(definition)?;
    let mut range = index.range((value, &MIN_ID)..=(value, &MAX_ID))?;
    let found = match range.next() {
        Some(item) => {
            let (key, _) = item?;
            Some(Uuid::from_bytes(*key.value().1))
        }
        None => None,
    };
    Ok(found)
}

/// Looks for an existing post with the same GUID, link, or normalised title.
pub fn find_duplicate(db: &Database, guid: Option<&str>, link: Option<&str>, title: &str) -> Result<Option<Uuid>, DbError> {
    if let Some(guid) = guid.filter(|g| !g.is_empty()) {
        if let Some(id) = first_in_string_index(db, GUID_INDEX, guid)? {
            return Ok(Some(id));
        }
    }
    if let Some(link) = link.filter(|l| !l.is_empty()) {
        if let Some(id) = first_in_string_index(db, LINK_INDEX, link)? {
            return Ok(Some(id));
        }
    }
    let normalized = normalize_title(title);
    if normalized.is_empty() {
        return Ok(None);
    }
    first_in_string_index(db, TITLE_INDEX, &normalized)
}

// ====================================================================
// ========================== REVISION READS ==========================
// ====================================================================

pub fn read_revision(db: &Database, revision_id: &Uuid) -> Result<Option<Revision>, DbError> {
    let read_txn = db.begin_read()?;
    let revisions_table = read_txn.open_table(REVISIONS)?;
    let revision = match revisions_table.get(&revision_id.into_bytes())? {
        Some(guard) => Some(decode_revision(guard.value())?),
        None => None,
    };
    Ok(revision)
}

/// Revisions matching `filter`, newest first.
pub fn list_revisions(db: &Database, filter: &RevisionFilter) -> Result<Vec<Revision>, DbError> {
    let read_txn = db.begin_read()?;
    let revisions_table = read_txn.open_table(REVISIONS)?;

    let mut revisions = Vec::new();
    for item in revisions_table.iter()? {
        let (_, value) = item?;
        let revision = decode_revision(value.value())?;
        if filter.status.map_or(false, |s| s != revision.approval_status) {
            continue;
        }
        if filter.submitted_by.map_or(false, |u| u != revision.submitted_by) {
            continue;
        }
        revisions.push(revision);
    }
    revisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(revisions)
}

pub fn revisions_for_post(db: &Database, post_id: &Uuid) -> Result<Vec<Revision>, DbError> {
    let post_key = post_id.into_bytes();
    let read_txn = db.begin_read()?;
    let by_post = read_txn.open_table(REVISION_BY_POST)?;
    let revisions_table = read_txn.open_table(REVISIONS)?;

    let mut revisions = Vec::new();
    for item in by_post.range((&post_key, &MIN_ID)..=(&post_key, &MAX_ID))? {
        let (key, _) = item?;
        if let Some(guard) = revisions_table.get(key.value().1)? {
            revisions.push(decode_revision(guard.value())?);
        }
    }
    revisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(revisions)
}

/// Revisions still awaiting review whose proposed draft names `category_id`.
pub fn count_outstanding_revisions_in_category(db: &Database, category_id: i64) -> Result<u64, DbError> {
    let count = list_revisions(db, &RevisionFilter::default())?
        .iter()
        .filter(|r| r.approval_status.is_outstanding() && r.proposed.category_id == category_id)
        .count();
    Ok(count as u64)
}

pub fn outstanding_revision(db: &Database, post_id: &Uuid) -> Result<Option<Revision>, DbError> {
    Ok(revisions_for_post(db, post_id)?
        .into_iter()
        .find(|r| r.approval_status.is_outstanding()))
}
