use crate::config::Config;
use crate::error::ApiError;
use crate::helper::activity_helpers;
use crate::helper::sanitization_helpers::{clean_optional, html_to_text, normalize_tags, sanitize_markdown_content};
use crate::helper::workflow::{self, Decision};
use crate::models::activity_models::{ActivityEvent, NewActivity};
use crate::models::db_operations::categories_db_operations;
use crate::models::db_operations::posts_db_operations::{self, PostFilter};
use crate::models::{ApprovalStatus, Page, PageRequest, Post, PostAction, PostDraft, PostSource, PostStatus, Revision, User};
use chrono::{DateTime, Utc};
use redb::Database;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body shared by create, draft, update and resubmit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInput {
    pub title: String,
    pub short_title: Option<String>,
    #[serde(default)]
    pub body: String,
    pub category_id: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub publish_date_time: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// Result of a post or revision transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub post: Post,
    pub revision: Option<Revision>,
    /// Set when this transition made the post live, so the caller can fan out.
    #[serde(skip)]
    pub newly_published: bool,
}

impl Transition {
    fn new(post: Post, revision: Option<Revision>, was_published: bool) -> Self {
        let newly_published = !was_published && post.status == PostStatus::Published;
        Transition { post, revision, newly_published }
    }
}

/// Sanitises the input and checks that the referenced category exists.
pub fn validate_input(conn: &Connection, input: &PostInput, require_body: bool) -> Result<PostDraft, ApiError> {
    let title = html_to_text(&input.title);
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required.".to_string()));
    }
    let body = sanitize_markdown_content(input.body.trim());
    if require_body && body.is_empty() {
        return Err(ApiError::Validation("Body is required.".to_string()));
    }
    if categories_db_operations::read_category(conn, input.category_id)?.is_none() {
        return Err(ApiError::Validation(format!("Category {} does not exist.", input.category_id)));
    }
    Ok(PostDraft {
        title,
        short_title: input.short_title.as_deref().map(html_to_text).filter(|s| !s.is_empty()),
        body,
        category_id: input.category_id,
        tags: normalize_tags(&input.tags),
        publish_date_time: input.publish_date_time,
        image_url: clean_optional(input.image_url.as_deref()),
    })
}

pub(crate) fn new_post(draft: &PostDraft, author: &User, status: PostStatus, now: DateTime<Utc>) -> Post {
    let mut post = Post {
        id: Uuid::new_v4(),
        title: String::new(),
        short_title: None,
        body: String::new(),
        category_id: draft.category_id,
        tags: Vec::new(),
        author: author.username.clone(),
        author_id: Some(author.id),
        publish_date_time: None,
        status,
        is_scheduled: false,
        schedule_approved: false,
        schedule_approved_by: None,
        schedule_approved_at: None,
        last_approved_by: None,
        last_approved_at: None,
        rejection_reason: None,
        image_url: None,
        source: PostSource::Manual,
        created_at: now,
        updated_at: now,
    };
    post.apply_draft(draft);
    post
}

/// A staged draft may name a category deleted since it was submitted.
pub(crate) fn ensure_category(conn: &Connection, category_id: i64) -> Result<(), ApiError> {
    match categories_db_operations::read_category(conn, category_id)? {
        Some(_) => Ok(()),
        None => Err(ApiError::Conflict(format!(
            "Category {} no longer exists; request changes so the submitter can pick another.",
            category_id
        ))),
    }
}

fn ensure_no_outstanding(db: &Database, id: &Uuid) -> Result<(), ApiError> {
    match posts_db_operations::outstanding_revision(db, id)? {
        Some(revision) => Err(ApiError::Conflict(format!(
            "Post has revision {} awaiting review; resolve it under /approval first.",
            revision.id
        ))),
        None => Ok(()),
    }
}

pub fn load_post(db: &Database, id: &Uuid) -> Result<Post, ApiError> {
    posts_db_operations::read_post(db, id)?.ok_or_else(|| ApiError::not_found(format!("Post {}", id)))
}

fn submitted_event(revision: &Revision) -> ActivityEvent {
    ActivityEvent::RevisionSubmitted {
        approval_status: revision.approval_status,
        is_update_request: revision.is_update_request,
        version: revision.version,
    }
}

/// Stages `post` for review, moving it to `pending_approval`.
fn stage_for_review(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    mut post: Post,
    approval_status: ApprovalStatus,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let was_published = post.status == PostStatus::Published;
    workflow::mark_pending(&mut post, approval_status == ApprovalStatus::ScheduledPending, now);
    let revision = workflow::new_revision(&post, actor, approval_status, post.draft(), None, now);
    posts_db_operations::stage_revision(db, &post, &revision)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), submitted_event(&revision))
            .for_post(post.id)
            .for_revision(revision.id),
    );
    Ok(Transition::new(post, Some(revision), was_published))
}

/// Publishes or schedules directly, or stages, depending on the decision table.
fn advance(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    mut post: Post,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    if let Some(approval_status) = decision.approval_status {
        return stage_for_review(db, conn, config, actor, post, approval_status, now);
    }
    let was_published = post.status == PostStatus::Published;
    let mut outstanding = posts_db_operations::outstanding_revision(db, &post.id)?;
    let event = match outstanding.as_mut() {
        Some(revision) => {
            ensure_category(conn, revision.proposed.category_id)?;
            workflow::publish_over_staged(&mut post, revision, actor, now)?
        }
        None => workflow::apply_direct(&mut post, decision, &actor.username, now),
    };
    posts_db_operations::save_transition(db, &post, outstanding.as_ref())?;

    let mut activity = NewActivity::new(actor.into(), post.title.clone(), event).for_post(post.id);
    if let Some(revision) = &outstanding {
        activity = activity.for_revision(revision.id);
    }
    activity_helpers::record(conn, config, activity);
    Ok(Transition::new(post, outstanding, was_published))
}

// ====================================================================
// ============================ OPERATIONS ============================
// ====================================================================

pub fn create_post(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let draft = validate_input(conn, input, true)?;
    let decision = workflow::decide_for(actor, draft.publish_date_time, now);
    let mut post = new_post(&draft, actor, decision.status, now);

    if let Some(approval_status) = decision.approval_status {
        return stage_for_review(db, conn, config, actor, post, approval_status, now);
    }
    workflow::apply_direct(&mut post, decision, &actor.username, now);
    posts_db_operations::save_post(db, &post)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), ActivityEvent::PostCreated { status: post.status })
            .for_post(post.id),
    );
    Ok(Transition::new(post, None, false))
}

/// Drafts never go through the decision table.
pub fn save_draft(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<Post, ApiError> {
    let draft = validate_input(conn, input, false)?;
    let post = new_post(&draft, actor, PostStatus::Draft, now);
    posts_db_operations::save_post(db, &post)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), ActivityEvent::DraftSaved).for_post(post.id),
    );
    Ok(post)
}

/// CRUD actors edit in place; others edit their own drafts in place and stage
/// changes to anything already submitted or live.
pub fn update_post(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let mut post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::Edit)?;
    let draft = validate_input(conn, input, true)?;

    if !actor.has_crud_access() && post.status != PostStatus::Draft {
        return stage_update(db, conn, config, actor, post, draft, now);
    }
    ensure_no_outstanding(db, id)?;

    let was_published = post.status == PostStatus::Published;
    let changed_fields = post.draft().changed_fields(&draft);
    let new_time = draft.publish_date_time.is_some() && draft.publish_date_time != post.publish_date_time;
    post.apply_draft(&draft);
    post.updated_at = now;

    // A new publish time re-runs the decision table for live content.
    if new_time && actor.has_crud_access() && post.status != PostStatus::Draft && post.status != PostStatus::Archived {
        let decision = workflow::decide_for(actor, post.publish_date_time, now);
        workflow::apply_direct(&mut post, decision, &actor.username, now);
    }
    posts_db_operations::save_post(db, &post)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), ActivityEvent::PostUpdated { changed_fields })
            .for_post(post.id),
    );
    Ok(Transition::new(post, None, was_published))
}

fn stage_update(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    post: Post,
    proposed: PostDraft,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let approval_status = if workflow::is_future(proposed.publish_date_time, now) {
        ApprovalStatus::ScheduledPending
    } else {
        ApprovalStatus::PendingReview
    };
    let revision = workflow::new_revision(&post, actor, approval_status, proposed, Some(post.draft()), now);
    posts_db_operations::stage_revision(db, &post, &revision)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), submitted_event(&revision))
            .for_post(post.id)
            .for_revision(revision.id),
    );
    let was_published = post.status == PostStatus::Published;
    Ok(Transition::new(post, Some(revision), was_published))
}

/// Explicitly stages an update for review, leaving the live post untouched.
pub fn request_update(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::Edit)?;
    let draft = validate_input(conn, input, true)?;
    stage_update(db, conn, config, actor, post, draft, now)
}

pub fn publish_post(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::Publish)?;
    if post.status == PostStatus::Published {
        return Err(ApiError::Conflict("Post is already published.".to_string()));
    }
    if post.body.trim().is_empty() {
        return Err(ApiError::Validation("Body is required before publishing.".to_string()));
    }
    let decision = workflow::decide_for(actor, post.publish_date_time, now);
    advance(db, conn, config, actor, post, decision, now)
}

pub fn submit_for_approval(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::Submit)?;
    if post.status != PostStatus::Draft {
        return Err(ApiError::Conflict(format!(
            "Only drafts can be submitted (current status: {}).",
            post.status.as_str()
        )));
    }
    if post.body.trim().is_empty() {
        return Err(ApiError::Validation("Body is required before submitting.".to_string()));
    }
    let decision = workflow::decide_for(actor, post.publish_date_time, now);
    advance(db, conn, config, actor, post, decision, now)
}

pub fn cancel_schedule(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let mut post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::CancelSchedule)?;
    let mut outstanding = posts_db_operations::outstanding_revision(db, id)?;
    let event = workflow::cancel_schedule(&mut post, outstanding.as_mut(), actor, now)?;
    let revision = outstanding.filter(|r| r.approval_status == ApprovalStatus::Rejected);
    posts_db_operations::save_transition(db, &post, revision.as_ref())?;

    let mut activity = NewActivity::new(actor.into(), post.title.clone(), event).for_post(post.id);
    if let Some(r) = &revision {
        activity = activity.for_revision(r.id);
    }
    activity_helpers::record(conn, config, activity);
    Ok(Transition::new(post, revision, false))
}

pub fn archive_post(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Post, ApiError> {
    let mut post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::Archive)?;
    let event = workflow::archive(&mut post, now)?;
    posts_db_operations::save_post(db, &post)?;
    activity_helpers::record(conn, config, NewActivity::new(actor.into(), post.title.clone(), event).for_post(post.id));
    Ok(post)
}

pub fn delete_post(db: &Database, conn: &Connection, config: &Config, actor: &User, id: &Uuid) -> Result<(), ApiError> {
    let post = load_post(db, id)?;
    workflow::ensure_can(actor, &post, PostAction::Delete)?;
    let revisions_removed = posts_db_operations::delete_post(db, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), ActivityEvent::PostDeleted { revisions_removed })
            .for_post(post.id),
    );
    Ok(())
}

pub fn list_posts(db: &Database, filter: &PostFilter, page: PageRequest) -> Result<Page<Post>, ApiError> {
    let posts = posts_db_operations::list_posts(db, filter)?;
    Ok(Page::from_vec(posts, page))
}

/// Posts waiting on a publish time: approved schedules plus staged ones, soonest first.
pub fn scheduled_posts(db: &Database) -> Result<Vec<Post>, ApiError> {
    let mut posts: Vec<Post> = posts_db_operations::list_posts(db, &PostFilter::default())?
        .into_iter()
        .filter(|p| p.is_scheduled && matches!(p.status, PostStatus::Scheduled | PostStatus::PendingApproval))
        .collect();
    posts.sort_by_key(|p| p.publish_date_time);
    Ok(posts)
}
