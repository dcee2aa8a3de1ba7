use crate::config::Config;
use crate::error::ApiError;
use crate::helper::activity_helpers;
use crate::helper::post_helpers::{self, PostInput, Transition};
use crate::helper::workflow;
use crate::middleware::require_superadmin;
use crate::models::activity_models::{ActivityEvent, NewActivity};
use crate::models::db_operations::posts_db_operations::{self, RevisionFilter};
use crate::models::{ApprovalStatus, Page, PageRequest, Post, PostStatus, Revision, User};
use chrono::{DateTime, Utc};
use redb::Database;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

/// A revision with the post it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionView {
    pub revision: Revision,
    pub post: Option<Post>,
}

fn load_revision(db: &Database, id: &Uuid) -> Result<Revision, ApiError> {
    posts_db_operations::read_revision(db, id)?.ok_or_else(|| ApiError::not_found(format!("Revision {}", id)))
}

fn load_pair(db: &Database, id: &Uuid) -> Result<(Post, Revision), ApiError> {
    let revision = load_revision(db, id)?;
    let post = post_helpers::load_post(db, &revision.post_id)?;
    Ok((post, revision))
}

/// Loads the pair, applies `step`, then writes post and revision together and audits.
fn resolve<F>(
    db: &Database,
    conn: &Connection,
    config: &Config,
    reviewer: &User,
    revision_id: &Uuid,
    now: DateTime<Utc>,
    step: F,
) -> Result<Transition, ApiError>
where
    F: FnOnce(&mut Post, &mut Revision, &User, DateTime<Utc>) -> Result<ActivityEvent, ApiError>,
{
    require_superadmin(reviewer)?;
    let (mut post, mut revision) = load_pair(db, revision_id)?;
    let was_published = post.status == PostStatus::Published;
    let event = step(&mut post, &mut revision, reviewer, now)?;
    post_helpers::ensure_category(conn, post.category_id)?;
    posts_db_operations::save_transition(db, &post, Some(&revision))?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(reviewer.into(), post.title.clone(), event)
            .for_post(post.id)
            .for_revision(revision.id),
    );
    let newly_published = !was_published && post.status == PostStatus::Published;
    Ok(Transition { post, revision: Some(revision), newly_published })
}

pub fn approve(db: &Database, conn: &Connection, config: &Config, reviewer: &User, id: &Uuid, now: DateTime<Utc>) -> Result<Transition, ApiError> {
    resolve(db, conn, config, reviewer, id, now, workflow::approve)
}

pub fn approve_schedule(db: &Database, conn: &Connection, config: &Config, reviewer: &User, id: &Uuid, now: DateTime<Utc>) -> Result<Transition, ApiError> {
    resolve(db, conn, config, reviewer, id, now, workflow::approve_schedule)
}

pub fn reject(
    db: &Database,
    conn: &Connection,
    config: &Config,
    reviewer: &User,
    id: &Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    resolve(db, conn, config, reviewer, id, now, |post, revision, user, now| {
        workflow::reject(post, revision, user, reason, now)
    })
}

pub fn reject_schedule(
    db: &Database,
    conn: &Connection,
    config: &Config,
    reviewer: &User,
    id: &Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    resolve(db, conn, config, reviewer, id, now, |post, revision, user, now| {
        workflow::reject_schedule(post, revision, user, reason, now)
    })
}

pub fn request_changes(
    db: &Database,
    conn: &Connection,
    config: &Config,
    reviewer: &User,
    id: &Uuid,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    resolve(db, conn, config, reviewer, id, now, |post, revision, user, now| {
        workflow::request_changes(post, revision, user, notes, now)
    })
}

/// Sends a revised draft back for review after changes were requested or it was rejected.
pub fn resubmit(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: &Uuid,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let (mut post, mut revision) = load_pair(db, id)?;
    let proposed = post_helpers::validate_input(conn, input, true)?;
    let event = workflow::resubmit(&mut post, &mut revision, actor, proposed, now)?;
    // An update request leaves the live post untouched until approval.
    if revision.is_update_request {
        post = post_helpers::load_post(db, &revision.post_id)?;
    }
    posts_db_operations::stage_revision(db, &post, &revision)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), post.title.clone(), event)
            .for_post(post.id)
            .for_revision(revision.id),
    );
    Ok(Transition { post, revision: Some(revision), newly_published: false })
}

/// Submits a brand-new post straight into review, whatever the caller's access.
pub fn submit_new(
    db: &Database,
    conn: &Connection,
    config: &Config,
    actor: &User,
    input: &PostInput,
    now: DateTime<Utc>,
) -> Result<Transition, ApiError> {
    let draft = post_helpers::validate_input(conn, input, true)?;
    let scheduled = workflow::is_future(draft.publish_date_time, now);
    let approval_status = if scheduled { ApprovalStatus::ScheduledPending } else { ApprovalStatus::PendingReview };

    let mut post = post_helpers::new_post(&draft, actor, PostStatus::PendingApproval, now);
    workflow::mark_pending(&mut post, scheduled, now);

    let revision = workflow::new_revision(&post, actor, approval_status, draft, None, now);
    posts_db_operations::stage_revision(db, &post, &revision)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(
            actor.into(),
            post.title.clone(),
            ActivityEvent::RevisionSubmitted { approval_status, is_update_request: false, version: 1 },
        )
        .for_post(post.id)
        .for_revision(revision.id),
    );
    Ok(Transition { post, revision: Some(revision), newly_published: false })
}

fn with_posts(db: &Database, revisions: Vec<Revision>) -> Result<Vec<RevisionView>, ApiError> {
    revisions
        .into_iter()
        .map(|revision| {
            let post = posts_db_operations::read_post(db, &revision.post_id)?;
            Ok(RevisionView { revision, post })
        })
        .collect()
}

pub fn list_revisions(
    db: &Database,
    viewer: &User,
    status: Option<ApprovalStatus>,
    page: PageRequest,
) -> Result<Page<RevisionView>, ApiError> {
    require_superadmin(viewer)?;
    let revisions = posts_db_operations::list_revisions(db, &RevisionFilter { status, submitted_by: None })?;
    let page = Page::from_vec(revisions, page);
    Ok(Page { items: with_posts(db, page.items)?, pagination: page.pagination })
}

pub fn my_revisions(
    db: &Database,
    actor: &User,
    status: Option<ApprovalStatus>,
    page: PageRequest,
) -> Result<Page<RevisionView>, ApiError> {
    let revisions = posts_db_operations::list_revisions(db, &RevisionFilter { status, submitted_by: Some(actor.id) })?;
    let page = Page::from_vec(revisions, page);
    Ok(Page { items: with_posts(db, page.items)?, pagination: page.pagination })
}

pub fn get_revision(db: &Database, viewer: &User, id: &Uuid) -> Result<RevisionView, ApiError> {
    let revision = load_revision(db, id)?;
    if !viewer.is_superadmin() && revision.submitted_by != viewer.id {
        return Err(ApiError::Forbidden("You can only view your own submissions.".to_string()));
    }
    let post = posts_db_operations::read_post(db, &revision.post_id)?;
    Ok(RevisionView { revision, post })
}

pub fn pending_schedule_approvals(db: &Database, viewer: &User) -> Result<Vec<RevisionView>, ApiError> {
    require_superadmin(viewer)?;
    let revisions = posts_db_operations::list_revisions(
        db,
        &RevisionFilter { status: Some(ApprovalStatus::ScheduledPending), submitted_by: None },
    )?;
    with_posts(db, revisions)
}
