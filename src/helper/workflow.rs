//! The approval and scheduling state machine.
//!
//! Everything here is pure: functions take the current post/revision plus the
//! acting user and clock, mutate in memory, and return the audit event to append.
//! Persisting the result is the caller's job.

use crate::error::ApiError;
use crate::models::activity_models::ActivityEvent;
use crate::models::{ApprovalStatus, Post, PostAction, PostDraft, PostStatus, Revision, Role, User};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Outcome of the create/publish decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub status: PostStatus,
    /// `Some` when the change must be staged for superadmin review.
    pub approval_status: Option<ApprovalStatus>,
    pub is_scheduled: bool,
    pub schedule_approved: bool,
}

impl Decision {
    pub fn requires_staging(&self) -> bool {
        self.approval_status.is_some()
    }
}

/// An absent target time means "now".
pub fn is_future(target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    target.map_or(false, |t| t > now)
}

pub fn decide(role: Role, crud_access: bool, target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Decision {
    let future = is_future(target, now);
    let direct = role == Role::Superadmin || crud_access;
    match (direct, future) {
        (true, false) => Decision {
            status: PostStatus::Published,
            approval_status: None,
            is_scheduled: false,
            schedule_approved: false,
        },
        (true, true) => Decision {
            status: PostStatus::Scheduled,
            approval_status: None,
            is_scheduled: true,
            schedule_approved: true,
        },
        (false, false) => Decision {
            status: PostStatus::PendingApproval,
            approval_status: Some(ApprovalStatus::PendingReview),
            is_scheduled: false,
            schedule_approved: false,
        },
        (false, true) => Decision {
            status: PostStatus::PendingApproval,
            approval_status: Some(ApprovalStatus::ScheduledPending),
            is_scheduled: true,
            schedule_approved: false,
        },
    }
}

pub fn decide_for(user: &User, target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Decision {
    decide(user.role, user.crud_access, target, now)
}

fn is_owner(user: &User, post: &Post) -> bool {
    post.author_id == Some(user.id)
}

/// Whether `user` may perform `action` on `post` at all.
pub fn can_act(user: &User, post: &Post, action: PostAction) -> bool {
    if user.is_superadmin() {
        return true;
    }
    match action {
        PostAction::Edit => is_owner(user, post) || user.crud_access,
        PostAction::Delete | PostAction::Archive => is_owner(user, post) && user.crud_access,
        PostAction::Publish | PostAction::CancelSchedule | PostAction::Submit => is_owner(user, post),
    }
}

pub fn ensure_can(user: &User, post: &Post, action: PostAction) -> Result<(), ApiError> {
    if can_act(user, post, action) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "You do not have permission to {} this post.",
            action.verb()
        )))
    }
}

// ====================================================================
// ======================== POST STATE SETTERS ========================
// ====================================================================

pub fn publish_now(post: &mut Post, approver: &str, now: DateTime<Utc>) {
    post.status = PostStatus::Published;
    post.is_scheduled = false;
    post.schedule_approved = false;
    post.schedule_approved_by = None;
    post.schedule_approved_at = None;
    post.rejection_reason = None;
    post.last_approved_by = Some(approver.to_string());
    post.last_approved_at = Some(now);
    if post.publish_date_time.map_or(true, |t| t > now) {
        post.publish_date_time = Some(now);
    }
    post.updated_at = now;
}

/// Only valid for a future publish time; callers check with [`is_future`] first.
pub fn schedule_approved(post: &mut Post, approver: &str, now: DateTime<Utc>) {
    post.status = PostStatus::Scheduled;
    post.is_scheduled = true;
    post.schedule_approved = true;
    post.schedule_approved_by = Some(approver.to_string());
    post.schedule_approved_at = Some(now);
    post.rejection_reason = None;
    post.updated_at = now;
}

pub fn mark_pending(post: &mut Post, scheduled: bool, now: DateTime<Utc>) {
    post.status = PostStatus::PendingApproval;
    post.is_scheduled = scheduled;
    post.schedule_approved = false;
    post.schedule_approved_by = None;
    post.schedule_approved_at = None;
    post.updated_at = now;
}

pub fn revert_to_draft(post: &mut Post, reason: Option<&str>, now: DateTime<Utc>) {
    post.status = PostStatus::Draft;
    post.is_scheduled = false;
    post.schedule_approved = false;
    post.schedule_approved_by = None;
    post.schedule_approved_at = None;
    post.rejection_reason = reason.map(str::to_string);
    post.updated_at = now;
}

/// Applies a direct (unstaged) decision to a post and returns the matching event.
pub fn apply_direct(post: &mut Post, decision: Decision, actor: &str, now: DateTime<Utc>) -> ActivityEvent {
    match decision.status {
        PostStatus::Scheduled => {
            schedule_approved(post, actor, now);
            match post.publish_date_time {
                Some(publish_at) => ActivityEvent::PostScheduled { publish_at },
                None => ActivityEvent::PostPublished { direct: true },
            }
        }
        _ => {
            publish_now(post, actor, now);
            ActivityEvent::PostPublished { direct: true }
        }
    }
}

// ====================================================================
// ============================ REVISIONS =============================
// ====================================================================

pub fn new_revision(
    post: &Post,
    submitter: &User,
    approval_status: ApprovalStatus,
    proposed: PostDraft,
    original: Option<PostDraft>,
    now: DateTime<Utc>,
) -> Revision {
    Revision {
        id: Uuid::new_v4(),
        post_id: post.id,
        submitted_by: submitter.id,
        submitted_by_name: submitter.username.clone(),
        approval_status,
        is_update_request: original.is_some(),
        proposed,
        original,
        version: 1,
        review_notes: None,
        rejection_reason: None,
        reviewed_by: None,
        reviewed_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn ensure_outstanding(revision: &Revision) -> Result<(), ApiError> {
    if revision.approval_status.is_outstanding() {
        Ok(())
    } else {
        Err(ApiError::Conflict(format!(
            "Revision is already resolved ({}).",
            revision.approval_status.as_str()
        )))
    }
}

fn required_text(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::Validation(format!("A non-empty {} is required.", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

fn mark_reviewed(revision: &mut Revision, status: ApprovalStatus, reviewer: &User, now: DateTime<Utc>) {
    revision.approval_status = status;
    revision.reviewed_by = Some(reviewer.username.clone());
    revision.reviewed_at = Some(now);
    revision.updated_at = now;
}

/// Superadmin approval. A staged schedule is routed to [`approve_schedule`].
pub fn approve(post: &mut Post, revision: &mut Revision, reviewer: &User, now: DateTime<Utc>) -> Result<ActivityEvent, ApiError> {
    if revision.approval_status == ApprovalStatus::ScheduledPending {
        return approve_schedule(post, revision, reviewer, now);
    }
    ensure_outstanding(revision)?;
    post.apply_draft(&revision.proposed);
    publish_now(post, &reviewer.username, now);
    mark_reviewed(revision, ApprovalStatus::Approved, reviewer, now);
    Ok(ActivityEvent::RevisionApproved { resulting_status: post.status })
}

/// Approves a staged schedule. A due time that has already passed publishes at once.
pub fn approve_schedule(
    post: &mut Post,
    revision: &mut Revision,
    reviewer: &User,
    now: DateTime<Utc>,
) -> Result<ActivityEvent, ApiError> {
    if revision.approval_status != ApprovalStatus::ScheduledPending {
        return Err(ApiError::Conflict("Revision is not awaiting schedule approval.".to_string()));
    }
    post.apply_draft(&revision.proposed);
    if is_future(post.publish_date_time, now) {
        schedule_approved(post, &reviewer.username, now);
        mark_reviewed(revision, ApprovalStatus::ScheduledApproved, reviewer, now);
    } else {
        publish_now(post, &reviewer.username, now);
        mark_reviewed(revision, ApprovalStatus::Approved, reviewer, now);
    }
    Ok(ActivityEvent::ScheduleApproved { publish_at: post.publish_date_time })
}

pub fn reject(post: &mut Post, revision: &mut Revision, reviewer: &User, reason: &str, now: DateTime<Utc>) -> Result<ActivityEvent, ApiError> {
    let reason = required_text(reason, "rejection reason")?;
    ensure_outstanding(revision)?;
    revision.rejection_reason = Some(reason.clone());
    mark_reviewed(revision, ApprovalStatus::Rejected, reviewer, now);
    revert_to_draft(post, Some(&reason), now);
    Ok(ActivityEvent::RevisionRejected { reason })
}

pub fn reject_schedule(
    post: &mut Post,
    revision: &mut Revision,
    reviewer: &User,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<ActivityEvent, ApiError> {
    let reason = required_text(reason, "rejection reason")?;
    if revision.approval_status != ApprovalStatus::ScheduledPending {
        return Err(ApiError::Conflict("Revision is not awaiting schedule approval.".to_string()));
    }
    revision.rejection_reason = Some(reason.clone());
    mark_reviewed(revision, ApprovalStatus::Rejected, reviewer, now);
    revert_to_draft(post, Some(&reason), now);
    Ok(ActivityEvent::ScheduleRejected { reason })
}

pub fn request_changes(
    post: &mut Post,
    revision: &mut Revision,
    reviewer: &User,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<ActivityEvent, ApiError> {
    let notes = required_text(notes, "review note")?;
    ensure_outstanding(revision)?;
    revision.review_notes = Some(notes.clone());
    mark_reviewed(revision, ApprovalStatus::ChangesRequested, reviewer, now);
    if post.status == PostStatus::PendingApproval {
        revert_to_draft(post, None, now);
    }
    Ok(ActivityEvent::ChangesRequested { notes })
}

/// The submitter sends a revised draft back for review.
pub fn resubmit(
    post: &mut Post,
    revision: &mut Revision,
    submitter: &User,
    proposed: PostDraft,
    now: DateTime<Utc>,
) -> Result<ActivityEvent, ApiError> {
    if revision.submitted_by != submitter.id {
        return Err(ApiError::Forbidden("Only the original submitter can resubmit this revision.".to_string()));
    }
    if !matches!(revision.approval_status, ApprovalStatus::ChangesRequested | ApprovalStatus::Rejected) {
        return Err(ApiError::Conflict(format!(
            "Only revisions with requested changes or a rejection can be resubmitted (current: {}).",
            revision.approval_status.as_str()
        )));
    }
    let scheduled = is_future(proposed.publish_date_time, now);
    revision.proposed = proposed;
    revision.version += 1;
    revision.approval_status = if scheduled {
        ApprovalStatus::ScheduledPending
    } else {
        ApprovalStatus::PendingReview
    };
    revision.rejection_reason = None;
    revision.reviewed_by = None;
    revision.reviewed_at = None;
    revision.updated_at = now;
    mark_pending(post, scheduled, now);
    Ok(ActivityEvent::RevisionResubmitted { version: revision.version })
}

/// Direct publish by an authorised actor while a staged submission is outstanding.
/// The submission is adopted and closed with the same outcome; staged updates to
/// a post stay with the reviewers.
pub fn publish_over_staged(post: &mut Post, revision: &mut Revision, actor: &User, now: DateTime<Utc>) -> Result<ActivityEvent, ApiError> {
    ensure_outstanding(revision)?;
    if revision.is_update_request {
        return Err(ApiError::Conflict(format!(
            "Post has update request {} awaiting review; resolve it under /approval first.",
            revision.id
        )));
    }
    let decision = decide_for(actor, revision.proposed.publish_date_time, now);
    if decision.requires_staging() {
        return Err(ApiError::Forbidden("This post is already awaiting review.".to_string()));
    }
    post.apply_draft(&revision.proposed);
    let event = apply_direct(post, decision, &actor.username, now);
    let status = if post.status == PostStatus::Scheduled {
        ApprovalStatus::ScheduledApproved
    } else {
        ApprovalStatus::Approved
    };
    mark_reviewed(revision, status, actor, now);
    Ok(event)
}

/// Pulls a post out of the schedule; an outstanding staged schedule is rejected.
pub fn cancel_schedule(post: &mut Post, outstanding: Option<&mut Revision>, actor: &User, now: DateTime<Utc>) -> Result<ActivityEvent, ApiError> {
    let staged = outstanding
        .as_ref()
        .map_or(false, |r| r.approval_status == ApprovalStatus::ScheduledPending);
    if post.status != PostStatus::Scheduled && !staged {
        return Err(ApiError::Conflict("Post is not scheduled.".to_string()));
    }
    if let Some(revision) = outstanding.filter(|r| r.approval_status == ApprovalStatus::ScheduledPending) {
        revision.rejection_reason = Some("schedule cancelled".to_string());
        mark_reviewed(revision, ApprovalStatus::Rejected, actor, now);
    }
    revert_to_draft(post, None, now);
    Ok(ActivityEvent::ScheduleCancelled)
}

pub fn archive(post: &mut Post, now: DateTime<Utc>) -> Result<ActivityEvent, ApiError> {
    if post.status == PostStatus::Archived {
        return Err(ApiError::Conflict("Post is already archived.".to_string()));
    }
    post.status = PostStatus::Archived;
    post.is_scheduled = false;
    post.schedule_approved = false;
    post.updated_at = now;
    Ok(ActivityEvent::PostArchived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostSource;
    use chrono::Duration;

    fn user(id: i64, role: Role, crud_access: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            role,
            crud_access,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    fn post(author_id: i64, publish: Option<DateTime<Utc>>) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            title: "Bond yields climb".to_string(),
            short_title: None,
            body: "Body".to_string(),
            category_id: 1,
            tags: vec![],
            author: format!("user{}", author_id),
            author_id: Some(author_id),
            publish_date_time: publish,
            status: PostStatus::PendingApproval,
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
        }
    }

    #[test]
    fn decision_table() {
        let now = Utc::now();
        let later = Some(now + Duration::hours(2));

        let d = decide(Role::Superadmin, false, None, now);
        assert_eq!((d.status, d.requires_staging()), (PostStatus::Published, false));

        let d = decide(Role::Superadmin, false, later, now);
        assert_eq!(d.status, PostStatus::Scheduled);
        assert!(d.is_scheduled && d.schedule_approved && !d.requires_staging());

        let d = decide(Role::Admin, true, None, now);
        assert_eq!(d.status, PostStatus::Published);

        let d = decide(Role::Admin, true, later, now);
        assert_eq!(d.status, PostStatus::Scheduled);
        assert!(d.schedule_approved);

        let d = decide(Role::Admin, false, None, now);
        assert_eq!(d.status, PostStatus::PendingApproval);
        assert_eq!(d.approval_status, Some(ApprovalStatus::PendingReview));

        let d = decide(Role::Admin, false, later, now);
        assert_eq!(d.status, PostStatus::PendingApproval);
        assert_eq!(d.approval_status, Some(ApprovalStatus::ScheduledPending));
        assert!(!d.schedule_approved);
    }

    #[test]
    fn past_target_counts_as_now() {
        let now = Utc::now();
        let d = decide(Role::Admin, true, Some(now - Duration::minutes(5)), now);
        assert_eq!(d.status, PostStatus::Published);
    }

    #[test]
    fn ownership_rules() {
        let owner = user(1, Role::Admin, false);
        let other = user(2, Role::Admin, false);
        let crud_other = user(3, Role::Admin, true);
        let root = user(4, Role::Superadmin, false);
        let p = post(1, None);

        assert!(can_act(&owner, &p, PostAction::Edit));
        assert!(!can_act(&other, &p, PostAction::Edit));
        assert!(can_act(&crud_other, &p, PostAction::Edit));
        assert!(!can_act(&owner, &p, PostAction::Delete));
        assert!(!can_act(&crud_other, &p, PostAction::Delete));
        assert!(can_act(&root, &p, PostAction::Delete));
        assert!(!can_act(&other, &p, PostAction::Publish));
        assert!(ensure_can(&other, &p, PostAction::CancelSchedule).is_err());
    }

    #[test]
    fn approve_publishes_and_resolves_revision() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, None);
        let mut rev = new_revision(&p, &admin, ApprovalStatus::PendingReview, p.draft(), None, now);

        let event = approve(&mut p, &mut rev, &root, now).unwrap();
        assert_eq!(event, ActivityEvent::RevisionApproved { resulting_status: PostStatus::Published });
        assert_eq!(p.status, PostStatus::Published);
        assert!(!p.schedule_approved && !p.is_scheduled);
        assert_eq!(p.last_approved_by.as_deref(), Some("user9"));
        assert_eq!(rev.approval_status, ApprovalStatus::Approved);

        // A resolved revision cannot be approved twice.
        assert!(approve(&mut p, &mut rev, &root, now).is_err());
    }

    #[test]
    fn approve_on_staged_schedule_schedules() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, Some(now + Duration::hours(2)));
        let mut rev = new_revision(&p, &admin, ApprovalStatus::ScheduledPending, p.draft(), None, now);

        approve(&mut p, &mut rev, &root, now).unwrap();
        assert_eq!(p.status, PostStatus::Scheduled);
        assert!(p.is_scheduled && p.schedule_approved);
        assert_eq!(rev.approval_status, ApprovalStatus::ScheduledApproved);
    }

    #[test]
    fn approve_schedule_in_the_past_publishes() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, Some(now - Duration::minutes(1)));
        let mut rev = new_revision(&p, &admin, ApprovalStatus::ScheduledPending, p.draft(), None, now);

        approve_schedule(&mut p, &mut rev, &root, now).unwrap();
        assert_eq!(p.status, PostStatus::Published);
        assert_eq!(rev.approval_status, ApprovalStatus::Approved);
    }

    #[test]
    fn reject_requires_reason_and_reverts_to_draft() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, None);
        p.schedule_approved = true;
        let mut rev = new_revision(&p, &admin, ApprovalStatus::PendingReview, p.draft(), None, now);

        assert!(matches!(reject(&mut p, &mut rev, &root, "   ", now), Err(ApiError::Validation(_))));
        assert_eq!(rev.approval_status, ApprovalStatus::PendingReview);

        reject(&mut p, &mut rev, &root, "needs sources", now).unwrap();
        assert_eq!(p.status, PostStatus::Draft);
        assert!(!p.schedule_approved);
        assert_eq!(rev.approval_status, ApprovalStatus::Rejected);
        assert_eq!(rev.rejection_reason.as_deref(), Some("needs sources"));
    }

    #[test]
    fn request_changes_then_resubmit_bumps_version() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let other = user(2, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, None);
        let mut rev = new_revision(&p, &admin, ApprovalStatus::PendingReview, p.draft(), None, now);

        assert!(request_changes(&mut p, &mut rev, &root, "", now).is_err());
        request_changes(&mut p, &mut rev, &root, "add a chart", now).unwrap();
        assert_eq!(p.status, PostStatus::Draft);
        assert_eq!(rev.approval_status, ApprovalStatus::ChangesRequested);

        let mut revised = p.draft();
        revised.title = "Bond yields climb further".to_string();
        assert!(matches!(
            resubmit(&mut p, &mut rev, &other, revised.clone(), now),
            Err(ApiError::Forbidden(_))
        ));

        let event = resubmit(&mut p, &mut rev, &admin, revised, now).unwrap();
        assert_eq!(event, ActivityEvent::RevisionResubmitted { version: 2 });
        assert_eq!(rev.approval_status, ApprovalStatus::PendingReview);
        assert_eq!(p.status, PostStatus::PendingApproval);
    }

    #[test]
    fn direct_publish_adopts_staged_submission() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, None);
        let mut revised = p.draft();
        revised.title = "Bond yields climb again".to_string();
        let mut rev = new_revision(&p, &admin, ApprovalStatus::PendingReview, revised, None, now);

        publish_over_staged(&mut p, &mut rev, &root, now).unwrap();
        assert_eq!(p.status, PostStatus::Published);
        assert_eq!(p.title, "Bond yields climb again");
        assert_eq!(rev.approval_status, ApprovalStatus::Approved);
        assert_eq!(rev.reviewed_by.as_deref(), Some("user9"));

        // The closed revision can no longer drag the live post back to draft.
        assert!(matches!(reject(&mut p, &mut rev, &root, "late", now), Err(ApiError::Conflict(_))));
        assert_eq!(p.status, PostStatus::Published);
    }

    #[test]
    fn direct_publish_leaves_staged_updates_to_reviewers() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let root = user(9, Role::Superadmin, false);
        let mut p = post(1, Some(now + Duration::hours(1)));
        p.status = PostStatus::Scheduled;
        let mut rev = new_revision(&p, &admin, ApprovalStatus::PendingReview, p.draft(), Some(p.draft()), now);

        assert!(matches!(publish_over_staged(&mut p, &mut rev, &root, now), Err(ApiError::Conflict(_))));
        assert_eq!(p.status, PostStatus::Scheduled);
        assert_eq!(rev.approval_status, ApprovalStatus::PendingReview);
    }

    #[test]
    fn cancel_schedule_rejects_staged_schedule() {
        let now = Utc::now();
        let admin = user(1, Role::Admin, false);
        let mut p = post(1, Some(now + Duration::hours(1)));
        p.is_scheduled = true;
        let mut rev = new_revision(&p, &admin, ApprovalStatus::ScheduledPending, p.draft(), None, now);

        cancel_schedule(&mut p, Some(&mut rev), &admin, now).unwrap();
        assert_eq!(p.status, PostStatus::Draft);
        assert!(!p.is_scheduled);
        assert_eq!(rev.approval_status, ApprovalStatus::Rejected);
        assert_eq!(rev.rejection_reason.as_deref(), Some("schedule cancelled"));

        assert!(cancel_schedule(&mut p, None, &admin, now).is_err());
    }
}
