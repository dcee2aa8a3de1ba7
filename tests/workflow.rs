mod common;

use chrono::{Duration, Utc};
use common::{post_input, Harness, RecordingGateway};
use newsdesk_backend::error::ApiError;
use newsdesk_backend::helper::{approval_helpers, category_helpers, post_helpers, scheduler_helpers};
use newsdesk_backend::models::db_operations::activity_db_operations::{self, ActivityFilter};
use newsdesk_backend::models::db_operations::notifications_db_operations::{self, SubscriptionRecord};
use newsdesk_backend::models::db_operations::{categories_db_operations, posts_db_operations};
use newsdesk_backend::models::notification_models::{Channels, SubscriptionType};
use newsdesk_backend::models::{ApprovalStatus, PostStatus, Role};

#[test]
fn admin_without_crud_access_stages_new_posts_for_review() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Rates hold", category, None), now).unwrap();
    assert_eq!(staged.post.status, PostStatus::PendingApproval);
    assert!(!staged.newly_published);
    let revision = staged.revision.expect("staged revision");
    assert_eq!(revision.approval_status, ApprovalStatus::PendingReview);
    assert!(!revision.is_update_request);

    let approved = approval_helpers::approve(&h.db, &conn, &h.config, &chief, &revision.id, now).unwrap();
    assert_eq!(approved.post.status, PostStatus::Published);
    assert!(approved.newly_published);
    assert_eq!(approved.post.last_approved_by.as_deref(), Some("chief"));
    assert_eq!(approved.revision.unwrap().approval_status, ApprovalStatus::Approved);

    let stored = post_helpers::load_post(&h.db, &staged.post.id).unwrap();
    assert_eq!(stored.status, PostStatus::Published);
}

#[test]
fn admin_cannot_resolve_revisions() {
    let h = Harness::new();
    let writer = h.user("writer", Role::Admin, true);
    let other = h.user("other", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &other, &post_input("Bond yields", category, None), now).unwrap();
    let revision_id = staged.revision.unwrap().id;

    let err = approval_helpers::approve(&h.db, &conn, &h.config, &writer, &revision_id, now).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[test]
fn crud_admin_publishes_directly_and_schedules_future_posts() {
    let h = Harness::new();
    let editor = h.user("editor", Role::Admin, true);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let live = post_helpers::create_post(&h.db, &conn, &h.config, &editor, &post_input("Live now", category, None), now).unwrap();
    assert_eq!(live.post.status, PostStatus::Published);
    assert!(live.newly_published);
    assert!(live.revision.is_none());

    let later = now + Duration::hours(2);
    let scheduled =
        post_helpers::create_post(&h.db, &conn, &h.config, &editor, &post_input("Later", category, Some(later)), now).unwrap();
    assert_eq!(scheduled.post.status, PostStatus::Scheduled);
    assert!(scheduled.post.is_scheduled);
    assert!(scheduled.post.schedule_approved);
    assert!(!scheduled.newly_published);
}

#[test]
fn rejection_requires_a_reason_and_returns_post_to_draft() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Draft take", category, None), now).unwrap();
    let revision_id = staged.revision.unwrap().id;

    let err = approval_helpers::reject(&h.db, &conn, &h.config, &chief, &revision_id, "   ", now).unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let rejected = approval_helpers::reject(&h.db, &conn, &h.config, &chief, &revision_id, "Needs sources", now).unwrap();
    assert_eq!(rejected.post.status, PostStatus::Draft);
    assert_eq!(rejected.post.rejection_reason.as_deref(), Some("Needs sources"));
    let revision = rejected.revision.unwrap();
    assert_eq!(revision.approval_status, ApprovalStatus::Rejected);

    // Resolved revisions cannot be resolved again.
    let err = approval_helpers::approve(&h.db, &conn, &h.config, &chief, &revision_id, now).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[test]
fn requested_changes_can_be_resubmitted_by_the_submitter_only() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let bystander = h.user("bystander", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Earnings", category, None), now).unwrap();
    let revision_id = staged.revision.unwrap().id;

    let changes = approval_helpers::request_changes(&h.db, &conn, &h.config, &chief, &revision_id, "Add a chart", now).unwrap();
    assert_eq!(changes.post.status, PostStatus::Draft);
    assert_eq!(changes.revision.as_ref().unwrap().approval_status, ApprovalStatus::ChangesRequested);
    assert_eq!(changes.revision.unwrap().review_notes.as_deref(), Some("Add a chart"));

    let revised = post_input("Earnings, with chart", category, None);
    let err = approval_helpers::resubmit(&h.db, &conn, &h.config, &bystander, &revision_id, &revised, now).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let resubmitted = approval_helpers::resubmit(&h.db, &conn, &h.config, &writer, &revision_id, &revised, now).unwrap();
    let revision = resubmitted.revision.unwrap();
    assert_eq!(revision.version, 2);
    assert_eq!(revision.approval_status, ApprovalStatus::PendingReview);
    assert_eq!(resubmitted.post.status, PostStatus::PendingApproval);

    let approved = approval_helpers::approve(&h.db, &conn, &h.config, &chief, &revision_id, now).unwrap();
    assert_eq!(approved.post.title, "Earnings, with chart");
    assert_eq!(approved.post.status, PostStatus::Published);
}

#[test]
fn owner_without_crud_access_stages_updates_to_live_posts() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Original", category, None), now).unwrap();
    approval_helpers::approve(&h.db, &conn, &h.config, &chief, &staged.revision.unwrap().id, now).unwrap();

    let edit = post_helpers::update_post(
        &h.db,
        &conn,
        &h.config,
        &writer,
        &staged.post.id,
        &post_input("Edited", category, None),
        now,
    )
    .unwrap();
    let revision = edit.revision.expect("update request");
    assert!(revision.is_update_request);
    assert_eq!(revision.original.as_ref().unwrap().title, "Original");

    // The live post is untouched until the update is approved.
    assert_eq!(post_helpers::load_post(&h.db, &staged.post.id).unwrap().title, "Original");

    let approved = approval_helpers::approve(&h.db, &conn, &h.config, &chief, &revision.id, now).unwrap();
    assert_eq!(approved.post.title, "Edited");
    assert!(!approved.newly_published);
}

#[test]
fn non_owner_without_crud_access_cannot_edit() {
    let h = Harness::new();
    let editor = h.user("editor", Role::Admin, true);
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let post = post_helpers::create_post(&h.db, &conn, &h.config, &editor, &post_input("Theirs", category, None), now).unwrap();
    let err = post_helpers::update_post(&h.db, &conn, &h.config, &writer, &post.post.id, &post_input("Mine", category, None), now)
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[actix_web::test]
async fn approved_schedule_is_published_by_the_scheduler_tick() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let gateway = RecordingGateway::default();
    let now = Utc::now();
    let publish_at = now + Duration::minutes(1);

    let post_id = {
        let conn = h.pool.get().unwrap();
        let staged =
            post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Open bell", category, Some(publish_at)), now)
                .unwrap();
        let revision = staged.revision.unwrap();
        assert_eq!(revision.approval_status, ApprovalStatus::ScheduledPending);
        assert!(staged.post.is_scheduled);

        let pending = approval_helpers::pending_schedule_approvals(&h.db, &chief).unwrap();
        assert_eq!(pending.len(), 1);

        let approved = approval_helpers::approve_schedule(&h.db, &conn, &h.config, &chief, &revision.id, now).unwrap();
        assert_eq!(approved.post.status, PostStatus::Scheduled);
        assert!(approved.post.schedule_approved);
        assert_eq!(approved.post.schedule_approved_by.as_deref(), Some("chief"));
        assert_eq!(approved.revision.unwrap().approval_status, ApprovalStatus::ScheduledApproved);
        staged.post.id
    };
    assert_eq!(post_helpers::scheduled_posts(&h.db).unwrap().len(), 1);

    // Nothing is due yet.
    let early = scheduler_helpers::run_tick(&h.db, &h.pool, &h.config, &gateway, now).await.unwrap();
    assert_eq!(early.due, 0);

    let report = scheduler_helpers::run_tick(&h.db, &h.pool, &h.config, &gateway, now + Duration::minutes(2)).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.published, 1);
    assert_eq!(report.failed, 0);

    let post = post_helpers::load_post(&h.db, &post_id).unwrap();
    assert_eq!(post.status, PostStatus::Published);
    assert!(!post.is_scheduled);
    assert_eq!(post.last_approved_by.as_deref(), Some("system"));

    // A second tick finds nothing left to publish.
    let again = scheduler_helpers::run_tick(&h.db, &h.pool, &h.config, &gateway, now + Duration::minutes(3)).await.unwrap();
    assert_eq!(again.published, 0);

    let conn = h.pool.get().unwrap();
    let filter = ActivityFilter { activity_type: Some("scheduled_publish".to_string()), actor_id: None, post_id: Some(post_id) };
    assert_eq!(activity_db_operations::count_activities(&conn, &filter).unwrap(), 1);
}

#[actix_web::test]
async fn posts_overdue_beyond_the_lookback_window_are_left_alone() {
    let h = Harness::new();
    let editor = h.user("editor", Role::Admin, true);
    let category = h.category("Markets");
    let gateway = RecordingGateway::default();
    let now = Utc::now();

    let post_id = {
        let conn = h.pool.get().unwrap();
        let scheduled = post_helpers::create_post(
            &h.db,
            &conn,
            &h.config,
            &editor,
            &post_input("Stale", category, Some(now + Duration::minutes(1))),
            now,
        )
        .unwrap();
        assert_eq!(scheduled.post.status, PostStatus::Scheduled);
        scheduled.post.id
    };

    let late = now + Duration::minutes(h.config.scheduler.lookback_minutes + 5);
    let report = scheduler_helpers::run_tick(&h.db, &h.pool, &h.config, &gateway, late).await.unwrap();
    assert_eq!(report.due, 0);
    assert_eq!(report.published, 0);
    assert_eq!(post_helpers::load_post(&h.db, &post_id).unwrap().status, PostStatus::Scheduled);
}

#[test]
fn approval_is_recorded_once_in_the_activity_log() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Rates hold", category, None), now).unwrap();
    approval_helpers::approve(&h.db, &conn, &h.config, &chief, &staged.revision.unwrap().id, now).unwrap();

    let filter = ActivityFilter {
        activity_type: Some("revision_approved".to_string()),
        actor_id: Some(chief.id),
        post_id: Some(staged.post.id),
    };
    assert_eq!(activity_db_operations::count_activities(&conn, &filter).unwrap(), 1);
}

#[actix_web::test]
async fn scheduler_tick_notifies_subscribers() {
    let h = Harness::new();
    let editor = h.user("editor", Role::Admin, true);
    let reader = h.user("reader", Role::Admin, false);
    let category = h.category("Markets");
    let gateway = RecordingGateway::default();
    let now = Utc::now();

    {
        let conn = h.pool.get().unwrap();
        let record = SubscriptionRecord {
            subscription_type: SubscriptionType::All,
            feed_id: None,
            category_id: None,
            channels: Channels { in_app: true, web_push: false, email: false },
            max_per_hour: 10,
            max_per_day: 50,
            is_active: true,
        };
        notifications_db_operations::create_subscription(&conn, reader.id, &record).unwrap();
        post_helpers::create_post(&h.db, &conn, &h.config, &editor, &post_input("Closing bell", category, Some(now + Duration::minutes(1))), now)
            .unwrap();
    }

    let report = scheduler_helpers::run_tick(&h.db, &h.pool, &h.config, &gateway, now + Duration::minutes(2)).await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(report.notifications.in_app, 1);

    let conn = h.pool.get().unwrap();
    assert_eq!(notifications_db_operations::count_notifications(&conn, reader.id, true).unwrap(), 1);
}

#[actix_web::test]
async fn cancelled_schedule_is_not_published() {
    let h = Harness::new();
    let editor = h.user("editor", Role::Admin, true);
    let category = h.category("Markets");
    let gateway = RecordingGateway::default();
    let now = Utc::now();

    let post_id = {
        let conn = h.pool.get().unwrap();
        let scheduled = post_helpers::create_post(
            &h.db,
            &conn,
            &h.config,
            &editor,
            &post_input("Maybe later", category, Some(now + Duration::minutes(1))),
            now,
        )
        .unwrap();
        let cancelled = post_helpers::cancel_schedule(&h.db, &conn, &h.config, &editor, &scheduled.post.id, now).unwrap();
        assert_eq!(cancelled.post.status, PostStatus::Draft);
        assert!(!cancelled.post.is_scheduled);
        scheduled.post.id
    };

    let report = scheduler_helpers::run_tick(&h.db, &h.pool, &h.config, &gateway, now + Duration::minutes(2)).await.unwrap();
    assert_eq!(report.published, 0);
    assert_eq!(post_helpers::load_post(&h.db, &post_id).unwrap().status, PostStatus::Draft);
}

#[test]
fn category_in_use_cannot_be_deleted() {
    let h = Harness::new();
    let chief = h.superadmin();
    let category = h.category("Commodities");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let post = post_helpers::create_post(&h.db, &conn, &h.config, &chief, &post_input("Gold", category, None), now).unwrap();

    let err = category_helpers::delete(&h.db, &conn, &h.config, &chief, category).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert!(categories_db_operations::read_category(&conn, category).unwrap().is_some());

    post_helpers::delete_post(&h.db, &conn, &h.config, &chief, &post.post.id).unwrap();
    category_helpers::delete(&h.db, &conn, &h.config, &chief, category).unwrap();
    assert!(categories_db_operations::read_category(&conn, category).unwrap().is_none());
}

#[test]
fn category_proposed_by_a_pending_update_cannot_be_deleted() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let markets = h.category("Markets");
    let energy = h.category("Energy");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Crude rises", markets, None), now).unwrap();
    approval_helpers::approve(&h.db, &conn, &h.config, &chief, &staged.revision.unwrap().id, now).unwrap();
    post_helpers::update_post(&h.db, &conn, &h.config, &writer, &staged.post.id, &post_input("Crude rises", energy, None), now)
        .unwrap();

    let err = category_helpers::delete(&h.db, &conn, &h.config, &chief, energy).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert!(categories_db_operations::read_category(&conn, energy).unwrap().is_some());
}

#[test]
fn approving_into_a_missing_category_is_refused() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let markets = h.category("Markets");
    let energy = h.category("Energy");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Crude rises", markets, None), now).unwrap();
    approval_helpers::approve(&h.db, &conn, &h.config, &chief, &staged.revision.unwrap().id, now).unwrap();
    let edit = post_helpers::update_post(&h.db, &conn, &h.config, &writer, &staged.post.id, &post_input("Crude rises", energy, None), now)
        .unwrap();
    categories_db_operations::delete_category(&conn, energy).unwrap();

    let revision = edit.revision.unwrap();
    let err = approval_helpers::approve(&h.db, &conn, &h.config, &chief, &revision.id, now).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let post = post_helpers::load_post(&h.db, &staged.post.id).unwrap();
    assert_eq!(post.category_id, markets);
    assert!(posts_db_operations::outstanding_revision(&h.db, &post.id).unwrap().is_some());
}

#[test]
fn direct_publish_closes_the_pending_submission() {
    let h = Harness::new();
    let chief = h.superadmin();
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Rates hold", category, None), now).unwrap();
    let revision_id = staged.revision.unwrap().id;

    let published = post_helpers::publish_post(&h.db, &conn, &h.config, &chief, &staged.post.id, now).unwrap();
    assert_eq!(published.post.status, PostStatus::Published);
    assert_eq!(published.revision.unwrap().approval_status, ApprovalStatus::Approved);
    assert!(posts_db_operations::outstanding_revision(&h.db, &staged.post.id).unwrap().is_none());

    let err = approval_helpers::reject(&h.db, &conn, &h.config, &chief, &revision_id, "Too late", now).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(post_helpers::load_post(&h.db, &staged.post.id).unwrap().status, PostStatus::Published);
}

#[test]
fn in_place_edit_waits_for_pending_update_to_be_resolved() {
    let h = Harness::new();
    let chief = h.superadmin();
    let editor = h.user("editor", Role::Admin, true);
    let writer = h.user("writer", Role::Admin, false);
    let category = h.category("Markets");
    let conn = h.pool.get().unwrap();
    let now = Utc::now();

    let staged = post_helpers::create_post(&h.db, &conn, &h.config, &writer, &post_input("Original", category, None), now).unwrap();
    approval_helpers::approve(&h.db, &conn, &h.config, &chief, &staged.revision.unwrap().id, now).unwrap();
    post_helpers::update_post(&h.db, &conn, &h.config, &writer, &staged.post.id, &post_input("Proposed", category, None), now)
        .unwrap();

    let err = post_helpers::update_post(&h.db, &conn, &h.config, &editor, &staged.post.id, &post_input("Overwrite", category, None), now)
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(post_helpers::load_post(&h.db, &staged.post.id).unwrap().title, "Original");
}

#[test]
fn manual_titles_are_stored_decoded() {
    let h = Harness::new();
    let chief = h.superadmin();
    let category = h.category("Energy");
    let conn = h.pool.get().unwrap();

    let created =
        post_helpers::create_post(&h.db, &conn, &h.config, &chief, &post_input("Oil &amp; gas rally", category, None), Utc::now()).unwrap();
    assert_eq!(created.post.title, "Oil & gas rally");
    assert_eq!(posts_db_operations::find_duplicate(&h.db, None, None, "Oil & gas rally").unwrap(), Some(created.post.id));
}
