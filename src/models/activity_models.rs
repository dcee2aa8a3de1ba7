use crate::models::{ApprovalStatus, PostStatus, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Severity> {
        match value {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Structured payload of an audit entry. One variant per kind of action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum ActivityEvent {
    UserLogin,
    PostCreated { status: PostStatus },
    DraftSaved,
    PostUpdated { changed_fields: Vec<String> },
    PostPublished { direct: bool },
    PostScheduled { publish_at: DateTime<Utc> },
    PostArchived,
    PostDeleted { revisions_removed: usize },
    ScheduleCancelled,
    RevisionSubmitted {
        approval_status: ApprovalStatus,
        is_update_request: bool,
        version: u32,
    },
    RevisionResubmitted { version: u32 },
    RevisionApproved { resulting_status: PostStatus },
    RevisionRejected { reason: String },
    ChangesRequested { notes: String },
    ScheduleApproved { publish_at: Option<DateTime<Utc>> },
    ScheduleRejected { reason: String },
    ScheduledPublish { due_at: Option<DateTime<Utc>>, recipients: usize },
    CategoryCreated { name: String },
    CategoryUpdated { name: String },
    CategoryDeleted { name: String },
    FeedConfigCreated { url: String },
    FeedConfigUpdated { url: String },
    FeedConfigDeleted { url: String },
    RssFetched {
        feed_id: Option<i64>,
        url: String,
        saved: usize,
        skipped: usize,
        errors: usize,
    },
    RssFetchFailed { feed_id: Option<i64>, url: String, error: String },
    AdminCreated { username: String, crud_access: bool },
    AdminUpdated { username: String, crud_access: bool, is_active: bool },
    AdminDeleted { username: String },
}

impl ActivityEvent {
    pub fn activity_type(&self) -> &'static str {
        match self {
            ActivityEvent::UserLogin => "user_login",
            ActivityEvent::PostCreated { .. } => "post_created",
            ActivityEvent::DraftSaved => "draft_saved",
            ActivityEvent::PostUpdated { .. } => "post_updated",
            ActivityEvent::PostPublished { .. } => "post_published",
            ActivityEvent::PostScheduled { .. } => "post_scheduled",
            ActivityEvent::PostArchived => "post_archived",
            ActivityEvent::PostDeleted { .. } => "post_deleted",
            ActivityEvent::ScheduleCancelled => "schedule_cancelled",
            ActivityEvent::RevisionSubmitted { .. } => "revision_submitted",
            ActivityEvent::RevisionResubmitted { .. } => "revision_resubmitted",
            ActivityEvent::RevisionApproved { .. } => "revision_approved",
            ActivityEvent::RevisionRejected { .. } => "revision_rejected",
            ActivityEvent::ChangesRequested { .. } => "changes_requested",
            ActivityEvent::ScheduleApproved { .. } => "schedule_approved",
            ActivityEvent::ScheduleRejected { .. } => "schedule_rejected",
            ActivityEvent::ScheduledPublish { .. } => "scheduled_publish",
            ActivityEvent::CategoryCreated { .. } => "category_created",
            ActivityEvent::CategoryUpdated { .. } => "category_updated",
            ActivityEvent::CategoryDeleted { .. } => "category_deleted",
            ActivityEvent::FeedConfigCreated { .. } => "feed_config_created",
            ActivityEvent::FeedConfigUpdated { .. } => "feed_config_updated",
            ActivityEvent::FeedConfigDeleted { .. } => "feed_config_deleted",
            ActivityEvent::RssFetched { .. } => "rss_fetched",
            ActivityEvent::RssFetchFailed { .. } => "rss_fetch_failed",
            ActivityEvent::AdminCreated { .. } => "admin_created",
            ActivityEvent::AdminUpdated { .. } => "admin_updated",
            ActivityEvent::AdminDeleted { .. } => "admin_deleted",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ActivityEvent::PostDeleted { .. }
            | ActivityEvent::CategoryDeleted { .. }
            | ActivityEvent::FeedConfigDeleted { .. }
            | ActivityEvent::RevisionRejected { .. }
            | ActivityEvent::ScheduleRejected { .. }
            | ActivityEvent::RssFetchFailed { .. } => Severity::Warning,
            ActivityEvent::AdminCreated { .. }
            | ActivityEvent::AdminUpdated { .. }
            | ActivityEvent::AdminDeleted { .. } => Severity::Critical,
            _ => Severity::Info,
        }
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Option<i64>,
    pub name: String,
}

impl Actor {
    pub const SYSTEM_NAME: &'static str = "system";

    pub fn system() -> Self {
        Actor { id: None, name: Self::SYSTEM_NAME.to_string() }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor { id: Some(user.id), name: user.username.clone() }
    }
}

/// An activity waiting to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub actor: Actor,
    pub title: String,
    pub post_id: Option<Uuid>,
    pub revision_id: Option<Uuid>,
    pub event: ActivityEvent,
}

impl NewActivity {
    pub fn new(actor: Actor, title: impl Into<String>, event: ActivityEvent) -> Self {
        NewActivity { actor, title: title.into(), post_id: None, revision_id: None, event }
    }

    pub fn for_post(mut self, post_id: Uuid) -> Self {
        self.post_id = Some(post_id);
        self
    }

    pub fn for_revision(mut self, revision_id: Uuid) -> Self {
        self.revision_id = Some(revision_id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub activity_type: String,
    pub actor_id: Option<i64>,
    pub actor_name: String,
    pub title: String,
    pub post_id: Option<Uuid>,
    pub revision_id: Option<Uuid>,
    pub event: ActivityEvent,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_as_tagged_payload() {
        let event = ActivityEvent::RevisionRejected { reason: "needs sources".to_string() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "revision_rejected");
        assert_eq!(json["details"]["reason"], "needs sources");

        let back: ActivityEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.activity_type(), "revision_rejected");
        assert_eq!(back.severity(), Severity::Warning);
    }

    #[test]
    fn unit_variants_round_trip() {
        let json = serde_json::to_string(&ActivityEvent::UserLogin).unwrap();
        let back: ActivityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ActivityEvent::UserLogin);
    }
}
