use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::Superadmin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub crud_access: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }

    /// Superadmins always act directly; admins only when granted CRUD access.
    pub fn has_crud_access(&self) -> bool {
        self.is_superadmin() || self.crud_access
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    PendingApproval,
    Scheduled,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::PendingApproval => "pending_approval",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<PostStatus> {
        match value {
            "draft" => Some(PostStatus::Draft),
            "pending_approval" => Some(PostStatus::PendingApproval),
            "scheduled" => Some(PostStatus::Scheduled),
            "published" => Some(PostStatus::Published),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostSource {
    Manual,
    Rss {
        #[serde(rename = "feedId")]
        feed_id: Option<i64>,
        guid: String,
        link: Option<String>,
    },
}

impl PostSource {
    pub fn feed_id(&self) -> Option<i64> {
        match self {
            PostSource::Rss { feed_id, .. } => *feed_id,
            PostSource::Manual => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub short_title: Option<String>,
    pub body: String,
    pub category_id: i64,
    pub tags: Vec<String>,
    pub author: String,
    pub author_id: Option<i64>,
    pub publish_date_time: Option<DateTime<Utc>>,
    pub status: PostStatus,
    pub is_scheduled: bool,
    pub schedule_approved: bool,
    pub schedule_approved_by: Option<String>,
    pub schedule_approved_at: Option<DateTime<Utc>>,
    pub last_approved_by: Option<String>,
    pub last_approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub image_url: Option<String>,
    pub source: PostSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn rss_guid(&self) -> Option<&str> {
        match &self.source {
            PostSource::Rss { guid, .. } => Some(guid.as_str()),
            PostSource::Manual => None,
        }
    }

    pub fn rss_link(&self) -> Option<&str> {
        match &self.source {
            PostSource::Rss { link, .. } => link.as_deref(),
            PostSource::Manual => None,
        }
    }

    /// The editable part of a post, as captured in a revision.
    pub fn draft(&self) -> PostDraft {
        PostDraft {
            title: self.title.clone(),
            short_title: self.short_title.clone(),
            body: self.body.clone(),
            category_id: self.category_id,
            tags: self.tags.clone(),
            publish_date_time: self.publish_date_time,
            image_url: self.image_url.clone(),
        }
    }

    pub fn apply_draft(&mut self, draft: &PostDraft) {
        self.title = draft.title.clone();
        self.short_title = draft.short_title.clone();
        self.body = draft.body.clone();
        self.category_id = draft.category_id;
        self.tags = draft.tags.clone();
        self.publish_date_time = draft.publish_date_time;
        self.image_url = draft.image_url.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub title: String,
    pub short_title: Option<String>,
    pub body: String,
    pub category_id: i64,
    pub tags: Vec<String>,
    pub publish_date_time: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

impl PostDraft {
    /// Names of the fields that differ between two drafts, for audit entries.
    pub fn changed_fields(&self, other: &PostDraft) -> Vec<String> {
        let mut fields = Vec::new();
        if self.title != other.title {
            fields.push("title".to_string());
        }
        if self.short_title != other.short_title {
            fields.push("shortTitle".to_string());
        }
        if self.body != other.body {
            fields.push("body".to_string());
        }
        if self.category_id != other.category_id {
            fields.push("categoryId".to_string());
        }
        if self.tags != other.tags {
            fields.push("tags".to_string());
        }
        if self.publish_date_time != other.publish_date_time {
            fields.push("publishDateTime".to_string());
        }
        if self.image_url != other.image_url {
            fields.push("imageUrl".to_string());
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    PendingReview,
    Approved,
    Rejected,
    ChangesRequested,
    ScheduledPending,
    ScheduledApproved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingReview => "pending_review",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::ChangesRequested => "changes_requested",
            ApprovalStatus::ScheduledPending => "scheduled_pending",
            ApprovalStatus::ScheduledApproved => "scheduled_approved",
        }
    }

    pub fn parse(value: &str) -> Option<ApprovalStatus> {
        match value {
            "pending_review" => Some(ApprovalStatus::PendingReview),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            "changes_requested" => Some(ApprovalStatus::ChangesRequested),
            "scheduled_pending" => Some(ApprovalStatus::ScheduledPending),
            "scheduled_approved" => Some(ApprovalStatus::ScheduledApproved),
            _ => None,
        }
    }

    /// Still waiting on a superadmin decision.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, ApprovalStatus::PendingReview | ApprovalStatus::ScheduledPending)
    }
}

/// A staged change to a post awaiting a superadmin decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: Uuid,
    pub post_id: Uuid,
    pub submitted_by: i64,
    pub submitted_by_name: String,
    pub approval_status: ApprovalStatus,
    pub is_update_request: bool,
    pub proposed: PostDraft,
    pub original: Option<PostDraft>,
    pub version: u32,
    pub review_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryOption {
    pub id: i64,
    pub name: String,
}

// Used for type-safe permission checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Edit,
    Delete,
    Archive,
    Publish,
    Submit,
    CancelSchedule,
}

impl PostAction {
    pub fn verb(&self) -> &'static str {
        match self {
            PostAction::Edit => "edit",
            PostAction::Delete => "delete",
            PostAction::Archive => "archive",
            PostAction::Publish => "publish",
            PostAction::Submit => "submit",
            PostAction::CancelSchedule => "cancel the schedule of",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        PageRequest {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(20).clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Saturates instead of overflowing for absurd page numbers.
    pub fn offset(&self) -> u32 {
        let offset = u64::from(self.page.saturating_sub(1)) * u64::from(self.limit);
        u32::try_from(offset).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let total_pages = (total + request.limit as u64 - 1) / request.limit as u64;
        Page {
            items,
            pagination: Pagination {
                total,
                total_pages,
                current_page: request.page,
                limit: request.limit,
            },
        }
    }

    /// Paginates an already-filtered, already-sorted list in memory.
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.limit as usize)
            .collect();
        Page::new(items, total, request)
    }
}

pub mod activity_models;
pub mod db_operations;
pub mod notification_models;
pub mod rss_models;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_inputs() {
        let req = PageRequest::new(Some(0), Some(1000));
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, PageRequest::MAX_LIMIT);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(Some(3), Some(10));
        assert_eq!(req.offset(), 20);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let req = PageRequest::new(Some(u32::MAX), Some(100));
        assert_eq!(req.offset(), u32::MAX);

        let page = Page::from_vec(vec![1, 2, 3], req);
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total, 3);
    }

    #[test]
    fn page_from_vec_reports_totals() {
        let page = Page::from_vec((1..=25).collect::<Vec<u32>>(), PageRequest::new(Some(3), Some(10)));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.pagination.total, 25);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.current_page, 3);
    }

    #[test]
    fn outstanding_statuses() {
        assert!(ApprovalStatus::PendingReview.is_outstanding());
        assert!(ApprovalStatus::ScheduledPending.is_outstanding());
        assert!(!ApprovalStatus::ChangesRequested.is_outstanding());
        assert!(!ApprovalStatus::Approved.is_outstanding());
    }
}
