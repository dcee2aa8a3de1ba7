use crate::models::PostStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Never,
    Success,
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Never => "never",
            FetchStatus::Success => "success",
            FetchStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<FetchStatus> {
        match value {
            "never" => Some(FetchStatus::Never),
            "success" => Some(FetchStatus::Success),
            "error" => Some(FetchStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    pub id: i64,
    pub url: String,
    pub brand_name: String,
    pub is_active: bool,
    pub fetch_interval_minutes: u32,
    pub default_status: PostStatus,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_fetch_status: FetchStatus,
    pub last_error_message: Option<String>,
    pub last_item_count: u32,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedConfig {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_fetched_at {
            None => true,
            Some(last) => last + chrono::Duration::minutes(self.fetch_interval_minutes as i64) <= now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfigInput {
    pub url: String,
    pub brand_name: String,
    pub is_active: Option<bool>,
    pub fetch_interval_minutes: Option<u32>,
    pub default_status: Option<PostStatus>,
}

/// One normalised entry of an RSS or Atom document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: Option<String>,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub guid: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFeed {
    pub title: String,
    pub items: Vec<FeedItem>,
}

/// Where an ingestion run writes and how it treats duplicates.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub feed_id: Option<i64>,
    pub brand_name: String,
    pub status: PostStatus,
    pub force: bool,
    pub default_category: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub found: usize,
    pub saved: usize,
    pub skipped: usize,
    pub errors: usize,
    pub error_details: Vec<ItemError>,
    pub saved_post_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRun {
    pub id: i64,
    pub feed_id: Option<i64>,
    pub feed_url: String,
    pub status: FetchStatus,
    pub items_found: u32,
    pub saved: u32,
    pub errors: u32,
    pub error_message: Option<String>,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
}
