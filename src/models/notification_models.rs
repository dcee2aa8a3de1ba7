use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    All,
    Feed,
    Category,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::All => "all",
            SubscriptionType::Feed => "feed",
            SubscriptionType::Category => "category",
        }
    }

    pub fn parse(value: &str) -> Option<SubscriptionType> {
        match value {
            "all" => Some(SubscriptionType::All),
            "feed" => Some(SubscriptionType::Feed),
            "category" => Some(SubscriptionType::Category),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channels {
    pub in_app: bool,
    pub web_push: bool,
    pub email: bool,
}

impl Default for Channels {
    fn default() -> Self {
        Channels { in_app: true, web_push: false, email: false }
    }
}

impl Channels {
    pub fn merge(self, other: Channels) -> Channels {
        Channels {
            in_app: self.in_app || other.in_app,
            web_push: self.web_push || other.web_push,
            email: self.email || other.email,
        }
    }

    pub fn any(&self) -> bool {
        self.in_app || self.web_push || self.email
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub subscription_type: SubscriptionType,
    pub feed_id: Option<i64>,
    pub category_id: Option<i64>,
    pub channels: Channels,
    pub max_per_hour: u32,
    pub max_per_day: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInput {
    pub subscription_type: SubscriptionType,
    pub feed_id: Option<i64>,
    pub category_id: Option<i64>,
    pub channels: Option<Channels>,
    pub max_per_hour: Option<u32>,
    pub max_per_day: Option<u32>,
    pub is_active: Option<bool>,
}

/// A user resolved as interested in an event, after merging all their matching subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub channels: Channels,
    pub max_per_hour: u32,
    pub max_per_day: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub post_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: i64,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub post_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub recipients: usize,
    pub in_app: usize,
    pub push_sent: usize,
    pub push_pruned: usize,
    pub email_skipped: usize,
    pub throttled: usize,
    pub failures: usize,
}

impl FanOutReport {
    pub fn absorb(&mut self, other: FanOutReport) {
        self.recipients += other.recipients;
        self.in_app += other.in_app;
        self.push_sent += other.push_sent;
        self.push_pruned += other.push_pruned;
        self.email_skipped += other.email_skipped;
        self.throttled += other.throttled;
        self.failures += other.failures;
    }
}
