use crate::config::{Config, VapidConfig};
use crate::error::ApiError;
use crate::helper::sanitization_helpers::excerpt;
use crate::models::db_operations::notifications_db_operations::{self, SubscriptionRecord};
use crate::models::db_operations::{categories_db_operations, rss_db_operations};
use crate::models::notification_models::{
    Channels, FanOutReport, PushPayload, PushSubscription, Recipient, Subscription, SubscriptionInput, SubscriptionType,
};
use crate::models::{Post, User};
use crate::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use std::collections::BTreeMap;
use thiserror::Error;
use web_push::{ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushClient, WebPushError, WebPushMessageBuilder};

const EXCERPT_CHARS: usize = 160;
const PUSH_TTL_SECONDS: u32 = 60 * 60 * 12;

#[derive(Error, Debug)]
pub enum PushError {
    /// The push service no longer knows this endpoint.
    #[error("push endpoint is gone")]
    Gone,
    #[error("web push is not configured")]
    Disabled,
    #[error("push delivery failed: {0}")]
    Failed(String),
}

/// Delivers one payload to one browser endpoint.
#[async_trait(?Send)]
pub trait PushGateway: Send + Sync {
    fn public_key(&self) -> Option<String>;
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<(), PushError>;
}

/// Used when no VAPID keys are configured.
pub struct DisabledPushGateway;

#[async_trait(?Send)]
impl PushGateway for DisabledPushGateway {
    fn public_key(&self) -> Option<String> {
        None
    }

    async fn send(&self, _subscription: &PushSubscription, _payload: &PushPayload) -> Result<(), PushError> {
        Err(PushError::Disabled)
    }
}

pub struct WebPushGateway {
    vapid: VapidConfig,
    client: WebPushClient,
}

impl WebPushGateway {
    pub fn new(vapid: VapidConfig) -> Result<Self, WebPushError> {
        Ok(WebPushGateway { vapid, client: WebPushClient::new()? })
    }
}

#[async_trait(?Send)]
impl PushGateway for WebPushGateway {
    fn public_key(&self) -> Option<String> {
        Some(self.vapid.public_key.clone())
    }

    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<(), PushError> {
        let info = SubscriptionInfo::new(&subscription.endpoint, &subscription.p256dh, &subscription.auth);
        let content = serde_json::to_vec(payload).map_err(|e| PushError::Failed(e.to_string()))?;

        let mut signature = VapidSignatureBuilder::from_base64(&self.vapid.private_key, web_push::URL_SAFE_NO_PAD, &info)
            .map_err(|e| PushError::Failed(e.to_string()))?;
        signature.add_claim("sub", self.vapid.subject.as_str());
        let signature = signature.build().map_err(|e| PushError::Failed(e.to_string()))?;

        let mut builder = WebPushMessageBuilder::new(&info).map_err(|e| PushError::Failed(e.to_string()))?;
        builder.set_payload(ContentEncoding::Aes128Gcm, &content);
        builder.set_ttl(PUSH_TTL_SECONDS);
        builder.set_vapid_signature(signature);
        let message = builder.build().map_err(|e| PushError::Failed(e.to_string()))?;

        match self.client.send(message).await {
            Ok(()) => Ok(()),
            Err(WebPushError::EndpointNotFound) | Err(WebPushError::EndpointNotValid) => Err(PushError::Gone),
            Err(e) => Err(PushError::Failed(e.to_string())),
        }
    }
}

// ====================================================================
// ======================== RECIPIENT RESOLUTION ======================
// ====================================================================

/// One recipient per user: channels are OR-ed, the strictest limits win.
pub fn merge_recipients(subscriptions: &[Subscription]) -> Vec<Recipient> {
    let mut by_user: BTreeMap<i64, Recipient> = BTreeMap::new();
    for sub in subscriptions.iter().filter(|s| s.is_active && s.channels.any()) {
        by_user
            .entry(sub.user_id)
            .and_modify(|r| {
                r.channels = r.channels.merge(sub.channels);
                r.max_per_hour = r.max_per_hour.min(sub.max_per_hour);
                r.max_per_day = r.max_per_day.min(sub.max_per_day);
            })
            .or_insert(Recipient {
                user_id: sub.user_id,
                channels: sub.channels,
                max_per_hour: sub.max_per_hour,
                max_per_day: sub.max_per_day,
            });
    }
    by_user.into_values().collect()
}

pub fn within_limits(last_hour: u32, last_day: u32, recipient: &Recipient) -> bool {
    last_hour < recipient.max_per_hour && last_day < recipient.max_per_day
}

fn is_throttled(conn: &Connection, recipient: &Recipient, now: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
    let last_hour = notifications_db_operations::count_deliveries_since(conn, recipient.user_id, now - Duration::hours(1))?;
    let last_day = notifications_db_operations::count_deliveries_since(conn, recipient.user_id, now - Duration::days(1))?;
    Ok(!within_limits(last_hour, last_day, recipient))
}

pub fn payload_for(post: &Post) -> PushPayload {
    let body = post
        .short_title
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| excerpt(&post.body, EXCERPT_CHARS));
    PushPayload {
        title: post.title.clone(),
        body,
        url: Some(format!("/posts/{}", post.id)),
        post_id: Some(post.id),
    }
}

/// Pushes to every endpoint of a user, pruning the ones reported gone.
async fn push_to_user(
    conn: &Connection,
    gateway: &dyn PushGateway,
    user_id: i64,
    payload: &PushPayload,
    report: &mut FanOutReport,
) -> Result<bool, rusqlite::Error> {
    let endpoints = notifications_db_operations::push_subscriptions_for_user(conn, user_id)?;
    let mut delivered = false;
    for endpoint in &endpoints {
        match gateway.send(endpoint, payload).await {
            Ok(()) => {
                report.push_sent += 1;
                delivered = true;
                if let Err(e) = notifications_db_operations::touch_push_subscription(conn, endpoint.id) {
                    log::warn!("Failed to stamp push endpoint {}: {}", endpoint.id, e);
                }
            }
            Err(PushError::Gone) => {
                report.push_pruned += 1;
                log::info!("Pruning expired push endpoint {} of user {}", endpoint.id, user_id);
                notifications_db_operations::prune_push_endpoint(conn, &endpoint.endpoint)?;
            }
            Err(PushError::Disabled) => {
                log::debug!("Web push disabled; skipping user {}", user_id);
                break;
            }
            Err(e) => {
                report.failures += 1;
                log::warn!("Push to endpoint {} of user {} failed: {}", endpoint.id, user_id, e);
            }
        }
    }
    Ok(delivered)
}

async fn deliver(
    conn: &Connection,
    gateway: &dyn PushGateway,
    recipient: &Recipient,
    post: &Post,
    payload: &PushPayload,
    now: DateTime<Utc>,
    report: &mut FanOutReport,
) -> Result<(), rusqlite::Error> {
    if is_throttled(conn, recipient, now)? {
        report.throttled += 1;
        log::debug!("Throttled notification for user {}", recipient.user_id);
        return Ok(());
    }

    let mut delivered = false;
    if recipient.channels.in_app {
        notifications_db_operations::insert_notification(
            conn,
            recipient.user_id,
            Some(post.id),
            &payload.title,
            &payload.body,
            payload.url.as_deref(),
        )?;
        report.in_app += 1;
        delivered = true;
    }
    if recipient.channels.web_push {
        delivered |= push_to_user(conn, gateway, recipient.user_id, payload, report).await?;
    }
    if recipient.channels.email {
        report.email_skipped += 1;
    }
    if delivered {
        notifications_db_operations::record_delivery(conn, recipient.user_id, Some(post.id), now)?;
    }
    Ok(())
}

/// Notifies every subscriber interested in a newly published post.
/// Failures are isolated per recipient and logged.
pub async fn fan_out(pool: &DbPool, gateway: &dyn PushGateway, post: &Post, now: DateTime<Utc>) -> FanOutReport {
    let mut report = FanOutReport::default();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Fan-out for post {} could not get a connection: {}", post.id, e);
            report.failures += 1;
            return report;
        }
    };

    let subscriptions = match notifications_db_operations::matching_subscriptions(&conn, post.source.feed_id(), post.category_id) {
        Ok(subs) => subs,
        Err(e) => {
            log::error!("Fan-out for post {} could not resolve subscribers: {}", post.id, e);
            report.failures += 1;
            return report;
        }
    };

    let recipients = merge_recipients(&subscriptions);
    report.recipients = recipients.len();
    let payload = payload_for(post);

    for recipient in &recipients {
        if let Err(e) = deliver(&conn, gateway, recipient, post, &payload, now, &mut report).await {
            report.failures += 1;
            log::error!("Notification for user {} about post {} failed: {}", recipient.user_id, post.id, e);
        }
    }

    log::info!(
        "Fan-out for post {}: {} recipient(s), {} in-app, {} push, {} throttled, {} failure(s)",
        post.id,
        report.recipients,
        report.in_app,
        report.push_sent,
        report.throttled,
        report.failures
    );
    report
}

/// Sends a test payload to the caller's own endpoints.
pub async fn send_test_push(pool: &DbPool, gateway: &dyn PushGateway, user: &User) -> Result<FanOutReport, ApiError> {
    if gateway.public_key().is_none() {
        return Err(ApiError::Validation("Web push is not configured on this server.".to_string()));
    }
    let conn = pool.get()?;
    let payload = PushPayload {
        title: "Test notification".to_string(),
        body: format!("Push notifications are working for {}.", user.username),
        url: None,
        post_id: None,
    };
    let mut report = FanOutReport { recipients: 1, ..FanOutReport::default() };
    push_to_user(&conn, gateway, user.id, &payload, &mut report).await?;
    Ok(report)
}

// ====================================================================
// ====================== SUBSCRIPTION MANAGEMENT =====================
// ====================================================================

/// Checks the typed target exists and fills defaults from config.
pub fn validate_subscription(
    conn: &Connection,
    config: &Config,
    input: &SubscriptionInput,
) -> Result<SubscriptionRecord, ApiError> {
    let (feed_id, category_id) = match input.subscription_type {
        SubscriptionType::All => (None, None),
        SubscriptionType::Feed => {
            let feed_id = input
                .feed_id
                .ok_or_else(|| ApiError::Validation("feedId is required for feed subscriptions.".to_string()))?;
            if rss_db_operations::read_feed(conn, feed_id)?.is_none() {
                return Err(ApiError::Validation(format!("Feed {} does not exist.", feed_id)));
            }
            (Some(feed_id), None)
        }
        SubscriptionType::Category => {
            let category_id = input
                .category_id
                .ok_or_else(|| ApiError::Validation("categoryId is required for category subscriptions.".to_string()))?;
            if categories_db_operations::read_category(conn, category_id)?.is_none() {
                return Err(ApiError::Validation(format!("Category {} does not exist.", category_id)));
            }
            (None, Some(category_id))
        }
    };

    let max_per_hour = input.max_per_hour.unwrap_or(config.notifications.default_max_per_hour);
    let max_per_day = input.max_per_day.unwrap_or(config.notifications.default_max_per_day);
    if max_per_hour == 0 || max_per_day == 0 {
        return Err(ApiError::Validation("Notification limits must be at least 1.".to_string()));
    }

    Ok(SubscriptionRecord {
        subscription_type: input.subscription_type,
        feed_id,
        category_id,
        channels: input.channels.unwrap_or_default(),
        max_per_hour,
        max_per_day,
        is_active: input.is_active.unwrap_or(true),
    })
}

/// Loads a subscription, hiding other users' rows behind a 404.
pub fn load_own_subscription(conn: &Connection, user: &User, id: i64) -> Result<Subscription, ApiError> {
    match notifications_db_operations::read_subscription(conn, id)? {
        Some(sub) if sub.user_id == user.id => Ok(sub),
        _ => Err(ApiError::not_found(format!("Subscription {}", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(user_id: i64, channels: Channels, hour: u32, day: u32) -> Subscription {
        Subscription {
            id: 0,
            user_id,
            subscription_type: SubscriptionType::All,
            feed_id: None,
            category_id: None,
            channels,
            max_per_hour: hour,
            max_per_day: day,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn merges_per_user_with_strictest_limits() {
        let in_app = Channels::default();
        let push = Channels { in_app: false, web_push: true, email: false };
        let merged = merge_recipients(&[sub(1, in_app, 5, 20), sub(1, push, 2, 50), sub(2, in_app, 3, 3)]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].user_id, 1);
        assert_eq!(merged[0].channels, Channels { in_app: true, web_push: true, email: false });
        assert_eq!((merged[0].max_per_hour, merged[0].max_per_day), (2, 20));
        assert_eq!(merged[1].user_id, 2);
    }

    #[test]
    fn subscriptions_without_channels_are_ignored() {
        let none = Channels { in_app: false, web_push: false, email: false };
        assert!(merge_recipients(&[sub(1, none, 5, 5)]).is_empty());
    }

    #[test]
    fn limits_are_exclusive_upper_bounds() {
        let r = Recipient { user_id: 1, channels: Channels::default(), max_per_hour: 2, max_per_day: 10 };
        assert!(within_limits(0, 0, &r));
        assert!(within_limits(1, 9, &r));
        assert!(!within_limits(2, 2, &r));
        assert!(!within_limits(0, 10, &r));
    }

    #[actix_web::test]
    async fn web_push_reports_bad_vapid_keys_as_failures() {
        let vapid = VapidConfig {
            public_key: "BPublicKey".to_string(),
            private_key: "not a key".to_string(),
            subject: "mailto:desk@example.com".to_string(),
        };
        let gateway = WebPushGateway::new(vapid).unwrap();
        assert_eq!(gateway.public_key().as_deref(), Some("BPublicKey"));

        let endpoint = PushSubscription {
            id: 1,
            user_id: 1,
            endpoint: "https://push.example.com/abc".to_string(),
            p256dh: "BAAA".to_string(),
            auth: "AAAA".to_string(),
            user_agent: None,
            created_at: Utc::now(),
            last_used_at: None,
        };
        let payload = PushPayload { title: "t".to_string(), body: "b".to_string(), url: None, post_id: None };
        assert!(matches!(gateway.send(&endpoint, &payload).await, Err(PushError::Failed(_))));
    }
}
