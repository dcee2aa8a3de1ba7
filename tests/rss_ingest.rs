mod common;

use chrono::Utc;
use common::{Harness, RecordingGateway};
use newsdesk_backend::error::ApiError;
use newsdesk_backend::helper::rss_helpers::{self, RssContext};
use newsdesk_backend::models::activity_models::Actor;
use newsdesk_backend::models::db_operations::notifications_db_operations::{self, SubscriptionRecord};
use newsdesk_backend::models::db_operations::{categories_db_operations, posts_db_operations, rss_db_operations};
use newsdesk_backend::models::notification_models::{Channels, SubscriptionType};
use newsdesk_backend::models::rss_models::{FeedConfigInput, FetchStatus, IngestOptions};
use newsdesk_backend::models::{PageRequest, PostSource, PostStatus, Role};

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Market Wire</title>
    <link>https://wire.example.com</link>
    <description>Markets</description>
    <item>
      <title>Oil rallies</title>
      <link>https://wire.example.com/oil</link>
      <guid>wire-oil</guid>
      <category>Energy</category>
      <description>Crude jumps on supply news.</description>
    </item>
    <item>
      <title>Gold steady</title>
      <link>https://wire.example.com/gold</link>
      <description>Bullion flat.</description>
    </item>
  </channel>
</rss>"#;

fn options(feed_id: Option<i64>, status: PostStatus, force: bool) -> IngestOptions {
    IngestOptions {
        feed_id,
        brand_name: "Market Wire".to_string(),
        status,
        force,
        default_category: "General".to_string(),
    }
}

#[test]
fn ingestion_saves_items_and_reports_duplicates() {
    let h = Harness::new();
    let conn = h.pool.get().unwrap();
    let now = Utc::now();
    let items = rss_helpers::parse_feed(FEED.as_bytes(), now).unwrap().items;

    let report = rss_helpers::ingest_items(&h.db, &conn, &items, &options(None, PostStatus::Published, false), 50, now);
    assert_eq!(report.found, 2);
    assert_eq!(report.saved, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(report.saved_post_ids.len(), 2);

    let post = posts_db_operations::read_post(&h.db, &report.saved_post_ids[0]).unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Published);
    assert_eq!(post.author, "Market Wire");
    assert_eq!(post.author_id, None);
    assert_eq!(post.last_approved_by.as_deref(), Some(Actor::SYSTEM_NAME));
    assert!(matches!(post.source, PostSource::Rss { .. }));
    assert_eq!(post.rss_guid(), Some("wire-oil"));

    // The first item's category is created; items without one land in the default.
    assert!(categories_db_operations::read_category_by_name(&conn, "energy").unwrap().is_some());
    assert!(categories_db_operations::read_category_by_name(&conn, "General").unwrap().is_some());

    let again = rss_helpers::ingest_items(&h.db, &conn, &items, &options(None, PostStatus::Published, false), 50, now);
    assert_eq!(again.saved, 0);
    assert_eq!(again.errors, 2);
    assert!(again.error_details.iter().all(|e| e.reason == "already exists"));

    let forced = rss_helpers::ingest_items(&h.db, &conn, &items, &options(None, PostStatus::Draft, true), 50, now);
    assert_eq!(forced.saved, 2);
    // Drafts are saved but never announced.
    assert!(forced.saved_post_ids.is_empty());
}

#[test]
fn ingestion_caps_items_per_fetch() {
    let h = Harness::new();
    let conn = h.pool.get().unwrap();
    let now = Utc::now();
    let items = rss_helpers::parse_feed(FEED.as_bytes(), now).unwrap().items;

    let report = rss_helpers::ingest_items(&h.db, &conn, &items, &options(None, PostStatus::Published, false), 1, now);
    assert_eq!(report.found, 2);
    assert_eq!(report.saved, 1);
    assert_eq!(report.skipped, 1);
}

#[actix_web::test]
async fn saved_posts_notify_feed_subscribers() {
    let h = Harness::new();
    let reader = h.user("reader", Role::Admin, false);
    let feed = {
        let conn = h.pool.get().unwrap();
        let feed = rss_db_operations::create_feed(&conn, "https://wire.example.com/rss", "Market Wire", true, 30, PostStatus::Published, None)
            .unwrap();
        let record = SubscriptionRecord {
            subscription_type: SubscriptionType::Feed,
            feed_id: Some(feed.id),
            category_id: None,
            channels: Channels::default(),
            max_per_hour: 10,
            max_per_day: 50,
            is_active: true,
        };
        notifications_db_operations::create_subscription(&conn, reader.id, &record).unwrap();
        feed
    };

    let now = Utc::now();
    let report = {
        let conn = h.pool.get().unwrap();
        let items = rss_helpers::parse_feed(FEED.as_bytes(), now).unwrap().items;
        rss_helpers::ingest_items(&h.db, &conn, &items, &options(Some(feed.id), PostStatus::Published, false), 50, now)
    };

    let gateway = RecordingGateway::default();
    let fan_out = rss_helpers::notify_saved(&h.db, &h.pool, &gateway, &report.saved_post_ids).await;
    assert_eq!(fan_out.in_app, 2);

    let conn = h.pool.get().unwrap();
    assert_eq!(notifications_db_operations::count_notifications(&conn, reader.id, true).unwrap(), 2);
}

#[actix_web::test]
async fn unreachable_feed_records_the_failure() {
    let h = Harness::new();
    let feed = {
        let conn = h.pool.get().unwrap();
        rss_db_operations::create_feed(&conn, "http://127.0.0.1:9/rss", "Nowhere", true, 30, PostStatus::Published, None).unwrap()
    };
    let gateway = RecordingGateway::default();
    let client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(5)).build().unwrap();
    let ctx = RssContext { db: &h.db, pool: &h.pool, config: &h.config, client: &client, gateway: &gateway };

    let err = rss_helpers::run_feed(&ctx, &feed, Actor::system(), false).await.unwrap_err();
    assert!(matches!(err, ApiError::External(_)));

    let conn = h.pool.get().unwrap();
    let stored = rss_helpers::load_feed(&conn, feed.id).unwrap();
    assert_eq!(stored.last_fetch_status, FetchStatus::Error);
    assert!(stored.last_fetched_at.is_some());
    assert!(stored.last_error_message.is_some());

    let history = rss_helpers::fetch_history(&conn, Some(feed.id), PageRequest::new(None, None)).unwrap();
    assert_eq!(history.items.len(), 1);
    assert_eq!(history.items[0].status, FetchStatus::Error);
    assert_eq!(history.items[0].triggered_by, "system");
}

#[test]
fn feed_configs_are_superadmin_only_and_unique() {
    let h = Harness::new();
    let chief = h.superadmin();
    let editor = h.user("editor", Role::Admin, true);
    let conn = h.pool.get().unwrap();
    let input = FeedConfigInput {
        url: "https://wire.example.com/rss".to_string(),
        brand_name: "Market Wire".to_string(),
        is_active: None,
        fetch_interval_minutes: Some(15),
        default_status: None,
    };

    let err = rss_helpers::create_feed_config(&conn, &h.config, &editor, &input).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let feed = rss_helpers::create_feed_config(&conn, &h.config, &chief, &input).unwrap();
    assert!(feed.is_active);
    assert_eq!(feed.fetch_interval_minutes, 15);
    assert_eq!(feed.default_status, PostStatus::Published);
    assert_eq!(feed.last_fetch_status, FetchStatus::Never);

    let err = rss_helpers::create_feed_config(&conn, &h.config, &chief, &input).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let too_fast = FeedConfigInput { fetch_interval_minutes: Some(1), ..input };
    let err = rss_helpers::update_feed_config(&conn, &h.config, &chief, feed.id, &too_fast).unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    rss_helpers::delete_feed_config(&conn, &h.config, &chief, feed.id).unwrap();
    assert!(matches!(rss_helpers::load_feed(&conn, feed.id), Err(ApiError::NotFound(_))));
}
