use crate::config::Config;
use crate::error::ApiError;
use crate::helper::activity_helpers;
use crate::helper::notification_helpers::{self, PushGateway};
use crate::helper::sanitization_helpers::{html_to_text, sanitize_markdown_content};
use crate::middleware::require_superadmin;
use crate::models::activity_models::{ActivityEvent, Actor, NewActivity};
use crate::models::db_operations::categories_db_operations;
use crate::models::db_operations::posts_db_operations;
use crate::models::db_operations::rss_db_operations::{self, NewFetchRun};
use crate::models::notification_models::FanOutReport;
use crate::models::rss_models::{
    FeedConfig, FeedConfigInput, FeedItem, FetchRun, FetchStatus, IngestOptions, IngestReport, ItemError, ParsedFeed,
};
use crate::models::{Page, PageRequest, Post, PostSource, PostStatus, User};
use crate::DbPool;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use redb::Database;
use regex::Regex;
use rusqlite::Connection;
use std::sync::OnceLock;
use uuid::Uuid;

const MIN_INTERVAL_MINUTES: u32 = 5;
const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

fn img_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).ok()).as_ref()
}

fn first_image(html: &str) -> Option<String> {
    img_regex()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// GUID, else link, else a fresh id.
fn item_guid(guid: Option<&str>, link: Option<&str>) -> String {
    non_empty(guid)
        .or_else(|| non_empty(link))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn media_url(extensions: &rss::extension::ExtensionMap) -> Option<String> {
    let media = extensions.get("media")?;
    ["content", "thumbnail"].iter().find_map(|name| {
        media
            .get(*name)
            .and_then(|exts| exts.iter().find_map(|ext| ext.attrs().get("url").cloned()))
    })
}

fn rss_item(item: &rss::Item, now: DateTime<Utc>) -> FeedItem {
    let raw_description = item.description().or(item.content()).unwrap_or_default();
    let image_url = item
        .enclosure()
        .filter(|e| e.mime_type().starts_with("image/"))
        .map(|e| e.url().to_string())
        .or_else(|| media_url(item.extensions()))
        .or_else(|| first_image(raw_description))
        .or_else(|| item.content().and_then(first_image));
    FeedItem {
        title: html_to_text(item.title().unwrap_or_default()),
        description: html_to_text(raw_description),
        link: non_empty(item.link()),
        categories: item
            .categories()
            .iter()
            .filter_map(|c| non_empty(Some(c.name())))
            .collect(),
        published_at: item.pub_date().and_then(parse_date).unwrap_or(now),
        image_url,
        guid: item_guid(item.guid().map(|g| g.value()), item.link()),
    }
}

fn atom_entry(entry: &atom_syndication::Entry) -> FeedItem {
    let link = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href().to_string());
    let raw_description = entry
        .summary()
        .map(|s| s.value.clone())
        .or_else(|| entry.content().and_then(|c| c.value()).map(str::to_string))
        .unwrap_or_default();
    let image_url = entry
        .links()
        .iter()
        .find(|l| l.rel() == "enclosure" && l.mime_type().map_or(false, |m| m.starts_with("image/")))
        .map(|l| l.href().to_string())
        .or_else(|| first_image(&raw_description));
    let published = entry.published().copied().unwrap_or_else(|| *entry.updated());
    FeedItem {
        title: html_to_text(&entry.title().value),
        description: html_to_text(&raw_description),
        link: link.clone(),
        categories: entry
            .categories()
            .iter()
            .filter_map(|c| non_empty(c.label().or(Some(c.term()))))
            .collect(),
        published_at: published.with_timezone(&Utc),
        image_url,
        guid: item_guid(Some(entry.id()), link.as_deref()),
    }
}

/// Parses RSS 2.0, falling back to Atom.
pub fn parse_feed(bytes: &[u8], now: DateTime<Utc>) -> Result<ParsedFeed, String> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(ParsedFeed {
            title: channel.title().to_string(),
            items: channel.items().iter().map(|item| rss_item(item, now)).collect(),
        }),
        Err(rss_err) => match atom_syndication::Feed::read_from(bytes) {
            Ok(feed) => Ok(ParsedFeed {
                title: feed.title().value.clone(),
                items: feed.entries().iter().map(atom_entry).collect(),
            }),
            Err(atom_err) => Err(format!("Not a valid RSS ({}) or Atom ({}) document", rss_err, atom_err)),
        },
    }
}

pub fn validate_feed_url(raw: &str) -> Result<String, ApiError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| ApiError::Validation(format!("Invalid feed URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(ApiError::Validation(format!("Unsupported feed URL scheme '{}'.", other))),
    }
}

pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<ParsedFeed, ApiError> {
    let url = validate_feed_url(url)?;
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ApiError::External(format!("Failed to fetch feed {}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::External(format!("Failed to read feed {}: {}", url, e)))?;
    parse_feed(&bytes, Utc::now()).map_err(|e| ApiError::External(format!("Failed to parse feed {}: {}", url, e)))
}

fn build_post(item: &FeedItem, title: String, category_id: i64, options: &IngestOptions, now: DateTime<Utc>) -> Post {
    let published = options.status == PostStatus::Published;
    Post {
        id: Uuid::new_v4(),
        title,
        short_title: None,
        body: sanitize_markdown_content(&item.description),
        category_id,
        tags: item.categories.clone(),
        author: options.brand_name.clone(),
        author_id: None,
        publish_date_time: Some(if published { item.published_at.min(now) } else { item.published_at }),
        status: options.status,
        is_scheduled: false,
        schedule_approved: false,
        schedule_approved_by: None,
        schedule_approved_at: None,
        last_approved_by: published.then(|| Actor::SYSTEM_NAME.to_string()),
        last_approved_at: published.then_some(now),
        rejection_reason: None,
        image_url: item.image_url.clone(),
        source: PostSource::Rss { feed_id: options.feed_id, guid: item.guid.clone(), link: item.link.clone() },
        created_at: now,
        updated_at: now,
    }
}

fn push_error(report: &mut IngestReport, title: &str, reason: String) {
    report.errors += 1;
    report.error_details.push(ItemError { title: title.to_string(), reason });
}

/// Saves feed items as posts, skipping duplicates unless `force` is set.
pub fn ingest_items(
    db: &Database,
    conn: &Connection,
    items: &[FeedItem],
    options: &IngestOptions,
    max_items: usize,
    now: DateTime<Utc>,
) -> IngestReport {
    let mut report = IngestReport { found: items.len(), ..IngestReport::default() };
    report.skipped = items.len().saturating_sub(max_items);

    for item in items.iter().take(max_items) {
        let title = item.title.trim().to_string();
        if title.is_empty() {
            push_error(&mut report, &title, "missing title".to_string());
            continue;
        }

        if !options.force {
            match posts_db_operations::find_duplicate(db, Some(&item.guid), item.link.as_deref(), &title) {
                Ok(None) => {}
                Ok(Some(_)) => {
                    push_error(&mut report, &title, "already exists".to_string());
                    continue;
                }
                Err(e) => {
                    push_error(&mut report, &title, format!("duplicate check failed: {}", e));
                    continue;
                }
            }
        }

        let category_name = item.categories.first().cloned().unwrap_or_else(|| options.default_category.clone());
        let category = match categories_db_operations::resolve_or_create(conn, &category_name, None) {
            Ok(category) => category,
            Err(e) => {
                push_error(&mut report, &title, format!("category '{}' unavailable: {}", category_name, e));
                continue;
            }
        };

        let post = build_post(item, title.clone(), category.id, options, now);
        match posts_db_operations::save_post(db, &post) {
            Ok(()) => {
                report.saved += 1;
                if post.status == PostStatus::Published {
                    report.saved_post_ids.push(post.id);
                }
            }
            Err(e) => push_error(&mut report, &title, format!("save failed: {}", e)),
        }
    }
    report
}

/// Fans out every published post an ingestion run saved.
pub async fn notify_saved(db: &Database, pool: &DbPool, gateway: &dyn PushGateway, post_ids: &[Uuid]) -> FanOutReport {
    let mut total = FanOutReport::default();
    for id in post_ids {
        match posts_db_operations::read_post(db, id) {
            Ok(Some(post)) => total.absorb(notification_helpers::fan_out(pool, gateway, &post, Utc::now()).await),
            Ok(None) => log::warn!("Ingested post {} vanished before fan-out", id),
            Err(e) => {
                total.failures += 1;
                log::error!("Could not load ingested post {} for fan-out: {}", id, e);
            }
        }
    }
    total
}

pub struct RssContext<'a> {
    pub db: &'a Database,
    pub pool: &'a DbPool,
    pub config: &'a Config,
    pub client: &'a reqwest::Client,
    pub gateway: &'a dyn PushGateway,
}

fn record_run(conn: &Connection, run: &NewFetchRun) {
    if let Err(e) = rss_db_operations::insert_fetch_run(conn, run) {
        log::error!("Failed to record fetch run for {}: {}", run.feed_url, e);
    }
}

/// Fetches and ingests one configured feed, updating its status and history.
pub async fn run_feed(ctx: &RssContext<'_>, feed: &FeedConfig, actor: Actor, force: bool) -> Result<IngestReport, ApiError> {
    let triggered_by = actor.name.clone();
    let fetched = fetch_feed(ctx.client, &feed.url).await;
    let now = Utc::now();
    let conn = ctx.pool.get()?;

    let parsed = match fetched {
        Ok(parsed) => parsed,
        Err(e) => {
            let message = e.to_string();
            log::warn!("Feed {} ({}) failed: {}", feed.id, feed.url, message);
            rss_db_operations::record_fetch_error(&conn, feed.id, &message, now)?;
            record_run(
                &conn,
                &NewFetchRun {
                    feed_id: Some(feed.id),
                    feed_url: &feed.url,
                    status: FetchStatus::Error,
                    items_found: 0,
                    saved: 0,
                    errors: 1,
                    error_message: Some(&message),
                    triggered_by: &triggered_by,
                },
            );
            activity_helpers::record(
                &conn,
                ctx.config,
                NewActivity::new(
                    actor,
                    feed.brand_name.clone(),
                    ActivityEvent::RssFetchFailed { feed_id: Some(feed.id), url: feed.url.clone(), error: message },
                ),
            );
            return Err(e);
        }
    };

    let options = IngestOptions {
        feed_id: Some(feed.id),
        brand_name: feed.brand_name.clone(),
        status: feed.default_status,
        force,
        default_category: ctx.config.rss.default_category.clone(),
    };
    let report = ingest_items(ctx.db, &conn, &parsed.items, &options, ctx.config.rss.max_items_per_fetch, now);

    rss_db_operations::record_fetch_success(&conn, feed.id, report.found as u32, now)?;
    record_run(
        &conn,
        &NewFetchRun {
            feed_id: Some(feed.id),
            feed_url: &feed.url,
            status: FetchStatus::Success,
            items_found: report.found as u32,
            saved: report.saved as u32,
            errors: report.errors as u32,
            error_message: None,
            triggered_by: &triggered_by,
        },
    );
    activity_helpers::record(
        &conn,
        ctx.config,
        NewActivity::new(
            actor,
            feed.brand_name.clone(),
            ActivityEvent::RssFetched {
                feed_id: Some(feed.id),
                url: feed.url.clone(),
                saved: report.saved,
                skipped: report.skipped,
                errors: report.errors,
            },
        ),
    );
    drop(conn);

    log::info!(
        "Feed {} ({}): {} found, {} saved, {} error(s)",
        feed.id,
        feed.url,
        report.found,
        report.saved,
        report.errors
    );
    notify_saved(ctx.db, ctx.pool, ctx.gateway, &report.saved_post_ids).await;
    Ok(report)
}

/// One heartbeat: processes the due feeds concurrently. Returns how many ran.
pub async fn run_due_feeds(ctx: &RssContext<'_>) -> Result<usize, ApiError> {
    let due = {
        let conn = ctx.pool.get()?;
        rss_db_operations::due_feeds(&conn, Utc::now(), ctx.config.rss.max_feeds_per_tick)?
    };
    if due.is_empty() {
        return Ok(0);
    }
    let results = join_all(due.iter().map(|feed| run_feed(ctx, feed, Actor::system(), false))).await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    log::info!("RSS heartbeat processed {} feed(s), {} failed", results.len(), failed);
    Ok(results.len())
}

/// Fetches and ingests an arbitrary URL outside the configured feeds.
pub async fn save_from_url(
    ctx: &RssContext<'_>,
    url: &str,
    options: IngestOptions,
    actor: Actor,
) -> Result<IngestReport, ApiError> {
    let parsed = fetch_feed(ctx.client, url).await?;
    let report = {
        let conn = ctx.pool.get()?;
        let report = ingest_items(ctx.db, &conn, &parsed.items, &options, ctx.config.rss.max_items_per_fetch, Utc::now());
        record_run(
            &conn,
            &NewFetchRun {
                feed_id: None,
                feed_url: url,
                status: FetchStatus::Success,
                items_found: report.found as u32,
                saved: report.saved as u32,
                errors: report.errors as u32,
                error_message: None,
                triggered_by: &actor.name,
            },
        );
        activity_helpers::record(
            &conn,
            ctx.config,
            NewActivity::new(
                actor,
                options.brand_name.clone(),
                ActivityEvent::RssFetched {
                    feed_id: None,
                    url: url.to_string(),
                    saved: report.saved,
                    skipped: report.skipped,
                    errors: report.errors,
                },
            ),
        );
        report
    };
    notify_saved(ctx.db, ctx.pool, ctx.gateway, &report.saved_post_ids).await;
    Ok(report)
}

// ====================================================================
// ======================== FEED CONFIGURATION ========================
// ====================================================================

struct FeedSettings {
    url: String,
    brand_name: String,
    is_active: bool,
    interval: u32,
    default_status: PostStatus,
}

fn validate_feed_input(config: &Config, input: &FeedConfigInput) -> Result<FeedSettings, ApiError> {
    let url = validate_feed_url(&input.url)?;
    let brand_name = html_to_text(&input.brand_name);
    if brand_name.is_empty() {
        return Err(ApiError::Validation("brandName is required.".to_string()));
    }
    let interval = input.fetch_interval_minutes.unwrap_or(config.rss.default_interval_minutes);
    if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval) {
        return Err(ApiError::Validation(format!(
            "fetchIntervalMinutes must be between {} and {}.",
            MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES
        )));
    }
    let default_status = input.default_status.unwrap_or(PostStatus::Published);
    if !matches!(default_status, PostStatus::Published | PostStatus::Draft) {
        return Err(ApiError::Validation("defaultStatus must be 'published' or 'draft'.".to_string()));
    }
    Ok(FeedSettings { url, brand_name, is_active: input.is_active.unwrap_or(true), interval, default_status })
}

fn ensure_url_free(conn: &Connection, url: &str, except_id: Option<i64>) -> Result<(), ApiError> {
    match rss_db_operations::read_feed_by_url(conn, url)? {
        Some(existing) if Some(existing.id) != except_id => {
            Err(ApiError::Conflict(format!("A feed for '{}' is already configured.", url)))
        }
        _ => Ok(()),
    }
}

pub fn load_feed(conn: &Connection, id: i64) -> Result<FeedConfig, ApiError> {
    rss_db_operations::read_feed(conn, id)?.ok_or_else(|| ApiError::not_found(format!("Feed configuration {}", id)))
}

pub fn create_feed_config(conn: &Connection, config: &Config, actor: &User, input: &FeedConfigInput) -> Result<FeedConfig, ApiError> {
    require_superadmin(actor)?;
    let settings = validate_feed_input(config, input)?;
    ensure_url_free(conn, &settings.url, None)?;
    let feed = rss_db_operations::create_feed(
        conn,
        &settings.url,
        &settings.brand_name,
        settings.is_active,
        settings.interval,
        settings.default_status,
        Some(actor.id),
    )?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), feed.brand_name.clone(), ActivityEvent::FeedConfigCreated { url: feed.url.clone() }),
    );
    Ok(feed)
}

pub fn update_feed_config(
    conn: &Connection,
    config: &Config,
    actor: &User,
    id: i64,
    input: &FeedConfigInput,
) -> Result<FeedConfig, ApiError> {
    require_superadmin(actor)?;
    load_feed(conn, id)?;
    let settings = validate_feed_input(config, input)?;
    ensure_url_free(conn, &settings.url, Some(id))?;
    rss_db_operations::update_feed(
        conn,
        id,
        &settings.url,
        &settings.brand_name,
        settings.is_active,
        settings.interval,
        settings.default_status,
    )?;
    let feed = load_feed(conn, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), feed.brand_name.clone(), ActivityEvent::FeedConfigUpdated { url: feed.url.clone() }),
    );
    Ok(feed)
}

/// Removes the feed. Its fetch history is kept; feed subscriptions go with it.
pub fn delete_feed_config(conn: &Connection, config: &Config, actor: &User, id: i64) -> Result<(), ApiError> {
    require_superadmin(actor)?;
    let feed = load_feed(conn, id)?;
    rss_db_operations::delete_feed(conn, id)?;
    activity_helpers::record(
        conn,
        config,
        NewActivity::new(actor.into(), feed.brand_name, ActivityEvent::FeedConfigDeleted { url: feed.url }),
    );
    Ok(())
}

pub fn fetch_history(conn: &Connection, feed_id: Option<i64>, page: PageRequest) -> Result<Page<FetchRun>, ApiError> {
    let total = rss_db_operations::count_fetch_runs(conn, feed_id)?;
    let items = rss_db_operations::list_fetch_runs(conn, feed_id, page.limit, page.offset())?;
    Ok(Page::new(items, total, page))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Market Wire</title>
    <link>https://wire.example.com</link>
    <description>Markets</description>
    <item>
      <title>Oil &amp; gas rally</title>
      <link>https://wire.example.com/oil</link>
      <guid>wire-1</guid>
      <category>Energy</category>
      <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate>
      <description>&lt;p&gt;Crude jumps &lt;img src="https://img.example.com/oil.jpg"&gt;&lt;/p&gt;</description>
    </item>
    <item>
      <title>Gold steady</title>
      <link>https://wire.example.com/gold</link>
      <media:content url="https://img.example.com/gold.jpg" medium="image"/>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Rates Desk</title>
  <id>urn:rates</id>
  <updated>2025-06-10T04:00:00Z</updated>
  <entry>
    <title>Yields slip</title>
    <id>urn:rates:1</id>
    <updated>2025-06-10T04:00:00Z</updated>
    <link href="https://rates.example.com/1"/>
    <category term="bonds"/>
    <summary>Ten-year yields fall.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let now = Utc::now();
        let feed = parse_feed(RSS.as_bytes(), now).unwrap();
        assert_eq!(feed.title, "Market Wire");
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title, "Oil & gas rally");
        assert_eq!(first.guid, "wire-1");
        assert_eq!(first.categories, vec!["Energy".to_string()]);
        assert_eq!(first.description, "Crude jumps");
        assert_eq!(first.image_url.as_deref(), Some("https://img.example.com/oil.jpg"));
        assert_eq!(first.published_at.to_rfc3339(), "2025-06-10T04:00:00+00:00");

        let second = &feed.items[1];
        assert_eq!(second.guid, "https://wire.example.com/gold");
        assert_eq!(second.image_url.as_deref(), Some("https://img.example.com/gold.jpg"));
        assert_eq!(second.published_at, now);
    }

    #[test]
    fn falls_back_to_atom() {
        let feed = parse_feed(ATOM.as_bytes(), Utc::now()).unwrap();
        assert_eq!(feed.title, "Rates Desk");
        let item = &feed.items[0];
        assert_eq!(item.title, "Yields slip");
        assert_eq!(item.guid, "urn:rates:1");
        assert_eq!(item.link.as_deref(), Some("https://rates.example.com/1"));
        assert_eq!(item.categories, vec!["bonds".to_string()]);
        assert_eq!(item.description, "Ten-year yields fall.");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_feed(b"not a feed", Utc::now()).is_err());
    }

    #[test]
    fn feed_urls_must_be_http() {
        assert!(validate_feed_url("ftp://example.com/feed").is_err());
        assert!(validate_feed_url("not a url").is_err());
        assert!(validate_feed_url("https://example.com/feed").is_ok());
    }
}
