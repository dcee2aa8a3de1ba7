use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::helper::notification_helpers::PushGateway;
use crate::tasks::SingleFlight;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Builds the SQLite pool. Every connection enforces foreign keys and waits on locks.
pub fn build_pool(path: &Path) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    Pool::builder().build(manager)
}

/// Process-wide state shared by handlers and background tasks.
pub struct AppState {
    pub scheduler_guard: SingleFlight,
    pub rss_guard: SingleFlight,
    pub push_gateway: Arc<dyn PushGateway>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(push_gateway: Arc<dyn PushGateway>, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        AppState {
            scheduler_guard: SingleFlight::new("scheduler"),
            rss_guard: SingleFlight::new("rss-heartbeat"),
            push_gateway,
            http_client,
        }
    }
}

pub mod config;
pub mod error;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
pub mod tasks;
