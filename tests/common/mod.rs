#![allow(dead_code)]

use actix_web::web;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_backend::config::Config;
use newsdesk_backend::helper::notification_helpers::{PushError, PushGateway};
use newsdesk_backend::helper::post_helpers::PostInput;
use newsdesk_backend::models::db_operations::{categories_db_operations, users_db_operations};
use newsdesk_backend::models::notification_models::{PushPayload, PushSubscription};
use newsdesk_backend::models::{Role, User};
use newsdesk_backend::setup::db_setup::{open_newsroom_db, setup_content_db};
use newsdesk_backend::{build_pool, AppState, DbPool};
use redb::Database;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "integration-test-secret-with-enough-length-0123456789";
pub const PASSWORD: &str = "correct-horse-battery";

/// Fresh content store and newsroom database under a temp directory.
pub struct Harness {
    _dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub pool: DbPool,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::with_defaults(dir.path().to_string_lossy().to_string(), TEST_SECRET);
        open_newsroom_db(&config.newsroom_db_path()).expect("newsroom schema");
        let db = setup_content_db(&config.content_db_path()).expect("content store");
        let pool = build_pool(&config.newsroom_db_path()).expect("pool");
        Harness { _dir: dir, config, db, pool }
    }

    pub fn user(&self, username: &str, role: Role, crud_access: bool) -> User {
        let conn = self.pool.get().unwrap();
        let id = users_db_operations::create_user(&conn, username, PASSWORD, role, crud_access).unwrap();
        users_db_operations::read_user_by_id(&conn, id).unwrap().unwrap()
    }

    pub fn superadmin(&self) -> User {
        self.user("chief", Role::Superadmin, true)
    }

    pub fn category(&self, name: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        categories_db_operations::create_category(&conn, name, None, None).unwrap().id
    }

    /// Hands the stores over as shared app data for an in-process service.
    pub fn into_app_data(self) -> AppData {
        AppData {
            _dir: self._dir,
            config: web::Data::new(self.config),
            db: web::Data::new(self.db),
            pool: web::Data::new(self.pool),
            state: web::Data::new(AppState::new(Arc::new(RecordingGateway::default()), Duration::from_secs(5))),
        }
    }
}

pub struct AppData {
    _dir: TempDir,
    pub config: web::Data<Config>,
    pub db: web::Data<Database>,
    pub pool: web::Data<DbPool>,
    pub state: web::Data<AppState>,
}

pub fn post_input(title: &str, category_id: i64, publish_at: Option<DateTime<Utc>>) -> PostInput {
    PostInput {
        title: title.to_string(),
        short_title: None,
        body: format!("Body of {}", title),
        category_id,
        tags: vec!["markets".to_string()],
        publish_date_time: publish_at,
        image_url: None,
    }
}

/// Records every push instead of contacting a push service.
/// Endpoints listed in `gone` answer as expired.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(String, PushPayload)>>,
    pub gone: Vec<String>,
}

impl RecordingGateway {
    pub fn with_gone(endpoints: &[&str]) -> Self {
        RecordingGateway { sent: Mutex::new(Vec::new()), gone: endpoints.iter().map(|e| e.to_string()).collect() }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait(?Send)]
impl PushGateway for RecordingGateway {
    fn public_key(&self) -> Option<String> {
        Some("test-public-key".to_string())
    }

    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> Result<(), PushError> {
        if self.gone.contains(&subscription.endpoint) {
            return Err(PushError::Gone);
        }
        self.sent.lock().unwrap().push((subscription.endpoint.clone(), payload.clone()));
        Ok(())
    }
}
