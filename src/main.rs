use actix_cors::Cors;
use actix_web::{
    http::header,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use clap::Parser;
use newsdesk_backend::{
    build_pool,
    config::Config,
    error::set_expose_details,
    helper::notification_helpers::{DisabledPushGateway, PushGateway, WebPushGateway},
    routes, tasks, AppState,
};
use redb::Database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "newsdesk_server", author, version, about = "Starts the newsdesk API server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn push_gateway(config: &Config) -> Arc<dyn PushGateway> {
    match &config.vapid {
        Some(vapid) => match WebPushGateway::new(vapid.clone()) {
            Ok(gateway) => {
                log::info!("Web push enabled");
                Arc::new(gateway)
            }
            Err(e) => {
                log::error!("Web push client could not be created, push disabled: {}", e);
                Arc::new(DisabledPushGateway)
            }
        },
        None => {
            log::info!("VAPID keys not configured, web push disabled");
            Arc::new(DisabledPushGateway)
        }
    }
}

fn cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));
    set_expose_details(config.expose_error_details);

    let db = web::Data::new(Database::open(config.content_db_path()).expect(
        "FATAL: content store not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
    ));
    let pool = web::Data::new(build_pool(&config.newsroom_db_path()).expect("FATAL: Failed to create SQLite connection pool."));

    let state = web::Data::new(AppState::new(
        push_gateway(&config),
        Duration::from_secs(config.rss.fetch_timeout_seconds),
    ));
    let config = web::Data::new(config);

    tasks::spawn_scheduler(db.clone(), pool.clone(), config.clone(), state.clone());
    tasks::spawn_rss_heartbeat(db.clone(), pool.clone(), config.clone(), state.clone());

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            .app_data(config.clone())
            .app_data(db.clone())
            .app_data(pool.clone())
            .app_data(state.clone())
            .configure(routes::config_api)
    })
    .bind(server_address)?
    .run()
    .await
}
