use clap::{Parser, Subcommand};
use newsdesk_backend::config::Config;
use newsdesk_backend::helper::user_helpers::{validate_password, validate_username};
use newsdesk_backend::models::db_operations::users_db_operations;
use newsdesk_backend::models::Role;
use newsdesk_backend::setup::db_setup;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "Bootstraps the newsdesk stores and superadmin accounts.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Superadmin {
        #[command(subcommand)]
        action: SuperadminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates `newsroom`, `content`, or both when omitted.
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum SuperadminAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("newsroom") => setup_newsroom_database(&config),
                Some("content") => setup_content_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'newsroom' or 'content'.", other),
                None => {
                    setup_newsroom_database(&config);
                    setup_content_database(&config);
                }
            },
        },
        Commands::Superadmin { action } => match action {
            SuperadminAction::Create { username, password } => create_superadmin(&config, username, password),
            SuperadminAction::List => list_superadmins(&config),
            SuperadminAction::ChangePassword { username, new_password } => {
                change_superadmin_password(&config, username, new_password)
            }
        },
    }
}

fn setup_newsroom_database(config: &Config) {
    let db_path = config.newsroom_db_path();
    println!("\nSetting up newsroom database at '{}'...", db_path.display());
    match db_setup::open_newsroom_db(&db_path) {
        Ok(_) => println!("✅ Newsroom database is ready."),
        Err(e) => eprintln!("❌ Error setting up newsroom database: {}", e),
    }
}

fn setup_content_database(config: &Config) {
    let db_path = config.content_db_path();
    if db_path.exists() {
        println!("ℹ️ Content database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up content database at '{}'...", db_path.display());
    match db_setup::setup_content_db(&db_path) {
        Ok(_) => println!("✅ Content database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up content database: {}", e),
    }
}

fn open_newsroom(config: &Config) -> Option<Connection> {
    let db_path = config.newsroom_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Newsroom database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error opening newsroom database: {}", e);
            None
        }
    }
}

fn create_superadmin(config: &Config, username: &str, password: &str) {
    let username = match validate_username(username).and_then(|u| validate_password(password).map(|_| u)) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            return;
        }
    };
    let Some(conn) = open_newsroom(config) else { return };
    match users_db_operations::create_user(&conn, &username, password, Role::Superadmin, true) {
        Ok(_) => println!("✅ Superadmin '{}' created successfully.", username),
        Err(e) => eprintln!("❌ Error creating superadmin: {}. It might be because the username already exists.", e),
    }
}

fn list_superadmins(config: &Config) {
    let Some(conn) = open_newsroom(config) else { return };
    match users_db_operations::read_all_users(&conn, Some(Role::Superadmin)) {
        Ok(users) => {
            println!("Listing Superadmins:");
            for user in users {
                let state = if user.is_active { "active" } else { "inactive" };
                println!("- {} ({})", user.username, state);
            }
        }
        Err(e) => eprintln!("❌ Error fetching superadmins: {}", e),
    }
}

fn change_superadmin_password(config: &Config, username: &str, new_password: &str) {
    if let Err(e) = validate_password(new_password) {
        eprintln!("❌ Error: {}", e);
        return;
    }
    let Some(conn) = open_newsroom(config) else { return };
    match users_db_operations::read_user_by_username(&conn, username) {
        Ok(Some(user)) if user.role == Role::Superadmin => {}
        Ok(_) => {
            eprintln!("❌ Error: No superadmin named '{}'.", username);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error looking up '{}': {}", username, e);
            return;
        }
    }
    match users_db_operations::change_password(&conn, username, new_password) {
        Ok(_) => println!("✅ Password for '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error changing password: {}", e),
    }
}
