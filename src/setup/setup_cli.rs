use chrono::Utc;
use clap::{Parser, Subcommand};
use magazine_backend::config::Config;
use magazine_backend::helper::auth_helpers::new_user;
use magazine_backend::helper::sitemap_helpers;
use magazine_backend::models::db_operations::users_db_operations;
use magazine_backend::models::Role;
use magazine_backend::setup::db_setup;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "Setup and maintenance tasks for the magazine.", long_about = None)]
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
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    Sitemap {
        #[command(subcommand)]
        action: SitemapAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates missing tables and indexes in both stores.
    Setup,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    List,
}

#[derive(Subcommand, Debug)]
enum SitemapAction {
    /// Writes sitemap.xml into the static assets folder.
    Generate,
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action: DbAction::Setup } => setup_databases(&config),
        Commands::Admin { action: AdminAction::Create { email, password, first_name, last_name } } => {
            create_admin_user(&config, email, password, first_name, last_name)
        }
        Commands::User { action: UserAction::List } => list_users(&config),
        Commands::Sitemap { action: SitemapAction::Generate } => generate_sitemap(&config),
    }
}

fn open_users_db(config: &Config) -> Option<Connection> {
    let db_path = config.users_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Users database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error: Could not open users database: {}", e);
            None
        }
    }
}

fn setup_databases(config: &Config) {
    let users_path = config.users_db_path();
    println!("\nSetting up databases under '{}'...", config.database_path);
    if let Some(parent_dir) = users_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&users_path).expect("Could not create users database file.");
    let db = match db_setup::open_content_db(&config.content_db_path()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Error opening content database: {}", e);
            return;
        }
    };
    match db_setup::ensure_indexes(&db, &mut conn) {
        Ok(()) => println!("✅ Database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up databases: {}", e),
    }
}

fn create_admin_user(config: &Config, email: &str, password: &str, first_name: &str, last_name: &str) {
    let Some(conn) = open_users_db(config) else {
        return;
    };
    let user = match new_user(
        password,
        email,
        first_name,
        last_name,
        &[Role::Administrator],
        config.password_secret.as_bytes(),
    ) {
        Ok(user) => user,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            return;
        }
    };
    match users_db_operations::insert_user(&conn, &user) {
        Ok(()) => println!("✅ Administrator '{}' created successfully.", user.email),
        Err(e) => eprintln!("❌ Error creating administrator: {}", e),
    }
}

fn list_users(config: &Config) {
    let Some(conn) = open_users_db(config) else {
        return;
    };
    match users_db_operations::list_users(&conn) {
        Ok(users) if users.is_empty() => println!("No users found."),
        Ok(users) => {
            println!("\n--- Users ---");
            for user in users {
                let roles: Vec<&str> = user.roles.iter().map(Role::as_str).collect();
                let status = if user.active { "active" } else { "inactive" };
                println!("- {} ({}) [{}] {}", user.email, user.full_name(), roles.join(", "), status);
            }
        }
        Err(e) => eprintln!("❌ Error listing users: {}", e),
    }
}

fn generate_sitemap(config: &Config) {
    let db = match db_setup::open_content_db(&config.content_db_path()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Error opening content database: {}", e);
            return;
        }
    };
    let result = sitemap_helpers::collect_items(&db, &config.site_url, Utc::now())
        .and_then(|items| sitemap_helpers::save(&config.sitemap_path(), &items).map(|_| items.len()));
    match result {
        Ok(count) => println!("✅ Sitemap with {} entries written to '{}'.", count, config.sitemap_path().display()),
        Err(e) => eprintln!("❌ Error generating sitemap: {}", e),
    }
}
