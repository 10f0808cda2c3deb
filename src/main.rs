use actix_cors::Cors;
use actix_csrf::CsrfMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::{Key, SameSite},
    http::{header, Method},
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use clap::Parser;
use magazine_backend::{
    config::Config,
    helper::{
        file_helpers::ImageCrateOptimizer, language::LanguageResolver, mail_helpers::SmtpMailer, render_helpers::Renderer,
    },
    middleware::{Authenticate, ReportErrors, RequireAdmin, SameOrigin},
    routes,
    setup::db_setup,
    AppState,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::prelude::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "magazine_server", author, version, about = "Starts the magazine web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
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
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    fs::create_dir_all(config.files_dir()).expect("Failed to create files directory");
    fs::create_dir_all(config.static_dir()).expect("Failed to create static directory");
    if let Some(users_dir) = config.users_db_path().parent() {
        fs::create_dir_all(users_dir).expect("Failed to create users database directory");
    }

    let db = db_setup::open_content_db(&config.content_db_path()).expect("FATAL: Could not open the content database.");
    let pool = Pool::builder()
        .build(SqliteConnectionManager::file(config.users_db_path()))
        .expect("FATAL: Failed to create Rusqlite connection pool.");
    {
        let mut conn = pool.get().expect("Failed to get DB connection for initial setup.");
        db_setup::ensure_indexes(&db, &mut conn).expect("FATAL: Could not ensure database indexes.");
    }

    let locales = LanguageResolver::new(&config.languages)
        .expect("FATAL: Unsupported language in configuration.");
    let renderer = Renderer::new("templates/**/*.html", Path::new("locales"), locales.supported())
        .expect("FATAL: Failed to load templates or translations.");
    let mailer = Arc::new(SmtpMailer::new(&config.mail).expect("FATAL: Invalid mail configuration."));
    let state = AppState::new(config.clone(), renderer, mailer, Arc::new(ImageCrateOptimizer::default()))
        .expect("FATAL: Failed to initialize application state.");

    let session_key = Key::try_from(config.cookie_key_bytes().as_slice())
        .expect("FATAL: Cookie keys must add up to at least 64 bytes.");
    let lang_scope = format!(
        "/{{lang:{}}}",
        state.languages.supported().iter().map(|l| l.code()).collect::<Vec<_>>().join("|")
    );

    let state = web::Data::new(state);
    let db = web::Data::new(db);
    let pool = web::Data::new(pool);

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    let web_config = config.web.clone();
    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(SameSite::Lax)
            .build();

        App::new()
            .wrap(ReportErrors)
            .wrap(Authenticate)
            .wrap(session_mw)
            .wrap(cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(state.clone())
            .app_data(db.clone())
            .app_data(pool.clone())
            .configure(routes::static_files::config_static)
            .route("/", web::get().to(routes::public::root_redirect))
            .service(
                web::scope(&lang_scope)
                    .wrap(
                        CsrfMiddleware::<StdRng>::new()
                            .set_cookie(Method::GET, format!("{}/login", lang_scope))
                            .set_cookie(Method::GET, format!("{}/signup", lang_scope))
                            .set_cookie(Method::GET, format!("{}/restore", lang_scope)),
                    )
                    .service(
                        web::scope("/admin")
                            .wrap(SameOrigin)
                            .wrap(RequireAdmin)
                            .configure(routes::admin::config_admin),
                    )
                    .configure(routes::public::config_public),
            )
    })
    .client_request_timeout(Duration::from_secs(web_config.client_request_timeout_secs))
    .keep_alive(Duration::from_secs(web_config.keep_alive_secs))
    .bind(server_address)?
    .run()
    .await
}
