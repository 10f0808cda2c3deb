#![allow(dead_code)]

use actix_web::web;
use magazine_backend::config::{Config, MailConfig, MailchimpConfig, WebConfig};
use magazine_backend::helper::auth_helpers::new_user;
use magazine_backend::helper::file_helpers::{FileError, ImageOptimizer};
use magazine_backend::helper::language::Locale;
use magazine_backend::helper::mail_helpers::{MailError, MailSender, Mailer, OutgoingMail};
use magazine_backend::helper::render_helpers::Renderer;
use magazine_backend::helper::slug_helpers::slugify;
use magazine_backend::models::db_operations::users_db_operations;
use magazine_backend::models::{Content, ContentType, Role, Topic, User};
use magazine_backend::setup::db_setup;
use magazine_backend::{AppState, DbPool};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

pub const SECRET: &str = "test-password-secret";

pub fn config(root: &Path) -> Config {
    Config {
        web: WebConfig { host: "127.0.0.1".into(), port: 0, client_request_timeout_secs: 10, keep_alive_secs: 10 },
        mail: MailConfig {
            host: "localhost".into(),
            port: 25,
            from: "no-reply@example.org".into(),
            error_recipients: vec!["ops@example.org".into()],
            subscription_recipients: vec!["editors@example.org".into()],
        },
        mailchimp: MailchimpConfig { list_uri: String::new(), api_key: String::new() },
        database_path: root.join("db").to_string_lossy().into_owned(),
        assets_path: root.join("assets").to_string_lossy().into_owned(),
        allowed_origins: String::new(),
        log_level: "debug".into(),
        hash_key: "0123456789abcdef0123456789abcdef".into(),
        block_key: "fedcba9876543210fedcba9876543210".into(),
        password_secret: SECRET.into(),
        use_secure_cookies: false,
        encrypt_session: true,
        site_url: "https://example.org".into(),
        languages: vec!["en".into(), "be".into(), "ru".into()],
        admin_roles: vec!["Administrator".into(), "Author".into()],
        per_page: 20,
        files_per_page: 100,
        session_ttl_days: 84,
        static_max_age: 3600,
        max_upload_size_mb: 1,
        form_utc_offset_hours: 3,
    }
}

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl MailSender for RecordingMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Refuses every message, as an unreachable SMTP server would.
pub struct FailingMailer;

impl MailSender for FailingMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        Err(MailError::NoRecipients(mail.subject.clone()))
    }
}

/// Writes one `{id}_1x.jpg` variant per image.
pub struct StubOptimizer;

impl ImageOptimizer for StubOptimizer {
    fn optimize(&self, _source: &Path, out_dir: &Path, id: Uuid) -> Result<Vec<PathBuf>, FileError> {
        fs::create_dir_all(out_dir)?;
        let variant = out_dir.join(format!("{}_1x.jpg", id));
        fs::write(&variant, b"variant")?;
        Ok(vec![variant])
    }
}

pub struct FailingOptimizer;

impl ImageOptimizer for FailingOptimizer {
    fn optimize(&self, source: &Path, _out_dir: &Path, _id: Uuid) -> Result<Vec<PathBuf>, FileError> {
        Err(FileError::Optimizer(format!("cannot decode {}", source.display())))
    }
}

/// Writes the first variant, then fails on the second.
pub struct HalfwayOptimizer;

impl ImageOptimizer for HalfwayOptimizer {
    fn optimize(&self, _source: &Path, out_dir: &Path, id: Uuid) -> Result<Vec<PathBuf>, FileError> {
        fs::create_dir_all(out_dir)?;
        fs::write(out_dir.join(format!("{}_1x.jpg", id)), b"variant")?;
        Err(FileError::Optimizer("out of memory at 2x".into()))
    }
}

/// Reports a variant it never wrote.
pub struct PhantomOptimizer;

impl ImageOptimizer for PhantomOptimizer {
    fn optimize(&self, _source: &Path, out_dir: &Path, id: Uuid) -> Result<Vec<PathBuf>, FileError> {
        fs::create_dir_all(out_dir)?;
        let written = out_dir.join(format!("{}_1x.jpg", id));
        fs::write(&written, b"variant")?;
        Ok(vec![written, out_dir.join(format!("{}_2x.jpg", id))])
    }
}

/// Both stores and the application state in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub state: web::Data<AppState>,
    pub db: web::Data<Database>,
    pub pool: web::Data<DbPool>,
    pub mails: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        let mails = Arc::new(RecordingMailer::default());
        Self::with_mailer(mails.clone(), mails)
    }

    /// Sends through `mailer`; `mails` stays empty unless it is the same recorder.
    pub fn with_mailer(mailer: Mailer, mails: Arc<RecordingMailer>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(config.files_dir()).unwrap();
        fs::create_dir_all(config.static_dir()).unwrap();
        fs::create_dir_all(config.users_db_path().parent().unwrap()).unwrap();

        let db = db_setup::open_content_db(&config.content_db_path()).unwrap();
        let pool = Pool::builder()
            .max_size(4)
            .build(SqliteConnectionManager::file(config.users_db_path()))
            .unwrap();
        db_setup::ensure_indexes(&db, &mut pool.get().unwrap()).unwrap();

        let renderer = Renderer::new("templates/**/*.html", Path::new("locales"), &[Locale::En, Locale::Be, Locale::Ru])
            .unwrap();
        let state = AppState::new(config, renderer, mailer, Arc::new(StubOptimizer)).unwrap();

        Harness {
            dir,
            state: web::Data::new(state),
            db: web::Data::new(db),
            pool: web::Data::new(pool),
            mails,
        }
    }

    pub fn add_user(&self, email: &str, password: &str, roles: &[Role]) -> User {
        let user = new_user(password, email, "Test", "User", roles, SECRET.as_bytes()).unwrap();
        users_db_operations::insert_user(&self.pool.get().unwrap(), &user).unwrap();
        user
    }
}

pub fn topic(title: &str, language: &str) -> Topic {
    Topic {
        id: Uuid::new_v4(),
        title: title.to_string(),
        slug: slugify(title),
        language: language.to_string(),
        language_override: None,
        weight: 0,
        public: true,
        page: false,
    }
}

/// A public item filed under `topic_id`.
pub fn content(language: &str, content_type: ContentType, title: &str, topic_id: Uuid) -> Content {
    let mut content = Content::new(language, content_type, title);
    content.slug = slugify(title);
    content.public = true;
    content.topic_ids = vec![topic_id];
    content
}
