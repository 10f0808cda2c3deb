use std::sync::Arc;

use chrono::FixedOffset;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::errors::AppError;
use crate::helper::file_helpers::ImageOptimizer;
use crate::helper::form_helpers::form_offset;
use crate::helper::language::LanguageResolver;
use crate::helper::mail_helpers::Mailer;
use crate::helper::mailchimp_helpers::MailchimpClient;
use crate::helper::render_helpers::Renderer;
use crate::helper::session_helpers::SessionCodec;
use crate::models::Role;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Collaborators shared read-only by every worker. Per-request data such as
/// the current user lives in request extensions, never here.
pub struct AppState {
    pub config: Config,
    pub renderer: Renderer,
    pub sessions: SessionCodec,
    pub languages: LanguageResolver,
    pub admin_roles: Vec<Role>,
    pub form_offset: FixedOffset,
    pub mailer: Mailer,
    pub mailchimp: MailchimpClient,
    pub optimizer: Arc<dyn ImageOptimizer>,
}

impl AppState {
    pub fn new(
        config: Config,
        renderer: Renderer,
        mailer: Mailer,
        optimizer: Arc<dyn ImageOptimizer>,
    ) -> Result<Self, AppError> {
        let sessions = SessionCodec::new(config.hash_key.as_bytes(), config.block_key.as_bytes(), config.encrypt_session)?
            .with_cookie_options(config.session_ttl_days, config.use_secure_cookies);
        let languages = LanguageResolver::new(&config.languages)?;
        let admin_roles = config
            .admin_roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<Vec<_>, _>>()?;
        let mailchimp = MailchimpClient::new(&config.mailchimp);
        let form_offset = form_offset(config.form_utc_offset_hours);

        Ok(AppState {
            config,
            renderer,
            sessions,
            languages,
            admin_roles,
            form_offset,
            mailer,
            mailchimp,
            optimizer,
        })
    }

    pub fn password_secret(&self) -> &[u8] {
        self.config.password_secret.as_bytes()
    }
}

pub mod config;
pub mod errors;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
