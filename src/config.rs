use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Both cookie keys must be exactly this many bytes.
pub const COOKIE_KEY_LEN: usize = 32;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub client_request_timeout_secs: u64,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub error_recipients: Vec<String>,
    pub subscription_recipients: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailchimpConfig {
    pub list_uri: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub mail: MailConfig,
    pub mailchimp: MailchimpConfig,

    // Populated from the .env file
    pub database_path: String,
    pub assets_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub hash_key: String,
    pub block_key: String,
    pub password_secret: String,
    pub use_secure_cookies: bool,
    pub encrypt_session: bool,
    pub site_url: String,

    // Populated from config/default.toml
    pub languages: Vec<String>,
    pub admin_roles: Vec<String>,
    pub per_page: u32,
    pub files_per_page: u32,
    pub session_ttl_days: i64,
    pub static_max_age: u32,
    pub max_upload_size_mb: u64,
    pub form_utc_offset_hours: i32,
}

/// The three validated secrets every process needs before it may start.
#[derive(Debug, Clone, PartialEq)]
pub struct Secrets {
    pub hash_key: String,
    pub block_key: String,
    pub password_secret: String,
}

/// Checks presence and sizes of the cookie keys and the password secret.
pub fn validate_secrets(
    hash_key: Option<String>,
    block_key: Option<String>,
    password_secret: Option<String>,
) -> Result<Secrets, config::ConfigError> {
    let hash_key = hash_key.ok_or_else(|| missing("MAGAZINE_HASH_KEY"))?;
    let block_key = block_key.ok_or_else(|| missing("MAGAZINE_BLOCK_KEY"))?;
    let password_secret = password_secret.ok_or_else(|| missing("MAGAZINE_SECRET"))?;

    for (name, value) in [("MAGAZINE_HASH_KEY", &hash_key), ("MAGAZINE_BLOCK_KEY", &block_key)] {
        if value.len() != COOKIE_KEY_LEN {
            return Err(config::ConfigError::Message(format!(
                "FATAL: '{}' must be exactly {} bytes long, got {}.",
                name,
                COOKIE_KEY_LEN,
                value.len()
            )));
        }
    }
    if password_secret.is_empty() {
        return Err(config::ConfigError::Message(
            "FATAL: 'MAGAZINE_SECRET' must not be empty.".to_string(),
        ));
    }

    Ok(Secrets { hash_key, block_key, password_secret })
}

fn missing(name: &str) -> config::ConfigError {
    config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.",
        name
    ))
}

fn required_absolute_path(name: &str) -> Result<String, config::ConfigError> {
    let value = env::var(name).map_err(|_| missing(name))?;
    if Path::new(&value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(value)
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bool_var(name: &str) -> bool {
    env::var(name)
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false)
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        // --- VALIDATION & EXTRACTION ---
        let secrets = validate_secrets(
            env::var("MAGAZINE_HASH_KEY").ok(),
            env::var("MAGAZINE_BLOCK_KEY").ok(),
            env::var("MAGAZINE_SECRET").ok(),
        )?;

        let database_path = required_absolute_path("DATABASE_PATH")?;
        let assets_path = required_absolute_path("ASSETS_PATH")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let site_url = env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let use_secure_cookies = bool_var("USE_SECURE_COOKIES");
        let encrypt_session = env::var("ENCRYPT_SESSION")
            .map(|v| v.parse::<bool>().unwrap_or(true))
            .unwrap_or(true);

        let mut builder = config::Config::builder()
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("assets_path", assets_path)?
            .set_override("hash_key", secrets.hash_key)?
            .set_override("block_key", secrets.block_key)?
            .set_override("password_secret", secrets.password_secret)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("site_url", site_url.trim_end_matches('/').to_string())?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("encrypt_session", encrypt_session)?
            .set_override("mail.error_recipients", list_var("ERROR_REPORT_RECIPIENTS"))?
            .set_override("mail.subscription_recipients", list_var("SUBSCRIPTION_NOTIFY_RECIPIENTS"))?
            .set_override("mailchimp.list_uri", env::var("MAILCHIMP_LIST_URI").unwrap_or_default())?
            .set_override("mailchimp.api_key", env::var("MAILCHIMP_API_KEY").unwrap_or_default())?;

        // Mail transport settings fall back to config/default.toml
        if let Ok(host) = env::var("MAIL_HOST") {
            builder = builder.set_override("mail.host", host)?;
        }
        if let Ok(port) = env::var("MAIL_PORT") {
            let port = port.parse::<u16>().map_err(|_| config::ConfigError::Message(
                "FATAL: 'MAIL_PORT' must be a valid port number.".to_string(),
            ))?;
            builder = builder.set_override("mail.port", port as i64)?;
        }
        if let Ok(from) = env::var("MAIL_FROM") {
            builder = builder.set_override("mail.from", from)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Signing key followed by encryption key, the layout `cookie::Key` expects.
    pub fn cookie_key_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(COOKIE_KEY_LEN * 2);
        bytes.extend_from_slice(self.hash_key.as_bytes());
        bytes.extend_from_slice(self.block_key.as_bytes());
        bytes
    }

    /// Returns the full path to the users database file inside its own folder.
    pub fn users_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("users").join("users.db")
    }

    /// Returns the full path to the content database file inside its own folder.
    pub fn content_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("content").join("content.redb")
    }

    pub fn static_dir(&self) -> PathBuf {
        PathBuf::from(&self.assets_path).join("static")
    }

    pub fn files_dir(&self) -> PathBuf {
        PathBuf::from(&self.assets_path).join("files")
    }

    pub fn sitemap_path(&self) -> PathBuf {
        self.static_dir().join("sitemap.xml")
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}
